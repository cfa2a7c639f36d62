//! HTTP client construction

use crate::config::CoreConfig;
use crate::error::Result;
use reqwest::Client;

/// Build the client shared by the engine and the catalog fetcher
///
/// Only connection establishment is bounded: image downloads can legitimately
/// run for a long time, and stalls are caught per chunk by the engine.
pub fn build_client(config: &CoreConfig) -> Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(config.connect_timeout())
        .build()?;
    Ok(client)
}
