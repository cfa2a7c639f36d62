//! Remote listing of available images

use crate::error::{Result, ToolkitError};
use reqwest::Client;
use serde::Deserialize;
use simplekit_types::CatalogEntry;
use std::time::Duration;
use tracing::{debug, info};

/// Listings are small; give up quickly instead of blocking the UI list
const CATALOG_TIMEOUT: Duration = Duration::from_secs(10);

/// The endpoint answers either with a bare array or a status envelope
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogResponse {
    Listing(Vec<CatalogEntry>),
    Envelope {
        status: String,
        #[serde(default)]
        data: Vec<CatalogEntry>,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Fetches the image listing from a fixed endpoint
#[derive(Debug, Clone)]
pub struct CatalogFetcher {
    client: Client,
    endpoint: String,
}

impl CatalogFetcher {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn fetch_available_images(&self) -> Result<Vec<CatalogEntry>> {
        info!("Fetching image catalog from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .timeout(CATALOG_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolkitError::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint.clone(),
            });
        }

        let body = response.bytes().await?;
        let entries = match serde_json::from_slice::<CatalogResponse>(&body)? {
            CatalogResponse::Listing(entries) => entries,
            CatalogResponse::Envelope { status, data, .. } if status == "success" => data,
            CatalogResponse::Envelope { message, .. } => {
                return Err(ToolkitError::Serialization(
                    message.unwrap_or_else(|| "catalog request was not successful".to_string()),
                ))
            }
        };

        debug!("Catalog lists {} images", entries.len());
        Ok(entries)
    }
}
