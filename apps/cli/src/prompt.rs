//! Interactive save-location prompt

use dialoguer::{theme::ColorfulTheme, Input};
use simplekit_core::SavePathPicker;
use std::path::PathBuf;

/// Asks on the terminal where each download should go
///
/// The answer is pre-filled with `<dir>/<suggested name>`; clearing it
/// cancels that download.
pub struct PromptPicker {
    dir: PathBuf,
}

impl PromptPicker {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SavePathPicker for PromptPicker {
    fn choose_save_location(&self, suggested_filename: &str) -> Option<PathBuf> {
        let initial = self.dir.join(suggested_filename);

        let answer = match Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Save to")
            .with_initial_text(initial.to_string_lossy())
            .allow_empty(true)
            .interact_text()
        {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Prompt unavailable ({}), pass --yes or --output", e);
                return None;
            }
        };

        let answer = answer.trim();
        if answer.is_empty() {
            return None;
        }

        let path = PathBuf::from(answer);
        if path.is_absolute() {
            Some(path)
        } else {
            std::env::current_dir().ok().map(|cwd| cwd.join(path))
        }
    }
}
