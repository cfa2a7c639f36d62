//! Save-location collaborators
//!
//! The front-end decides how a destination is chosen (dialog, prompt,
//! preset flag); the manager only sees this trait.

use std::path::PathBuf;

/// Asks the user where to save a file
pub trait SavePathPicker: Send + Sync {
    /// `None` means the user backed out, which is not an error
    fn choose_save_location(&self, suggested_filename: &str) -> Option<PathBuf>;
}

impl<F> SavePathPicker for F
where
    F: Fn(&str) -> Option<PathBuf> + Send + Sync,
{
    fn choose_save_location(&self, suggested_filename: &str) -> Option<PathBuf> {
        self(suggested_filename)
    }
}

/// Always answers with the same path, e.g. one given on the command line
#[derive(Debug, Clone)]
pub struct PresetPicker(pub PathBuf);

impl SavePathPicker for PresetPicker {
    fn choose_save_location(&self, _suggested_filename: &str) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Accepts the suggested name inside a fixed directory without asking
#[derive(Debug, Clone)]
pub struct DirectoryPicker(pub PathBuf);

impl SavePathPicker for DirectoryPicker {
    fn choose_save_location(&self, suggested_filename: &str) -> Option<PathBuf> {
        Some(self.0.join(suggested_filename))
    }
}

/// Refuses every request, for contexts without a user to ask
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPicker;

impl SavePathPicker for NoPicker {
    fn choose_save_location(&self, _suggested_filename: &str) -> Option<PathBuf> {
        None
    }
}
