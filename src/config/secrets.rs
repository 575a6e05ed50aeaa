//! Store connection secret.

use std::path::Path;

use crate::core::SchedulerError;

/// Read the store connection string from `path`, trimming surrounding whitespace.
///
/// # Errors
///
/// Returns `SchedulerError::Config` if the file is unreadable or blank.
pub fn read_connection_string(path: impl AsRef<Path>) -> Result<String, SchedulerError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| SchedulerError::Config(format!("cannot read {}: {e}", path.display())))?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::Config(format!(
            "{} holds no connection string",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}
