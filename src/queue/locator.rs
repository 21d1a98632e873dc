//! Queue locator handling for the durable backend.
//!
//! Locators are URL-shaped strings such as
//! `https://sqs.us-east-1.amazonaws.com/123456789012/orders`; the queue
//! name is the last non-empty path segment.

use super::backend::QueueBackendError;

/// Maximum allowed queue name length
const MAX_QUEUE_NAME_LENGTH: usize = 128;

/// Derive a filesystem-safe queue name from a locator.
///
/// # Errors
///
/// Returns `QueueBackendError::InvalidLocator` when no segment remains or
/// the segment is not a safe directory name.
pub fn queue_name_from_locator(locator: &str) -> Result<&str, QueueBackendError> {
    let name = locator
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .ok_or_else(|| QueueBackendError::InvalidLocator(locator.to_string()))?;

    validate_queue_name(name)?;
    Ok(name)
}

fn validate_queue_name(name: &str) -> Result<(), QueueBackendError> {
    if name.len() > MAX_QUEUE_NAME_LENGTH {
        return Err(QueueBackendError::InvalidLocator(format!(
            "queue name exceeds maximum length of {} characters",
            MAX_QUEUE_NAME_LENGTH
        )));
    }
    if name == "." || name == ".." {
        return Err(QueueBackendError::InvalidLocator(name.to_string()));
    }
    // Alphanumeric, '.', '_' and '-' only
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(QueueBackendError::InvalidLocator(format!(
            "queue name {name:?} may only contain alphanumerics, '.', '_' and '-'"
        )));
    }
    Ok(())
}
