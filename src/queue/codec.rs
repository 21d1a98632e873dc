//! Line-oriented record codec for the durable file backend.
//!
//! Record format, one message per line:
//!
//! ```text
//! <attempts><d><visible_from_ms><d><receipt_id><d><body>
//! ```
//!
//! Decoding splits into at most four fields, so the body keeps any
//! delimiter it contains. The first three fields must never contain the
//! delimiter; [`RecordCodec::new`] enforces that against the alphabet of
//! numbers and receipt ids.

use thiserror::Error;

use super::backend::QueueBackendError;
use super::message::StoredMessage;

const FIELD_COUNT: usize = 4;

/// A line that could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has {found} fields, expected {FIELD_COUNT}")]
    MissingFields { found: usize },

    #[error("invalid attempts field: {0:?}")]
    InvalidAttempts(String),

    #[error("invalid visible_from field: {0:?}")]
    InvalidVisibleFrom(String),
}

/// Encodes and decodes [`StoredMessage`] records.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    delimiter: String,
}

impl RecordCodec {
    /// Create a codec for `delimiter`.
    ///
    /// # Errors
    ///
    /// Returns `QueueBackendError::InvalidDelimiter` if the delimiter is
    /// empty, spans a line break, or could occur inside a number or a
    /// receipt id (hex digits and `-`).
    pub fn new(delimiter: impl Into<String>) -> Result<Self, QueueBackendError> {
        let delimiter = delimiter.into();
        validate_delimiter(&delimiter)?;
        Ok(Self { delimiter })
    }

    pub fn encode(&self, message: &StoredMessage) -> String {
        let d = &self.delimiter;
        format!(
            "{}{d}{}{d}{}{d}{}",
            message.attempts,
            message.visible_from,
            message.receipt_id.as_deref().unwrap_or_default(),
            message.body,
        )
    }

    pub fn decode(&self, line: &str) -> Result<StoredMessage, RecordError> {
        let fields: Vec<&str> = line.splitn(FIELD_COUNT, self.delimiter.as_str()).collect();
        let [attempts, visible_from, receipt_id, body] = fields[..] else {
            return Err(RecordError::MissingFields {
                found: fields.len(),
            });
        };

        let attempts = attempts
            .parse()
            .map_err(|_| RecordError::InvalidAttempts(attempts.to_string()))?;
        let visible_from = visible_from
            .parse()
            .map_err(|_| RecordError::InvalidVisibleFrom(visible_from.to_string()))?;

        Ok(StoredMessage {
            body: body.to_string(),
            attempts,
            visible_from,
            receipt_id: (!receipt_id.is_empty()).then(|| receipt_id.to_string()),
        })
    }
}

fn validate_delimiter(delimiter: &str) -> Result<(), QueueBackendError> {
    if delimiter.is_empty() {
        return Err(QueueBackendError::InvalidDelimiter(
            "delimiter cannot be empty".to_string(),
        ));
    }
    if let Some(c) = delimiter
        .chars()
        .find(|c| c.is_ascii_hexdigit() || matches!(c, '-' | '\n' | '\r'))
    {
        return Err(QueueBackendError::InvalidDelimiter(format!(
            "delimiter {delimiter:?} contains reserved character {c:?}"
        )));
    }
    Ok(())
}
