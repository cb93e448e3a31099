//! Decode error kinds.

/// Failure to turn raw node data into records.
///
/// Only [`DecodeError::is_fatal`] errors fail a job; the others are scoped to
/// a single log and only cost that log (or its derived transfers).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Quantity, hash, address or hex payload that cannot be parsed at all.
    #[error("malformed {field}: {value:?}")]
    MalformedField { field: &'static str, value: String },

    #[error("{transactions} transactions but {receipts} receipts")]
    Unpaired { transactions: usize, receipts: usize },

    #[error("log has {0} topics, at most 4 are kept")]
    TopicCount(usize),

    #[error("log does not match the {event} layout: {reason}")]
    EventLayout { event: &'static str, reason: String },

    #[error("transfer batch carries {ids} ids but {values} values")]
    LengthMismatch { ids: usize, values: usize },
}

impl DecodeError {
    pub(crate) fn malformed(field: &'static str, value: &str) -> Self {
        Self::MalformedField {
            field,
            value: value.to_string(),
        }
    }

    /// Errors that invalidate the whole range rather than one log.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedField { .. } | Self::Unpaired { .. })
    }
}
