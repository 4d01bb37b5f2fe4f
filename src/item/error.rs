use crate::resilience::ErrorKind;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

/// Failure raised by a reader, processor or writer.
///
/// The [`ErrorKind`] is what retry and skip classification looks at; the
/// message and optional source are carried along for reporting. Cloning is
/// cheap so the same failure can be attributed to skip listeners and the exit
/// description alike.
#[derive(Debug, Clone)]
pub struct ItemError {
    kind: ErrorKind,
    message: String,
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl ItemError {
    pub fn new(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Failure expected to clear up on its own (contention, timeouts)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TRANSIENT, message)
    }

    /// Failure caused by the item's own content
    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DATA, message)
    }

    /// Failure not tied to any declared kind
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ROOT, message)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl StdError for ItemError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}
