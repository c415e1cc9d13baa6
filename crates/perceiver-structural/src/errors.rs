use cdp_adapter::AdapterError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserveError {
    #[error("Browser not connected")]
    NotConnected,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ObserveError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<AdapterError> for ObserveError {
    fn from(err: AdapterError) -> Self {
        if err.is_not_connected() {
            ObserveError::NotConnected
        } else {
            ObserveError::Internal(err.message())
        }
    }
}
