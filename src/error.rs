use thiserror::Error;

/// Failures reported back through the control API. The `Display` strings are
/// what the GUI shows in its status bar.
#[derive(Debug, Error)]
pub enum CutError {
    #[error("Host already cut")]
    AlreadyCut,
    #[error("Host is not cut")]
    NotCut,
    #[error("Computer is not connected")]
    NoGateway,
    #[error("Could not resolve the gateway MAC address")]
    GatewayMacUnresolved,
    #[error("Could not get interface information for {0}")]
    NoInterfaceAddress(String),
    #[error("Invalid {kind} address {value:?}")]
    InvalidAddress { kind: &'static str, value: String },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl CutError {
    /// Duplicate and not-found are user mistakes, not faults.
    pub fn is_user_error(&self) -> bool {
        return matches!(self, CutError::AlreadyCut | CutError::NotCut);
    }
}
