use thiserror::Error;

/// Errors that can occur while building a protocol
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Registration was attempted after the protocol was locked
    #[error("Protocol is already locked. Registration is closed and no further changes are allowed")]
    AlreadyLocked,
}
