//! Shared error type across voltmesh crates.

use thiserror::Error;

/// OCPP error codes carried in CallError frames (stable wire vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcppErrorCode {
    /// Requested action is not known to this node.
    NotImplemented,
    /// Action is recognized but not supported.
    NotSupported,
    /// Handler raised while processing an otherwise valid Call.
    InternalError,
    /// Payload violates the protocol.
    ProtocolError,
    /// Security-relevant rejection.
    SecurityError,
    /// Frame shape is syntactically invalid.
    FormatViolation,
    /// Anything that fits no other code.
    GenericError,
}

impl OcppErrorCode {
    /// String representation used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            OcppErrorCode::NotImplemented => "NotImplemented",
            OcppErrorCode::NotSupported => "NotSupported",
            OcppErrorCode::InternalError => "InternalError",
            OcppErrorCode::ProtocolError => "ProtocolError",
            OcppErrorCode::SecurityError => "SecurityError",
            OcppErrorCode::FormatViolation => "FormatViolation",
            OcppErrorCode::GenericError => "GenericError",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, CsmsError>;

/// Unified error type used by core and the CSMS node.
#[derive(Debug, Error)]
pub enum CsmsError {
    /// Malformed JSON or malformed frame shape. The frame is dropped; the
    /// connection stays open.
    #[error("parse failure: {0}")]
    ParseFailure(String),
    /// No registry match for a Call's action.
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// Connection-admission policy denied the session.
    #[error("admission denied: {0}")]
    AdmissionDenied(String),
    /// A business handler raised; replied as a CallError, connection stays alive.
    #[error("handler failure: {0}")]
    HandlerFailure(String),
    /// The relay peer was unreachable. Logged, never retried here.
    #[error("forwarding failure: {0}")]
    ForwardingFailure(String),
    /// The charge point answered one of our Calls with a CallError.
    #[error("charge point error {code}: {description}")]
    Remote { code: String, description: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported protocol version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl CsmsError {
    /// Map to the OCPP error code used when replying with a CallError.
    pub fn error_code(&self) -> OcppErrorCode {
        match self {
            CsmsError::ParseFailure(_) => OcppErrorCode::FormatViolation,
            CsmsError::UnknownAction(_) => OcppErrorCode::NotImplemented,
            CsmsError::AdmissionDenied(_) => OcppErrorCode::SecurityError,
            CsmsError::HandlerFailure(_) => OcppErrorCode::InternalError,
            CsmsError::ForwardingFailure(_) => OcppErrorCode::GenericError,
            CsmsError::Remote { .. } => OcppErrorCode::GenericError,
            CsmsError::BadRequest(_) => OcppErrorCode::ProtocolError,
            CsmsError::UnsupportedVersion => OcppErrorCode::NotSupported,
            CsmsError::Internal(_) => OcppErrorCode::InternalError,
        }
    }
}
