//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Failure classification for gateway read and write operations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt::Display;

use crate::status::{OperationStatus, StatusCode};

/// Failure raised inside a guarded gateway operation.
///
/// Each variant maps onto exactly one [`StatusCode`]; the single-flight guard converts the
/// error into the gateway status and never lets it escape to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The transport answered with an empty body.
    #[error("{0}")]
    UnknownResponse(String),
    /// A body was received but did not match the expected shape.
    #[error("{0}")]
    Decoding(String),
    /// The payload carries a non-zero device status.
    #[error("device reported status {code}: {message}")]
    DeviceFailure { code: String, message: String },
    /// Identity check failed or the requested item does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Authentication or handshake failed.
    #[error("{0}")]
    NoCommunication(String),
    /// One or more required sub-reads failed.
    #[error("{0}")]
    Communication(String),
    /// Anything unexpected.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnknownResponse(_) => StatusCode::BadUnknownResponse,
            GatewayError::Decoding(_) => StatusCode::BadDecodingError,
            GatewayError::DeviceFailure { .. } => StatusCode::BadDeviceFailure,
            GatewayError::NotFound(_) => StatusCode::BadNotFound,
            GatewayError::NoCommunication(_) => StatusCode::BadNoCommunication,
            GatewayError::Communication(_) => StatusCode::BadCommunicationError,
            GatewayError::Internal(_) => StatusCode::BadInternalError,
        }
    }

    pub fn into_status(self) -> OperationStatus {
        let code = self.status_code();
        let explanation = match &self {
            GatewayError::Internal(err) => format!("{err:#}"),
            other => other.to_string(),
        };
        OperationStatus::new(code, explanation)
    }

    /// Empty body received from `what`.
    pub fn empty_response(what: impl Display) -> Self {
        GatewayError::UnknownResponse(format!("empty response from {what}"))
    }

    pub fn decoding(what: impl Display, err: impl Display) -> Self {
        GatewayError::Decoding(format!("unable to decode {what}: {err}"))
    }

    pub fn device_failure(code: impl Display, message: impl Into<String>) -> Self {
        GatewayError::DeviceFailure {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Wrap the failure of one step of an aggregate read.
    pub fn sub_read(step: &str, err: GatewayError) -> Self {
        GatewayError::Communication(format!(
            "{step} read failed with {}: {err}",
            err.status_code()
        ))
    }
}

/// Parse a JSON body, classifying an empty body and a malformed body separately.
pub fn decode_json<T: serde::de::DeserializeOwned>(
    what: impl Display,
    body: &str,
) -> Result<T, GatewayError> {
    if body.trim().is_empty() {
        return Err(GatewayError::empty_response(what));
    }
    serde_json::from_str(body).map_err(|err| GatewayError::decoding(what, err))
}
