//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Transport level failures."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use devgw_core::GatewayError;

/// Errors raised by the transport clients.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request path could not be joined onto the configured base address.
    #[error("invalid request path '{path}': {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: url::ParseError,
    },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no reply within {} ms", .0.as_millis())]
    Timeout(Duration),
    #[error("cannot resolve {0}")]
    Resolve(String),
    #[error("modbus transport error: {0}")]
    Modbus(String),
    /// The device answered with a Modbus exception response.
    #[error("modbus exception {0}")]
    Exception(String),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Exception(code) => {
                GatewayError::device_failure(code, "modbus exception response")
            }
            other => GatewayError::Internal(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgw_core::StatusCode;

    #[test]
    fn exceptions_are_device_failures_everything_else_internal() {
        let exception: GatewayError = TransportError::Exception("IllegalDataAddress".into()).into();
        assert_eq!(exception.status_code(), StatusCode::BadDeviceFailure);
        assert!(exception.to_string().contains("IllegalDataAddress"));

        let timeout: GatewayError = TransportError::Timeout(Duration::from_millis(250)).into();
        assert_eq!(timeout.status_code(), StatusCode::BadInternalError);
        assert_eq!(timeout.into_status().explanation(), "no reply within 250 ms");
    }
}
