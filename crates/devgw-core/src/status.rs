//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Operation status taxonomy reported by every gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

const SEVERITY_MASK: u32 = 0xC000_0000;
const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
const SEVERITY_BAD: u32 = 0x8000_0000;

/// Fixed status taxonomy. Numeric values follow the OPC UA status code table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum StatusCode {
    Good,
    Uncertain,
    Bad,
    BadInternalError,
    BadCommunicationError,
    BadDecodingError,
    BadUnknownResponse,
    BadNoCommunication,
    BadNotFound,
    BadDeviceFailure,
}

impl StatusCode {
    /// Machine readable status value.
    pub const fn code(self) -> u32 {
        match self {
            StatusCode::Good => 0x0000_0000,
            StatusCode::Uncertain => 0x4000_0000,
            StatusCode::Bad => 0x8000_0000,
            StatusCode::BadInternalError => 0x8002_0000,
            StatusCode::BadCommunicationError => 0x8005_0000,
            StatusCode::BadDecodingError => 0x8007_0000,
            StatusCode::BadUnknownResponse => 0x8009_0000,
            StatusCode::BadNoCommunication => 0x8031_0000,
            StatusCode::BadNotFound => 0x803E_0000,
            StatusCode::BadDeviceFailure => 0x808B_0000,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    pub const fn is_good(self) -> bool {
        self.code() & SEVERITY_MASK == 0
    }

    pub const fn is_uncertain(self) -> bool {
        self.code() & SEVERITY_MASK == SEVERITY_UNCERTAIN
    }

    pub const fn is_bad(self) -> bool {
        self.code() & SEVERITY_MASK == SEVERITY_BAD
    }
}

/// Outcome of the most recent gateway operation: code, name and a human explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    code: StatusCode,
    explanation: String,
}

impl OperationStatus {
    pub fn new(code: StatusCode, explanation: impl Into<String>) -> Self {
        Self {
            code,
            explanation: explanation.into(),
        }
    }

    /// `Good` with an empty explanation.
    pub fn good() -> Self {
        Self::new(StatusCode::Good, String::new())
    }

    pub fn uncertain(explanation: impl Into<String>) -> Self {
        Self::new(StatusCode::Uncertain, explanation)
    }

    pub fn not_found(explanation: impl Into<String>) -> Self {
        Self::new(StatusCode::BadNotFound, explanation)
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.code.name()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn is_good(&self) -> bool {
        self.code.is_good()
    }

    pub fn is_uncertain(&self) -> bool {
        self.code.is_uncertain()
    }

    pub fn is_bad(&self) -> bool {
        self.code.is_bad()
    }
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::uncertain("no read performed yet")
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.explanation.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.explanation)
        }
    }
}

impl Serialize for OperationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("OperationStatus", 3)?;
        state.serialize_field("code", &self.code.code())?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("explanation", &self.explanation)?;
        state.end()
    }
}
