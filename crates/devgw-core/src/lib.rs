//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Single-flight gateway core."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Building blocks shared by every device gateway: the status taxonomy, the
//! single-flight guard that serialises device round trips, failure classification and
//! the compile-time property lookup used by controllers.

pub mod error;
pub mod gateway;
pub mod property;
pub mod single_flight;
pub mod status;

#[doc(hidden)]
pub use serde_json;

pub use error::{decode_json, GatewayError};
pub use gateway::{DeviceGateway, PropertyReading};
pub use property::{canonical_name, PropertyAccess};
pub use single_flight::{ReadObserver, SingleFlight};
pub use status::{OperationStatus, StatusCode};
