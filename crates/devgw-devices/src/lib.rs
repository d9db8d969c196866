//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Device gateways built on the single-flight core."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! One module per device. Each gateway owns its transport, mirrors the wire format in
//! raw structs and republishes unit-converted views through [`devgw_core::DeviceGateway`].

pub mod em300lr;
pub mod etapu11;
pub mod fronius;
pub mod helios;
pub mod netatmo;
pub mod wallbox;

mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use em300lr::Em300lrGateway;
pub use etapu11::Etapu11Gateway;
pub use fronius::FroniusGateway;
pub use helios::HeliosGateway;
pub use netatmo::NetatmoGateway;
pub use registry::{build_gateways, GatewaySet};
pub use wallbox::WallboxGateway;
