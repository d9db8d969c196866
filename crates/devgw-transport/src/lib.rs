//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Device transport clients."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Leaf transport layer: one network round trip per call, no retries.

pub mod error;
pub mod http;
pub mod modbus;
pub mod udp;

pub use error::TransportError;
pub use http::{HttpClient, HttpEndpoint, HttpTransport};
pub use modbus::{ModbusEndpoint, ModbusTcpClient, ModbusTransport};
pub use udp::{UdpClient, UdpEndpoint, UdpTransport};
