//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Uniform gateway interface consumed by controllers."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::property::canonical_name;
use crate::single_flight::SingleFlight;
use crate::status::OperationStatus;

/// Result of a live per-property read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyReading {
    pub status: OperationStatus,
    pub value: Option<Value>,
}

impl PropertyReading {
    pub fn new(status: OperationStatus, value: Option<Value>) -> Self {
        Self { status, value }
    }
}

/// Controller-facing view of one device gateway.
///
/// Implementors supply the device specific reads and views; state bookkeeping is
/// delegated to the [`SingleFlight`] they hold.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    fn flight(&self) -> &SingleFlight;

    /// View names in refresh order.
    fn view_names(&self) -> &'static [&'static str];

    /// Snapshot of every view.
    fn data(&self) -> Value;

    /// Snapshot of one view, looked up ignoring case.
    fn view(&self, name: &str) -> Option<Value>;

    fn view_property(&self, view: &str, property: &str) -> Option<Value>;

    /// Refresh every view from the device.
    async fn read_all(&self) -> OperationStatus;

    /// Live read of a single property. Devices without per-property access report
    /// `BadNotFound` without touching the lock.
    async fn read_property(&self, name: &str) -> PropertyReading {
        PropertyReading::new(
            OperationStatus::not_found(format!(
                "property '{name}' is not readable on {}",
                self.name()
            )),
            None,
        )
    }

    /// Write a single property. Devices without writable properties report `BadNotFound`.
    async fn write_property(&self, name: &str, _value: &str) -> OperationStatus {
        OperationStatus::not_found(format!(
            "property '{name}' is not writable on {}",
            self.name()
        ))
    }

    fn name(&self) -> &'static str {
        self.flight().gateway()
    }

    fn status(&self) -> OperationStatus {
        self.flight().status()
    }

    fn is_locked(&self) -> bool {
        self.flight().is_locked()
    }

    fn is_startup_ok(&self) -> bool {
        self.flight().is_startup_ok()
    }

    /// Initial read performed once when the daemon starts.
    async fn startup(&self) -> OperationStatus {
        let status = self.read_all().await;
        self.flight().mark_startup(&status);
        info!(gateway = self.name(), status = status.name(), "startup read finished");
        status
    }

    fn canonical_view(&self, name: &str) -> Option<&'static str> {
        canonical_name(self.view_names(), name)
    }
}
