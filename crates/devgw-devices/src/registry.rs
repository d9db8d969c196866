//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "registry"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Construction of the configured gateways."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use devgw_common::AppConfig;
use devgw_core::{DeviceGateway, ReadObserver};

use crate::{
    Em300lrGateway, Etapu11Gateway, FroniusGateway, HeliosGateway, NetatmoGateway,
    WallboxGateway,
};

/// The gateways enabled by one configuration, in configuration order.
#[derive(Clone, Default)]
pub struct GatewaySet {
    gateways: Vec<Arc<dyn DeviceGateway>>,
}

impl GatewaySet {
    pub fn new(gateways: Vec<Arc<dyn DeviceGateway>>) -> Self {
        Self { gateways }
    }

    /// Lookup by gateway name, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DeviceGateway>> {
        self.gateways
            .iter()
            .find(|gateway| gateway.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DeviceGateway>> {
        self.gateways.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.gateways.iter().map(|gateway| gateway.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }

    /// Attach one observer to every gateway guard.
    pub fn observe(&self, observer: Arc<dyn ReadObserver>) {
        for gateway in &self.gateways {
            gateway.flight().set_observer(observer.clone());
        }
    }
}

impl std::fmt::Debug for GatewaySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Build a gateway for every device section present in `config`.
pub fn build_gateways(config: &AppConfig) -> Result<GatewaySet> {
    let mut gateways: Vec<Arc<dyn DeviceGateway>> = Vec::new();
    if let Some(settings) = &config.em300lr {
        let gateway = Em300lrGateway::new(settings.clone()).context("em300lr client")?;
        gateways.push(Arc::new(gateway));
    }
    if let Some(settings) = &config.etapu11 {
        gateways.push(Arc::new(Etapu11Gateway::new(settings.clone())));
    }
    if let Some(settings) = &config.fronius {
        let gateway = FroniusGateway::new(settings.clone()).context("fronius client")?;
        gateways.push(Arc::new(gateway));
    }
    if let Some(settings) = &config.helios {
        gateways.push(Arc::new(HeliosGateway::new(settings.clone())));
    }
    if let Some(settings) = &config.netatmo {
        let gateway = NetatmoGateway::new(settings.clone()).context("netatmo client")?;
        gateways.push(Arc::new(gateway));
    }
    if let Some(settings) = &config.wallbox {
        gateways.push(Arc::new(WallboxGateway::new(settings.clone())));
    }
    let set = GatewaySet::new(gateways);
    info!(gateways = ?set.names(), "gateways constructed");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use devgw_core::StatusCode;

    const CONFIG: &str = r#"
        [wallbox]
        address = "192.168.1.30"

        [em300lr]
        address = "http://192.168.1.20/"
        password = "secret"
        serial_number = "72130001"

        [etapu11]
        address = "192.168.1.40"
    "#;

    #[tokio::test]
    async fn builds_enabled_gateways_in_configuration_order() {
        let config: AppConfig = CONFIG.parse().unwrap();
        let set = build_gateways(&config).unwrap();
        assert_eq!(set.names(), vec!["em300lr", "etapu11", "wallbox"]);
        assert_eq!(set.names(), config.enabled_gateways());
        assert_eq!(set.len(), 3);

        let boiler = set.get("ETAPU11").unwrap();
        assert_eq!(boiler.status().code(), StatusCode::Uncertain);
        assert!(!boiler.is_startup_ok());
        assert!(set.get("fronius").is_none());
    }
}
