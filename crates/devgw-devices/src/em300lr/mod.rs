//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "em300lr"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "TQ EM300-LR energy meter gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! The meter web service requires a session: the identity page reports the serial, a
//! form login with that serial and the password sets a cookie, and only then is the
//! measurement page served.

mod data;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use devgw_common::Em300lrSettings;
use devgw_core::{
    decode_json, DeviceGateway, GatewayError, OperationStatus, PropertyAccess, SingleFlight,
};
use devgw_transport::{HttpClient, HttpEndpoint, HttpTransport, TransportError};

pub use data::{Em300lrData, Phase, PhaseData, PhaseValues, StartResponse, TotalData};

const START_PAGE: &str = "start.php";
const DATA_PAGE: &str = "mum-webservice/data.php";

const VIEW_NAMES: &[&str] = &["TotalData", "Phase1Data", "Phase2Data", "Phase3Data"];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Em300lrViews {
    total_data: TotalData,
    phase1_data: PhaseData,
    phase2_data: PhaseData,
    phase3_data: PhaseData,
}

fn endpoint_of(settings: &Em300lrSettings) -> HttpEndpoint {
    HttpEndpoint::new(settings.address.clone(), settings.timeout)
}

pub struct Em300lrGateway<T = HttpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<Em300lrSettings>,
    views: RwLock<Em300lrViews>,
}

impl Em300lrGateway<HttpClient> {
    pub fn new(settings: Em300lrSettings) -> Result<Self, TransportError> {
        let transport = HttpClient::new(endpoint_of(&settings))?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: HttpTransport> Em300lrGateway<T> {
    pub fn with_transport(settings: Em300lrSettings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("em300lr"),
            transport,
            settings: RwLock::new(settings),
            views: RwLock::new(Em300lrViews::default()),
        }
    }

    pub fn settings(&self) -> Em300lrSettings {
        self.settings.read().clone()
    }

    /// Replace the settings and re-apply address and timeout to the transport.
    pub fn update(&self, settings: Em300lrSettings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn total(&self) -> TotalData {
        self.views.read().total_data.clone()
    }

    pub fn phase(&self, phase: Phase) -> PhaseData {
        let views = self.views.read();
        match phase {
            Phase::L1 => views.phase1_data.clone(),
            Phase::L2 => views.phase2_data.clone(),
            Phase::L3 => views.phase3_data.clone(),
        }
    }

    async fn login(&self, settings: &Em300lrSettings) -> Result<(), GatewayError> {
        let body = self.transport.get(START_PAGE).await?;
        let identity: StartResponse = decode_json(START_PAGE, &body)?;
        if identity.serial != settings.serial_number {
            return Err(GatewayError::NotFound(format!(
                "meter reports serial '{}', expected '{}'",
                identity.serial, settings.serial_number
            )));
        }

        let body = self
            .transport
            .post(
                START_PAGE,
                &[
                    ("login", settings.serial_number.as_str()),
                    ("password", settings.password.as_str()),
                    ("save_login", "1"),
                ],
            )
            .await?;
        let session: StartResponse = decode_json(START_PAGE, &body)?;
        if session.authentication != Some(true) {
            return Err(GatewayError::NoCommunication(format!(
                "login to meter {} was rejected",
                settings.serial_number
            )));
        }
        debug!(serial = %settings.serial_number, "meter session established");
        Ok(())
    }

    async fn read_inner(&self) -> Result<(), GatewayError> {
        let settings = self.settings();
        self.login(&settings).await?;

        let body = self.transport.get(DATA_PAGE).await?;
        let raw: Em300lrData = decode_json(DATA_PAGE, &body)?;
        if raw.status != 0 {
            return Err(GatewayError::device_failure(
                raw.status,
                format!("device status code {}", raw.status),
            ));
        }

        let mut views = self.views.write();
        views.total_data.refresh(&raw);
        views.phase1_data.refresh(&raw.phase(Phase::L1));
        views.phase2_data.refresh(&raw.phase(Phase::L2));
        views.phase3_data.refresh(&raw.phase(Phase::L3));
        info!(
            gateway = "em300lr",
            active_power_plus = views.total_data.active_power_plus,
            "meter data refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> DeviceGateway for Em300lrGateway<T> {
    fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    fn view_names(&self) -> &'static [&'static str] {
        VIEW_NAMES
    }

    fn data(&self) -> Value {
        serde_json::to_value(&*self.views.read()).unwrap_or(Value::Null)
    }

    fn view(&self, name: &str) -> Option<Value> {
        let views = self.views.read();
        let value = match self.canonical_view(name)? {
            "TotalData" => serde_json::to_value(&views.total_data),
            "Phase1Data" => serde_json::to_value(&views.phase1_data),
            "Phase2Data" => serde_json::to_value(&views.phase2_data),
            _ => serde_json::to_value(&views.phase3_data),
        };
        value.ok()
    }

    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        let views = self.views.read();
        match self.canonical_view(view)? {
            "TotalData" => views.total_data.property(property),
            "Phase1Data" => views.phase1_data.property(property),
            "Phase2Data" => views.phase2_data.property(property),
            _ => views.phase3_data.property(property),
        }
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_inner()).await
    }
}
