//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "fronius"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fronius inverter gateway over the Solar API v1."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod data;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use devgw_common::FroniusSettings;
use devgw_core::{
    decode_json, DeviceGateway, GatewayError, OperationStatus, PropertyAccess, SingleFlight,
};
use devgw_transport::{HttpClient, HttpEndpoint, HttpTransport, TransportError};

pub use data::{
    CommonData, CommonEnvelope, Envelope, InverterEntry, InverterInfo, InverterInfoEnvelope,
    LoggerEnvelope, LoggerInfo, MinMaxData, MinMaxEnvelope, PhaseData, PhaseEnvelope,
};

const VIEW_NAMES: &[&str] = &[
    "CommonData",
    "PhaseData",
    "MinMaxData",
    "InverterInfo",
    "LoggerInfo",
];

const REALTIME: &str = "solar_api/v1/GetInverterRealtimeData.cgi";
const INVERTER_INFO: &str = "solar_api/v1/GetInverterInfo.cgi";
const LOGGER_INFO: &str = "solar_api/v1/GetLoggerInfo.cgi";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct FroniusViews {
    common_data: CommonData,
    phase_data: PhaseData,
    min_max_data: MinMaxData,
    inverter_info: InverterInfo,
    logger_info: LoggerInfo,
}

fn endpoint_of(settings: &FroniusSettings) -> HttpEndpoint {
    HttpEndpoint::new(settings.address.clone(), settings.timeout)
}

fn realtime_path(device_id: u32, collection: &str) -> String {
    format!("{REALTIME}?Scope=Device&DeviceId={device_id}&DataCollection={collection}")
}

pub struct FroniusGateway<T = HttpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<FroniusSettings>,
    views: RwLock<FroniusViews>,
}

impl FroniusGateway<HttpClient> {
    pub fn new(settings: FroniusSettings) -> Result<Self, TransportError> {
        let transport = HttpClient::new(endpoint_of(&settings))?;
        Ok(Self::with_transport(settings, transport))
    }
}

impl<T: HttpTransport> FroniusGateway<T> {
    pub fn with_transport(settings: FroniusSettings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("fronius"),
            transport,
            settings: RwLock::new(settings),
            views: RwLock::new(FroniusViews::default()),
        }
    }

    pub fn settings(&self) -> FroniusSettings {
        self.settings.read().clone()
    }

    pub fn update(&self, settings: FroniusSettings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn common(&self) -> CommonData {
        self.views.read().common_data.clone()
    }

    pub fn phase(&self) -> PhaseData {
        self.views.read().phase_data.clone()
    }

    pub fn min_max(&self) -> MinMaxData {
        self.views.read().min_max_data.clone()
    }

    pub fn inverter_info(&self) -> InverterInfo {
        self.views.read().inverter_info.clone()
    }

    pub fn logger_info(&self) -> LoggerInfo {
        self.views.read().logger_info.clone()
    }

    pub async fn read_common(&self) -> OperationStatus {
        self.flight
            .run("read_common", || async {
                let raw = self.fetch_common().await?;
                self.views.write().common_data.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_phase(&self) -> OperationStatus {
        self.flight
            .run("read_phase", || async {
                let raw = self.fetch_phase().await?;
                self.views.write().phase_data.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_minmax(&self) -> OperationStatus {
        self.flight
            .run("read_minmax", || async {
                let raw = self.fetch_minmax().await?;
                self.views.write().min_max_data.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_inverter_info(&self) -> OperationStatus {
        self.flight
            .run("read_inverter_info", || async {
                let entry = self.fetch_inverter_info().await?;
                self.views.write().inverter_info.refresh(&entry);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_logger_info(&self) -> OperationStatus {
        self.flight
            .run("read_logger_info", || async {
                let raw = self.fetch_logger_info().await?;
                self.views.write().logger_info.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    /// GET `path` and reject answers whose head carries a non-zero status.
    async fn fetch<B>(&self, what: &str, path: &str) -> Result<Envelope<B>, GatewayError>
    where
        Envelope<B>: DeserializeOwned,
    {
        let body = self.transport.get(path).await?;
        let envelope: Envelope<B> = decode_json(what, &body)?;
        let status = &envelope.head.status;
        if status.code != 0 {
            let message = if status.reason.is_empty() {
                status.user_message.clone()
            } else {
                status.reason.clone()
            };
            return Err(GatewayError::device_failure(status.code, message));
        }
        debug!(what, "solar api answer accepted");
        Ok(envelope)
    }

    async fn fetch_common(&self) -> Result<CommonEnvelope, GatewayError> {
        let path = realtime_path(self.settings.read().device_id, "CommonInverterData");
        self.fetch("common inverter data", &path).await
    }

    async fn fetch_phase(&self) -> Result<PhaseEnvelope, GatewayError> {
        let path = realtime_path(self.settings.read().device_id, "3PInverterData");
        self.fetch("three phase inverter data", &path).await
    }

    async fn fetch_minmax(&self) -> Result<MinMaxEnvelope, GatewayError> {
        let path = realtime_path(self.settings.read().device_id, "MinMaxInverterData");
        self.fetch("min/max inverter data", &path).await
    }

    async fn fetch_inverter_info(&self) -> Result<InverterEntry, GatewayError> {
        let device_id = self.settings.read().device_id;
        let mut raw: InverterInfoEnvelope = self.fetch("inverter info", INVERTER_INFO).await?;
        raw.body
            .data
            .remove(&device_id.to_string())
            .ok_or_else(|| GatewayError::NotFound(format!("inverter {device_id} is not listed")))
    }

    async fn fetch_logger_info(&self) -> Result<LoggerEnvelope, GatewayError> {
        self.fetch("logger info", LOGGER_INFO).await
    }

    async fn read_all_inner(&self) -> Result<(), GatewayError> {
        let common = self
            .fetch_common()
            .await
            .map_err(|err| GatewayError::sub_read("common", err))?;
        let phase = self
            .fetch_phase()
            .await
            .map_err(|err| GatewayError::sub_read("phase", err))?;
        let minmax = self
            .fetch_minmax()
            .await
            .map_err(|err| GatewayError::sub_read("minmax", err))?;
        let inverter = self
            .fetch_inverter_info()
            .await
            .map_err(|err| GatewayError::sub_read("inverter info", err))?;
        let logger = self
            .fetch_logger_info()
            .await
            .map_err(|err| GatewayError::sub_read("logger info", err))?;

        let mut views = self.views.write();
        views.common_data.refresh(&common);
        views.phase_data.refresh(&phase);
        views.min_max_data.refresh(&minmax);
        views.inverter_info.refresh(&inverter);
        views.logger_info.refresh(&logger);
        info!(
            gateway = "fronius",
            power_ac = views.common_data.power_ac,
            "inverter data refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: HttpTransport + 'static> DeviceGateway for FroniusGateway<T> {
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
            "CommonData" => serde_json::to_value(&views.common_data),
            "PhaseData" => serde_json::to_value(&views.phase_data),
            "MinMaxData" => serde_json::to_value(&views.min_max_data),
            "InverterInfo" => serde_json::to_value(&views.inverter_info),
            _ => serde_json::to_value(&views.logger_info),
        };
        value.ok()
    }

    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        let views = self.views.read();
        match self.canonical_view(view)? {
            "CommonData" => views.common_data.property(property),
            "PhaseData" => views.phase_data.property(property),
            "MinMaxData" => views.min_max_data.property(property),
            "InverterInfo" => views.inverter_info.property(property),
            _ => views.logger_info.property(property),
        }
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_all_inner()).await
    }
}
