//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "helios"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Helios KWL ventilation gateway over Modbus TCP."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! easyControls exposes its settings as text variables. A variable is requested by
//! writing its id into [`VARIABLE_REGISTER`] and answered in the same register range.

mod data;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info};

use devgw_common::HeliosSettings;
use devgw_core::{
    DeviceGateway, GatewayError, OperationStatus, PropertyAccess, PropertyReading, SingleFlight,
    StatusCode,
};
use devgw_transport::{ModbusEndpoint, ModbusTcpClient, ModbusTransport};

pub use data::{
    decode_text, encode_text, parse_answer, variable_named, HeliosData, HeliosRawData, Variable,
    VARIABLES, VARIABLE_REGISTER,
};

const VIEW_NAMES: &[&str] = &["HeliosData"];

fn endpoint_of(settings: &HeliosSettings) -> ModbusEndpoint {
    ModbusEndpoint {
        host: settings.address.clone(),
        port: settings.port,
        slave_id: settings.slave_id,
        timeout: settings.timeout,
    }
}

fn parse_number(variable: &Variable, text: &str) -> Result<f64, GatewayError> {
    text.parse::<f64>()
        .map_err(|err| GatewayError::decoding(format!("{} value '{text}'", variable.id), err))
}

pub struct HeliosGateway<T = ModbusTcpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<HeliosSettings>,
    data: RwLock<HeliosData>,
}

impl HeliosGateway<ModbusTcpClient> {
    pub fn new(settings: HeliosSettings) -> Self {
        let transport = ModbusTcpClient::new(endpoint_of(&settings));
        Self::with_transport(settings, transport)
    }
}

impl<T: ModbusTransport> HeliosGateway<T> {
    pub fn with_transport(settings: HeliosSettings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("helios"),
            transport,
            settings: RwLock::new(settings),
            data: RwLock::new(HeliosData::default()),
        }
    }

    pub fn settings(&self) -> HeliosSettings {
        self.settings.read().clone()
    }

    pub fn update(&self, settings: HeliosSettings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn helios_data(&self) -> HeliosData {
        self.data.read().clone()
    }

    async fn read_variable(&self, variable: &Variable) -> Result<String, GatewayError> {
        self.transport
            .write_multiple_registers(VARIABLE_REGISTER, &encode_text(variable.id))
            .await?;
        let words = self
            .transport
            .read_holding_registers(VARIABLE_REGISTER, variable.registers)
            .await?;
        let answer = decode_text(&words);
        if answer.is_empty() {
            return Err(GatewayError::empty_response(variable.id));
        }
        debug!(variable = variable.id, answer = %answer, "variable read");
        parse_answer(variable, &answer)
    }

    async fn read_all_inner(&self) -> Result<(), GatewayError> {
        let mut raw = HeliosRawData::default();
        for variable in VARIABLES.iter() {
            let text = self.read_variable(variable).await?;
            raw.values.insert(variable.name, parse_number(variable, &text)?);
        }

        let mut data = self.data.write();
        data.refresh(&raw);
        info!(
            gateway = "helios",
            fan_stage = data.fan_stage,
            supply_air_temperature = data.supply_air_temperature,
            "ventilation data refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: ModbusTransport + 'static> DeviceGateway for HeliosGateway<T> {
    fn flight(&self) -> &SingleFlight {
        &self.flight
    }

    fn view_names(&self) -> &'static [&'static str] {
        VIEW_NAMES
    }

    fn data(&self) -> Value {
        let view = serde_json::to_value(&*self.data.read()).unwrap_or(Value::Null);
        Value::Object(serde_json::Map::from_iter([("HeliosData".to_owned(), view)]))
    }

    fn view(&self, name: &str) -> Option<Value> {
        self.canonical_view(name)?;
        serde_json::to_value(&*self.data.read()).ok()
    }

    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        self.canonical_view(view)?;
        self.data.read().property(property)
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_all_inner()).await
    }

    async fn read_property(&self, name: &str) -> PropertyReading {
        let Some(variable) = variable_named(name) else {
            return PropertyReading::new(
                OperationStatus::not_found(format!("property '{name}' is not readable")),
                None,
            );
        };
        let (status, value) = self
            .flight
            .run_with("read_property", || async {
                let text = self.read_variable(variable).await?;
                Ok::<_, GatewayError>(
                    text.parse::<f64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| Value::from(text)),
                )
            })
            .await;
        PropertyReading::new(status, value)
    }

    async fn write_property(&self, name: &str, value: &str) -> OperationStatus {
        let Some(variable) = variable_named(name).filter(|variable| variable.writable) else {
            return OperationStatus::not_found(format!("property '{name}' is not writable"));
        };
        let value = value.trim();
        if value.parse::<f64>().is_err() {
            return OperationStatus::new(
                StatusCode::BadDecodingError,
                format!("'{value}' is not a valid value for {}", variable.name),
            );
        }
        self.flight
            .run("write_property", || async {
                let request = format!("{}={value}", variable.id);
                self.transport
                    .write_multiple_registers(VARIABLE_REGISTER, &encode_text(&request))
                    .await?;
                info!(variable = variable.id, value, "ventilation variable written");
                Ok::<_, GatewayError>(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::HeliosDevice;
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> HeliosSettings {
        HeliosSettings {
            address: "kwl.local".into(),
            port: 502,
            slave_id: 180,
            timeout: Duration::from_secs(1),
        }
    }

    fn device() -> HeliosDevice {
        let device = HeliosDevice::new();
        for variable in VARIABLES.iter() {
            device.set(variable.id, "0");
        }
        device
            .set("v00102", "2")
            .set("v00104", "-3.5")
            .set("v00105", "19.8")
            .set("v00348", "1450")
            .set("v00094", "1");
        device
    }

    #[tokio::test]
    async fn read_all_walks_the_variable_table() {
        let gateway = HeliosGateway::with_transport(settings(), device());
        assert!(gateway.read_all().await.is_good());

        let data = gateway.helios_data();
        assert_eq!(data.fan_stage, 2);
        assert_eq!(data.outdoor_air_temperature, -3.5);
        assert_eq!(data.supply_air_temperature, 19.8);
        assert_eq!(data.supply_fan_speed, 1450.0);
        assert!(data.party_mode);
        assert_eq!(gateway.transport().calls(), VARIABLES.len() * 2);
        assert_eq!(gateway.view_property("heliosdata", "FanStage"), Some(json!(2)));
    }

    #[tokio::test]
    async fn foreign_answer_is_a_decoding_error_and_keeps_data() {
        let gateway = HeliosGateway::with_transport(settings(), device());
        assert!(gateway.read_all().await.is_good());

        gateway.transport().set("v00104", "12.0");
        gateway.transport().answer_as("v00999");
        let status = gateway.read_all().await;
        assert_eq!(status.code(), StatusCode::BadDecodingError);
        assert!(status.explanation().contains("v00999"));
        assert_eq!(gateway.helios_data().outdoor_air_temperature, -3.5);
    }

    #[tokio::test]
    async fn non_numeric_value_fails_the_pass() {
        let device = device();
        device.set("v00106", "n/a");
        let gateway = HeliosGateway::with_transport(settings(), device);
        let status = gateway.read_all().await;
        assert_eq!(status.code(), StatusCode::BadDecodingError);
        assert_eq!(gateway.helios_data(), HeliosData::default());
    }

    #[tokio::test]
    async fn write_sends_id_and_value() {
        let gateway = HeliosGateway::with_transport(settings(), device());
        let status = gateway.write_property("fanstage", "3").await;
        assert!(status.is_good());
        assert_eq!(gateway.transport().get("v00102").as_deref(), Some("3"));

        let reading = gateway.read_property("FanStage").await;
        assert_eq!(reading.value, Some(json!(3.0)));
    }

    #[tokio::test]
    async fn unknown_and_read_only_properties_never_touch_the_device() {
        let gateway = HeliosGateway::with_transport(settings(), device());
        assert_eq!(
            gateway.write_property("UnknownField", "1").await.code(),
            StatusCode::BadNotFound
        );
        assert_eq!(
            gateway.write_property("SupplyAirTemperature", "1").await.code(),
            StatusCode::BadNotFound
        );
        assert_eq!(
            gateway.read_property("UnknownField").await.status.code(),
            StatusCode::BadNotFound
        );
        assert_eq!(gateway.transport().calls(), 0);
    }
}
