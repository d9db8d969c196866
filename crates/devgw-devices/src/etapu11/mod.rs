//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "etapu11"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "ETA PU 11 pellet boiler gateway over Modbus TCP."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod data;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use devgw_common::Etapu11Settings;
use devgw_core::{
    DeviceGateway, GatewayError, OperationStatus, PropertyAccess, PropertyReading, SingleFlight,
    StatusCode,
};
use devgw_transport::{ModbusEndpoint, ModbusTcpClient, ModbusTransport};

pub use data::{
    register, Block, BoilerData, HeatingData, HotwaterData, RawBlock, Register, StorageData,
    SystemData, BLOCKS, BOILER, HEATING, HOTWATER, REGISTER_COUNT, STORAGE, SYSTEM,
};

const VIEW_NAMES: &[&str] = &[
    "BoilerData",
    "HotwaterData",
    "HeatingData",
    "StorageData",
    "SystemData",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Etapu11Views {
    boiler_data: BoilerData,
    hotwater_data: HotwaterData,
    heating_data: HeatingData,
    storage_data: StorageData,
    system_data: SystemData,
}

impl Etapu11Views {
    fn refresh(&mut self, block: &Block, raw: &RawBlock) {
        match block.name {
            "boiler" => self.boiler_data.refresh(raw),
            "hotwater" => self.hotwater_data.refresh(raw),
            "heating" => self.heating_data.refresh(raw),
            "storage" => self.storage_data.refresh(raw),
            _ => self.system_data.refresh(raw),
        }
    }
}

fn endpoint_of(settings: &Etapu11Settings) -> ModbusEndpoint {
    ModbusEndpoint {
        host: settings.address.clone(),
        port: settings.port,
        slave_id: settings.slave_id,
        timeout: settings.timeout,
    }
}

pub struct Etapu11Gateway<T = ModbusTcpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<Etapu11Settings>,
    views: RwLock<Etapu11Views>,
}

impl Etapu11Gateway<ModbusTcpClient> {
    pub fn new(settings: Etapu11Settings) -> Self {
        let transport = ModbusTcpClient::new(endpoint_of(&settings));
        Self::with_transport(settings, transport)
    }
}

impl<T: ModbusTransport> Etapu11Gateway<T> {
    pub fn with_transport(settings: Etapu11Settings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("etapu11"),
            transport,
            settings: RwLock::new(settings),
            views: RwLock::new(Etapu11Views::default()),
        }
    }

    pub fn settings(&self) -> Etapu11Settings {
        self.settings.read().clone()
    }

    pub fn update(&self, settings: Etapu11Settings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn boiler(&self) -> BoilerData {
        self.views.read().boiler_data.clone()
    }

    pub fn hotwater(&self) -> HotwaterData {
        self.views.read().hotwater_data.clone()
    }

    pub fn heating(&self) -> HeatingData {
        self.views.read().heating_data.clone()
    }

    pub fn storage(&self) -> StorageData {
        self.views.read().storage_data.clone()
    }

    pub fn system(&self) -> SystemData {
        self.views.read().system_data.clone()
    }

    pub async fn read_boiler(&self) -> OperationStatus {
        self.read_view(&BOILER).await
    }

    pub async fn read_hotwater(&self) -> OperationStatus {
        self.read_view(&HOTWATER).await
    }

    pub async fn read_heating(&self) -> OperationStatus {
        self.read_view(&HEATING).await
    }

    pub async fn read_storage(&self) -> OperationStatus {
        self.read_view(&STORAGE).await
    }

    pub async fn read_system(&self) -> OperationStatus {
        self.read_view(&SYSTEM).await
    }

    async fn read_view(&self, block: &Block) -> OperationStatus {
        let operation = format!("read_{}", block.name);
        self.flight
            .run(&operation, || async {
                let raw = self.read_block(block).await?;
                self.views.write().refresh(block, &raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    async fn read_block(&self, block: &Block) -> Result<RawBlock, GatewayError> {
        let start = block.start();
        let words = self
            .transport
            .read_holding_registers(start, block.len())
            .await?;
        if words.len() != usize::from(block.len()) {
            return Err(GatewayError::Decoding(format!(
                "{} block: expected {} registers, got {}",
                block.name,
                block.len(),
                words.len()
            )));
        }
        debug!(block = block.name, start, count = words.len(), "register block read");
        Ok(RawBlock { start, words })
    }

    async fn read_all_inner(&self) -> Result<(), GatewayError> {
        let mut raws = Vec::with_capacity(BLOCKS.len());
        for block in BLOCKS.iter() {
            let raw = self
                .read_block(block)
                .await
                .map_err(|err| GatewayError::sub_read(block.name, err))?;
            raws.push(raw);
        }

        let mut views = self.views.write();
        for (block, raw) in BLOCKS.iter().zip(&raws) {
            views.refresh(block, raw);
        }
        info!(
            gateway = "etapu11",
            boiler_temperature = views.boiler_data.boiler_temperature,
            "boiler data refreshed"
        );
        Ok(())
    }
}

#[async_trait]
impl<T: ModbusTransport + 'static> DeviceGateway for Etapu11Gateway<T> {
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
            "BoilerData" => serde_json::to_value(&views.boiler_data),
            "HotwaterData" => serde_json::to_value(&views.hotwater_data),
            "HeatingData" => serde_json::to_value(&views.heating_data),
            "StorageData" => serde_json::to_value(&views.storage_data),
            _ => serde_json::to_value(&views.system_data),
        };
        value.ok()
    }

    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        let views = self.views.read();
        match self.canonical_view(view)? {
            "BoilerData" => views.boiler_data.property(property),
            "HotwaterData" => views.hotwater_data.property(property),
            "HeatingData" => views.heating_data.property(property),
            "StorageData" => views.storage_data.property(property),
            _ => views.system_data.property(property),
        }
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_all_inner()).await
    }

    async fn read_property(&self, name: &str) -> PropertyReading {
        let Some(register) = register(name) else {
            return PropertyReading::new(
                OperationStatus::not_found(format!("property '{name}' is not readable")),
                None,
            );
        };
        let (status, value) = self
            .flight
            .run_with("read_property", || async {
                let words = self
                    .transport
                    .read_holding_registers(register.address, REGISTER_COUNT)
                    .await?;
                let value = register.decode(&words).ok_or_else(|| {
                    GatewayError::Decoding(format!(
                        "{}: expected {REGISTER_COUNT} registers, got {}",
                        register.name,
                        words.len()
                    ))
                })?;
                Ok::<_, GatewayError>(Value::from(value))
            })
            .await;
        PropertyReading::new(status, value)
    }

    async fn write_property(&self, name: &str, value: &str) -> OperationStatus {
        let Some(register) = register(name).filter(|register| register.writable) else {
            return OperationStatus::not_found(format!("property '{name}' is not writable"));
        };
        let Some(words) = value.trim().parse::<f64>().ok().and_then(|v| register.encode(v))
        else {
            return OperationStatus::new(
                StatusCode::BadDecodingError,
                format!("'{value}' is not a valid value for {}", register.name),
            );
        };
        self.flight
            .run("write_property", || async {
                self.transport
                    .write_multiple_registers(register.address, &words)
                    .await?;
                info!(property = register.name, value, "boiler register written");
                Ok::<_, GatewayError>(())
            })
            .await
    }
}
