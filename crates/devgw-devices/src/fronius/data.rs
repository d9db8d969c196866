//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "fronius"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Fronius Solar API payloads and views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use devgw_core::view_properties;

/// Common `Head`/`Body` wrapper of every Solar API answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope<B> {
    pub head: Head,
    #[serde(default)]
    pub body: B,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Head {
    pub status: HeadStatus,
    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeadStatus {
    pub code: i32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DataBody<D> {
    pub data: D,
}

/// A value with its unit; absent at night when the inverter sleeps.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Measurement {
    pub value: Option<f64>,
    pub unit: String,
}

impl Measurement {
    pub fn value(&self) -> f64 {
        self.value.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeviceStatus {
    pub status_code: i32,
    pub error_code: i32,
    pub inverter_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct CommonInverterData {
    pub day_energy: Measurement,
    pub year_energy: Measurement,
    pub total_energy: Measurement,
    pub pac: Measurement,
    pub iac: Measurement,
    pub uac: Measurement,
    pub fac: Measurement,
    pub idc: Measurement,
    pub udc: Measurement,
    #[serde(rename = "DeviceStatus")]
    pub device_status: DeviceStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ThreePhaseInverterData {
    pub iac_l1: Measurement,
    pub iac_l2: Measurement,
    pub iac_l3: Measurement,
    pub uac_l1: Measurement,
    pub uac_l2: Measurement,
    pub uac_l3: Measurement,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct MinMaxInverterData {
    pub day_pmax: Measurement,
    pub day_uacmax: Measurement,
    pub day_uacmin: Measurement,
    pub day_udcmax: Measurement,
    pub year_pmax: Measurement,
    pub year_uacmax: Measurement,
    pub year_uacmin: Measurement,
    pub year_udcmax: Measurement,
    pub total_pmax: Measurement,
    pub total_uacmax: Measurement,
    pub total_uacmin: Measurement,
    pub total_udcmax: Measurement,
}

/// One entry of `GetInverterInfo.cgi`, keyed by device id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InverterEntry {
    #[serde(rename = "DT")]
    pub device_type: i32,
    #[serde(rename = "PVPower")]
    pub pv_power: f64,
    #[serde(rename = "CustomName")]
    pub custom_name: String,
    #[serde(rename = "Show")]
    pub show: i32,
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    #[serde(rename = "ErrorCode")]
    pub error_code: i32,
    #[serde(rename = "StatusCode")]
    pub status_code: i32,
}

pub type InverterInfoMap = BTreeMap<String, InverterEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoggerBody {
    pub logger_info: RawLoggerInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLoggerInfo {
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
    #[serde(rename = "ProductID")]
    pub product_id: String,
    #[serde(rename = "PlatformID")]
    pub platform_id: String,
    #[serde(rename = "HWVersion")]
    pub hw_version: String,
    #[serde(rename = "SWVersion")]
    pub sw_version: String,
    #[serde(rename = "TimezoneLocation")]
    pub timezone_location: String,
    #[serde(rename = "TimezoneName")]
    pub timezone_name: String,
    #[serde(rename = "UTCOffset")]
    pub utc_offset: i32,
    #[serde(rename = "DefaultLanguage")]
    pub default_language: String,
    #[serde(rename = "DeliveryFactor")]
    pub delivery_factor: f64,
    #[serde(rename = "CashFactor")]
    pub cash_factor: f64,
    #[serde(rename = "CashCurrency")]
    pub cash_currency: String,
    #[serde(rename = "CO2Factor")]
    pub co2_factor: f64,
    #[serde(rename = "CO2Unit")]
    pub co2_unit: String,
}

pub type CommonEnvelope = Envelope<DataBody<CommonInverterData>>;
pub type PhaseEnvelope = Envelope<DataBody<ThreePhaseInverterData>>;
pub type MinMaxEnvelope = Envelope<DataBody<MinMaxInverterData>>;
pub type InverterInfoEnvelope = Envelope<DataBody<InverterInfoMap>>;
pub type LoggerEnvelope = Envelope<LoggerBody>;

/// Live production values. Energy in Wh, power in W.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommonData {
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub day_energy: f64,
    pub year_energy: f64,
    pub total_energy: f64,
    pub power_ac: f64,
    pub current_ac: f64,
    pub voltage_ac: f64,
    pub frequency_ac: f64,
    pub current_dc: f64,
    pub voltage_dc: f64,
    pub status_code: i32,
    pub error_code: i32,
}

impl CommonData {
    pub fn refresh(&mut self, raw: &CommonEnvelope) {
        let data = &raw.body.data;
        self.timestamp = raw.head.timestamp;
        self.day_energy = data.day_energy.value();
        self.year_energy = data.year_energy.value();
        self.total_energy = data.total_energy.value();
        self.power_ac = data.pac.value();
        self.current_ac = data.iac.value();
        self.voltage_ac = data.uac.value();
        self.frequency_ac = data.fac.value();
        self.current_dc = data.idc.value();
        self.voltage_dc = data.udc.value();
        self.status_code = data.device_status.status_code;
        self.error_code = data.device_status.error_code;
    }
}

view_properties!(CommonData {
    "Timestamp" => timestamp,
    "DayEnergy" => day_energy,
    "YearEnergy" => year_energy,
    "TotalEnergy" => total_energy,
    "PowerAc" => power_ac,
    "CurrentAc" => current_ac,
    "VoltageAc" => voltage_ac,
    "FrequencyAc" => frequency_ac,
    "CurrentDc" => current_dc,
    "VoltageDc" => voltage_dc,
    "StatusCode" => status_code,
    "ErrorCode" => error_code,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhaseData {
    pub current_l1: f64,
    pub current_l2: f64,
    pub current_l3: f64,
    pub voltage_l1: f64,
    pub voltage_l2: f64,
    pub voltage_l3: f64,
}

impl PhaseData {
    pub fn refresh(&mut self, raw: &PhaseEnvelope) {
        let data = &raw.body.data;
        self.current_l1 = data.iac_l1.value();
        self.current_l2 = data.iac_l2.value();
        self.current_l3 = data.iac_l3.value();
        self.voltage_l1 = data.uac_l1.value();
        self.voltage_l2 = data.uac_l2.value();
        self.voltage_l3 = data.uac_l3.value();
    }
}

view_properties!(PhaseData {
    "CurrentL1" => current_l1,
    "CurrentL2" => current_l2,
    "CurrentL3" => current_l3,
    "VoltageL1" => voltage_l1,
    "VoltageL2" => voltage_l2,
    "VoltageL3" => voltage_l3,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MinMaxData {
    pub day_max_power: f64,
    pub day_max_voltage_ac: f64,
    pub day_min_voltage_ac: f64,
    pub day_max_voltage_dc: f64,
    pub year_max_power: f64,
    pub year_max_voltage_ac: f64,
    pub year_min_voltage_ac: f64,
    pub year_max_voltage_dc: f64,
    pub total_max_power: f64,
    pub total_max_voltage_ac: f64,
    pub total_min_voltage_ac: f64,
    pub total_max_voltage_dc: f64,
}

impl MinMaxData {
    pub fn refresh(&mut self, raw: &MinMaxEnvelope) {
        let data = &raw.body.data;
        self.day_max_power = data.day_pmax.value();
        self.day_max_voltage_ac = data.day_uacmax.value();
        self.day_min_voltage_ac = data.day_uacmin.value();
        self.day_max_voltage_dc = data.day_udcmax.value();
        self.year_max_power = data.year_pmax.value();
        self.year_max_voltage_ac = data.year_uacmax.value();
        self.year_min_voltage_ac = data.year_uacmin.value();
        self.year_max_voltage_dc = data.year_udcmax.value();
        self.total_max_power = data.total_pmax.value();
        self.total_max_voltage_ac = data.total_uacmax.value();
        self.total_min_voltage_ac = data.total_uacmin.value();
        self.total_max_voltage_dc = data.total_udcmax.value();
    }
}

view_properties!(MinMaxData {
    "DayMaxPower" => day_max_power,
    "DayMaxVoltageAc" => day_max_voltage_ac,
    "DayMinVoltageAc" => day_min_voltage_ac,
    "DayMaxVoltageDc" => day_max_voltage_dc,
    "YearMaxPower" => year_max_power,
    "YearMaxVoltageAc" => year_max_voltage_ac,
    "YearMinVoltageAc" => year_min_voltage_ac,
    "YearMaxVoltageDc" => year_max_voltage_dc,
    "TotalMaxPower" => total_max_power,
    "TotalMaxVoltageAc" => total_max_voltage_ac,
    "TotalMinVoltageAc" => total_min_voltage_ac,
    "TotalMaxVoltageDc" => total_max_voltage_dc,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InverterInfo {
    pub device_type: i32,
    pub custom_name: String,
    pub unique_id: String,
    pub pv_power: f64,
    pub status_code: i32,
    pub error_code: i32,
}

impl InverterInfo {
    pub fn refresh(&mut self, entry: &InverterEntry) {
        self.device_type = entry.device_type;
        self.custom_name = entry.custom_name.clone();
        self.unique_id = entry.unique_id.clone();
        self.pv_power = entry.pv_power;
        self.status_code = entry.status_code;
        self.error_code = entry.error_code;
    }
}

view_properties!(InverterInfo {
    "DeviceType" => device_type,
    "CustomName" => custom_name,
    "UniqueId" => unique_id,
    "PvPower" => pv_power,
    "StatusCode" => status_code,
    "ErrorCode" => error_code,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggerInfo {
    pub unique_id: String,
    pub product_id: String,
    pub hw_version: String,
    pub sw_version: String,
    pub timezone_name: String,
    pub utc_offset: i32,
    pub delivery_factor: f64,
    pub cash_factor: f64,
    pub cash_currency: String,
    pub co2_factor: f64,
    pub co2_unit: String,
}

impl LoggerInfo {
    pub fn refresh(&mut self, raw: &LoggerEnvelope) {
        let info = &raw.body.logger_info;
        self.unique_id = info.unique_id.clone();
        self.product_id = info.product_id.clone();
        self.hw_version = info.hw_version.clone();
        self.sw_version = info.sw_version.clone();
        self.timezone_name = info.timezone_name.clone();
        self.utc_offset = info.utc_offset;
        self.delivery_factor = info.delivery_factor;
        self.cash_factor = info.cash_factor;
        self.cash_currency = info.cash_currency.clone();
        self.co2_factor = info.co2_factor;
        self.co2_unit = info.co2_unit.clone();
    }
}

view_properties!(LoggerInfo {
    "UniqueId" => unique_id,
    "ProductId" => product_id,
    "HwVersion" => hw_version,
    "SwVersion" => sw_version,
    "TimezoneName" => timezone_name,
    "UtcOffset" => utc_offset,
    "DeliveryFactor" => delivery_factor,
    "CashFactor" => cash_factor,
    "CashCurrency" => cash_currency,
    "Co2Factor" => co2_factor,
    "Co2Unit" => co2_unit,
});
