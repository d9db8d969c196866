//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "helios"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Helios easyControls variable table and codec."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use devgw_core::{view_properties, GatewayError};

/// Holding register through which every variable is requested and answered.
pub const VARIABLE_REGISTER: u16 = 1;

/// One easyControls variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub name: &'static str,
    pub id: &'static str,
    /// Registers to read for the answer, including the `vXXXXX=` prefix.
    pub registers: u16,
    pub writable: bool,
}

const fn variable(
    name: &'static str,
    id: &'static str,
    registers: u16,
    writable: bool,
) -> Variable {
    Variable {
        name,
        id,
        registers,
        writable,
    }
}

pub static VARIABLES: [Variable; 13] = [
    variable("OperatingMode", "v00101", 5, true),
    variable("FanStage", "v00102", 5, true),
    variable("PercentageFanStage", "v00103", 6, false),
    variable("OutdoorAirTemperature", "v00104", 7, false),
    variable("SupplyAirTemperature", "v00105", 7, false),
    variable("ExhaustAirTemperature", "v00106", 7, false),
    variable("ExtractAirTemperature", "v00107", 7, false),
    variable("SupplyFanSpeed", "v00348", 6, false),
    variable("ExtractFanSpeed", "v00349", 6, false),
    variable("ExtractAirHumidity", "v02136", 6, false),
    variable("PartyMode", "v00094", 5, true),
    variable("PartyDuration", "v00091", 6, true),
    variable("FilterChangeRemaining", "v01033", 8, false),
];

/// Find a variable by its friendly name, ignoring ASCII case.
pub fn variable_named(name: &str) -> Option<&'static Variable> {
    VARIABLES
        .iter()
        .find(|variable| variable.name.eq_ignore_ascii_case(name))
}

/// NUL-terminate `text` and pack it into big-endian registers.
pub fn encode_text(text: &str) -> Vec<u16> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    if bytes.len() % 2 == 1 {
        bytes.push(0);
    }
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// Unpack registers into text, stopping at the first NUL.
pub fn decode_text(words: &[u16]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|word| word.to_be_bytes())
        .take_while(|byte| *byte != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Split a `vXXXXX=value` answer and check it belongs to `variable`.
pub fn parse_answer(variable: &Variable, answer: &str) -> Result<String, GatewayError> {
    let (id, value) = answer.split_once('=').ok_or_else(|| {
        GatewayError::decoding(variable.id, format!("answer '{answer}' has no '='"))
    })?;
    if id != variable.id {
        return Err(GatewayError::decoding(
            variable.id,
            format!("answer belongs to {id}"),
        ));
    }
    Ok(value.trim().to_owned())
}

/// Numeric readings of one complete pass over the variable table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeliosRawData {
    pub values: BTreeMap<&'static str, f64>,
}

impl HeliosRawData {
    pub fn get(&self, name: &str) -> f64 {
        self.values.get(name).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeliosData {
    pub operating_mode: i32,
    pub fan_stage: i32,
    /// Percent.
    pub percentage_fan_stage: f64,
    /// Temperatures in °C.
    pub outdoor_air_temperature: f64,
    pub supply_air_temperature: f64,
    pub exhaust_air_temperature: f64,
    pub extract_air_temperature: f64,
    /// Fan speeds in rpm.
    pub supply_fan_speed: f64,
    pub extract_fan_speed: f64,
    pub extract_air_humidity: f64,
    pub party_mode: bool,
    /// Minutes.
    pub party_duration: f64,
    /// Minutes until the filter is due.
    pub filter_change_remaining: f64,
}

impl HeliosData {
    pub fn refresh(&mut self, raw: &HeliosRawData) {
        self.operating_mode = raw.get("OperatingMode") as i32;
        self.fan_stage = raw.get("FanStage") as i32;
        self.percentage_fan_stage = raw.get("PercentageFanStage");
        self.outdoor_air_temperature = raw.get("OutdoorAirTemperature");
        self.supply_air_temperature = raw.get("SupplyAirTemperature");
        self.exhaust_air_temperature = raw.get("ExhaustAirTemperature");
        self.extract_air_temperature = raw.get("ExtractAirTemperature");
        self.supply_fan_speed = raw.get("SupplyFanSpeed");
        self.extract_fan_speed = raw.get("ExtractFanSpeed");
        self.extract_air_humidity = raw.get("ExtractAirHumidity");
        self.party_mode = raw.get("PartyMode") != 0.0;
        self.party_duration = raw.get("PartyDuration");
        self.filter_change_remaining = raw.get("FilterChangeRemaining");
    }
}

view_properties!(HeliosData {
    "OperatingMode" => operating_mode,
    "FanStage" => fan_stage,
    "PercentageFanStage" => percentage_fan_stage,
    "OutdoorAirTemperature" => outdoor_air_temperature,
    "SupplyAirTemperature" => supply_air_temperature,
    "ExhaustAirTemperature" => exhaust_air_temperature,
    "ExtractAirTemperature" => extract_air_temperature,
    "SupplyFanSpeed" => supply_fan_speed,
    "ExtractFanSpeed" => extract_fan_speed,
    "ExtractAirHumidity" => extract_air_humidity,
    "PartyMode" => party_mode,
    "PartyDuration" => party_duration,
    "FilterChangeRemaining" => filter_change_remaining,
});
