//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "em300lr"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "EM300-LR wire format and derived views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use devgw_core::view_properties;

const MILLI_PER_UNIT: f64 = 1000.0;

/// Answer of `start.php`, both for the identity request and the login post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub serial: String,
    #[serde(default)]
    pub app_version: Option<String>,
    #[serde(default)]
    pub authentication: Option<bool>,
}

/// `mum-webservice/data.php` payload keyed by OBIS code.
///
/// `serial` and `status` are mandatory; a body without them is not a measurement.
///
/// Power is reported in W, energy in Wh, current in mA, voltage in mV, power factor in
/// thousandths and frequency in mHz.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Em300lrData {
    pub serial: String,
    pub status: i32,
    #[serde(rename = "1-0:1.4.0*255", default)]
    pub active_power_plus: f64,
    #[serde(rename = "1-0:1.8.0*255", default)]
    pub active_energy_plus: f64,
    #[serde(rename = "1-0:2.4.0*255", default)]
    pub active_power_minus: f64,
    #[serde(rename = "1-0:2.8.0*255", default)]
    pub active_energy_minus: f64,
    #[serde(rename = "1-0:3.4.0*255", default)]
    pub reactive_power_plus: f64,
    #[serde(rename = "1-0:3.8.0*255", default)]
    pub reactive_energy_plus: f64,
    #[serde(rename = "1-0:4.4.0*255", default)]
    pub reactive_power_minus: f64,
    #[serde(rename = "1-0:4.8.0*255", default)]
    pub reactive_energy_minus: f64,
    #[serde(rename = "1-0:9.4.0*255", default)]
    pub apparent_power_plus: f64,
    #[serde(rename = "1-0:9.8.0*255", default)]
    pub apparent_energy_plus: f64,
    #[serde(rename = "1-0:10.4.0*255", default)]
    pub apparent_power_minus: f64,
    #[serde(rename = "1-0:10.8.0*255", default)]
    pub apparent_energy_minus: f64,
    #[serde(rename = "1-0:13.4.0*255", default)]
    pub power_factor: f64,
    #[serde(rename = "1-0:14.4.0*255", default)]
    pub supply_frequency: f64,
    #[serde(rename = "1-0:21.4.0*255", default)]
    pub l1_active_power_plus: f64,
    #[serde(rename = "1-0:21.8.0*255", default)]
    pub l1_active_energy_plus: f64,
    #[serde(rename = "1-0:22.4.0*255", default)]
    pub l1_active_power_minus: f64,
    #[serde(rename = "1-0:22.8.0*255", default)]
    pub l1_active_energy_minus: f64,
    #[serde(rename = "1-0:23.4.0*255", default)]
    pub l1_reactive_power_plus: f64,
    #[serde(rename = "1-0:23.8.0*255", default)]
    pub l1_reactive_energy_plus: f64,
    #[serde(rename = "1-0:24.4.0*255", default)]
    pub l1_reactive_power_minus: f64,
    #[serde(rename = "1-0:24.8.0*255", default)]
    pub l1_reactive_energy_minus: f64,
    #[serde(rename = "1-0:29.4.0*255", default)]
    pub l1_apparent_power_plus: f64,
    #[serde(rename = "1-0:29.8.0*255", default)]
    pub l1_apparent_energy_plus: f64,
    #[serde(rename = "1-0:30.4.0*255", default)]
    pub l1_apparent_power_minus: f64,
    #[serde(rename = "1-0:30.8.0*255", default)]
    pub l1_apparent_energy_minus: f64,
    #[serde(rename = "1-0:31.4.0*255", default)]
    pub l1_current: f64,
    #[serde(rename = "1-0:32.4.0*255", default)]
    pub l1_voltage: f64,
    #[serde(rename = "1-0:33.4.0*255", default)]
    pub l1_power_factor: f64,
    #[serde(rename = "1-0:41.4.0*255", default)]
    pub l2_active_power_plus: f64,
    #[serde(rename = "1-0:41.8.0*255", default)]
    pub l2_active_energy_plus: f64,
    #[serde(rename = "1-0:42.4.0*255", default)]
    pub l2_active_power_minus: f64,
    #[serde(rename = "1-0:42.8.0*255", default)]
    pub l2_active_energy_minus: f64,
    #[serde(rename = "1-0:43.4.0*255", default)]
    pub l2_reactive_power_plus: f64,
    #[serde(rename = "1-0:43.8.0*255", default)]
    pub l2_reactive_energy_plus: f64,
    #[serde(rename = "1-0:44.4.0*255", default)]
    pub l2_reactive_power_minus: f64,
    #[serde(rename = "1-0:44.8.0*255", default)]
    pub l2_reactive_energy_minus: f64,
    #[serde(rename = "1-0:49.4.0*255", default)]
    pub l2_apparent_power_plus: f64,
    #[serde(rename = "1-0:49.8.0*255", default)]
    pub l2_apparent_energy_plus: f64,
    #[serde(rename = "1-0:50.4.0*255", default)]
    pub l2_apparent_power_minus: f64,
    #[serde(rename = "1-0:50.8.0*255", default)]
    pub l2_apparent_energy_minus: f64,
    #[serde(rename = "1-0:51.4.0*255", default)]
    pub l2_current: f64,
    #[serde(rename = "1-0:52.4.0*255", default)]
    pub l2_voltage: f64,
    #[serde(rename = "1-0:53.4.0*255", default)]
    pub l2_power_factor: f64,
    #[serde(rename = "1-0:61.4.0*255", default)]
    pub l3_active_power_plus: f64,
    #[serde(rename = "1-0:61.8.0*255", default)]
    pub l3_active_energy_plus: f64,
    #[serde(rename = "1-0:62.4.0*255", default)]
    pub l3_active_power_minus: f64,
    #[serde(rename = "1-0:62.8.0*255", default)]
    pub l3_active_energy_minus: f64,
    #[serde(rename = "1-0:63.4.0*255", default)]
    pub l3_reactive_power_plus: f64,
    #[serde(rename = "1-0:63.8.0*255", default)]
    pub l3_reactive_energy_plus: f64,
    #[serde(rename = "1-0:64.4.0*255", default)]
    pub l3_reactive_power_minus: f64,
    #[serde(rename = "1-0:64.8.0*255", default)]
    pub l3_reactive_energy_minus: f64,
    #[serde(rename = "1-0:69.4.0*255", default)]
    pub l3_apparent_power_plus: f64,
    #[serde(rename = "1-0:69.8.0*255", default)]
    pub l3_apparent_energy_plus: f64,
    #[serde(rename = "1-0:70.4.0*255", default)]
    pub l3_apparent_power_minus: f64,
    #[serde(rename = "1-0:70.8.0*255", default)]
    pub l3_apparent_energy_minus: f64,
    #[serde(rename = "1-0:71.4.0*255", default)]
    pub l3_current: f64,
    #[serde(rename = "1-0:72.4.0*255", default)]
    pub l3_voltage: f64,
    #[serde(rename = "1-0:73.4.0*255", default)]
    pub l3_power_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    L1,
    L2,
    L3,
}

/// Raw values of one phase, still in wire units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseValues {
    pub active_power_plus: f64,
    pub active_energy_plus: f64,
    pub active_power_minus: f64,
    pub active_energy_minus: f64,
    pub reactive_power_plus: f64,
    pub reactive_energy_plus: f64,
    pub reactive_power_minus: f64,
    pub reactive_energy_minus: f64,
    pub apparent_power_plus: f64,
    pub apparent_energy_plus: f64,
    pub apparent_power_minus: f64,
    pub apparent_energy_minus: f64,
    pub current: f64,
    pub voltage: f64,
    pub power_factor: f64,
}

impl Em300lrData {
    pub fn phase(&self, phase: Phase) -> PhaseValues {
        match phase {
            Phase::L1 => PhaseValues {
                active_power_plus: self.l1_active_power_plus,
                active_energy_plus: self.l1_active_energy_plus,
                active_power_minus: self.l1_active_power_minus,
                active_energy_minus: self.l1_active_energy_minus,
                reactive_power_plus: self.l1_reactive_power_plus,
                reactive_energy_plus: self.l1_reactive_energy_plus,
                reactive_power_minus: self.l1_reactive_power_minus,
                reactive_energy_minus: self.l1_reactive_energy_minus,
                apparent_power_plus: self.l1_apparent_power_plus,
                apparent_energy_plus: self.l1_apparent_energy_plus,
                apparent_power_minus: self.l1_apparent_power_minus,
                apparent_energy_minus: self.l1_apparent_energy_minus,
                current: self.l1_current,
                voltage: self.l1_voltage,
                power_factor: self.l1_power_factor,
            },
            Phase::L2 => PhaseValues {
                active_power_plus: self.l2_active_power_plus,
                active_energy_plus: self.l2_active_energy_plus,
                active_power_minus: self.l2_active_power_minus,
                active_energy_minus: self.l2_active_energy_minus,
                reactive_power_plus: self.l2_reactive_power_plus,
                reactive_energy_plus: self.l2_reactive_energy_plus,
                reactive_power_minus: self.l2_reactive_power_minus,
                reactive_energy_minus: self.l2_reactive_energy_minus,
                apparent_power_plus: self.l2_apparent_power_plus,
                apparent_energy_plus: self.l2_apparent_energy_plus,
                apparent_power_minus: self.l2_apparent_power_minus,
                apparent_energy_minus: self.l2_apparent_energy_minus,
                current: self.l2_current,
                voltage: self.l2_voltage,
                power_factor: self.l2_power_factor,
            },
            Phase::L3 => PhaseValues {
                active_power_plus: self.l3_active_power_plus,
                active_energy_plus: self.l3_active_energy_plus,
                active_power_minus: self.l3_active_power_minus,
                active_energy_minus: self.l3_active_energy_minus,
                reactive_power_plus: self.l3_reactive_power_plus,
                reactive_energy_plus: self.l3_reactive_energy_plus,
                reactive_power_minus: self.l3_reactive_power_minus,
                reactive_energy_minus: self.l3_reactive_energy_minus,
                apparent_power_plus: self.l3_apparent_power_plus,
                apparent_energy_plus: self.l3_apparent_energy_plus,
                apparent_power_minus: self.l3_apparent_power_minus,
                apparent_energy_minus: self.l3_apparent_energy_minus,
                current: self.l3_current,
                voltage: self.l3_voltage,
                power_factor: self.l3_power_factor,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TotalData {
    pub active_power_plus: f64,
    pub active_energy_plus: f64,
    pub active_power_minus: f64,
    pub active_energy_minus: f64,
    pub reactive_power_plus: f64,
    pub reactive_energy_plus: f64,
    pub reactive_power_minus: f64,
    pub reactive_energy_minus: f64,
    pub apparent_power_plus: f64,
    pub apparent_energy_plus: f64,
    pub apparent_power_minus: f64,
    pub apparent_energy_minus: f64,
    pub power_factor: f64,
    pub supply_frequency: f64,
}

impl TotalData {
    pub fn refresh(&mut self, raw: &Em300lrData) {
        self.active_power_plus = raw.active_power_plus;
        self.active_energy_plus = raw.active_energy_plus;
        self.active_power_minus = raw.active_power_minus;
        self.active_energy_minus = raw.active_energy_minus;
        self.reactive_power_plus = raw.reactive_power_plus;
        self.reactive_energy_plus = raw.reactive_energy_plus;
        self.reactive_power_minus = raw.reactive_power_minus;
        self.reactive_energy_minus = raw.reactive_energy_minus;
        self.apparent_power_plus = raw.apparent_power_plus;
        self.apparent_energy_plus = raw.apparent_energy_plus;
        self.apparent_power_minus = raw.apparent_power_minus;
        self.apparent_energy_minus = raw.apparent_energy_minus;
        self.power_factor = raw.power_factor / MILLI_PER_UNIT;
        self.supply_frequency = raw.supply_frequency / MILLI_PER_UNIT;
    }
}

view_properties!(TotalData {
    "ActivePowerPlus" => active_power_plus,
    "ActiveEnergyPlus" => active_energy_plus,
    "ActivePowerMinus" => active_power_minus,
    "ActiveEnergyMinus" => active_energy_minus,
    "ReactivePowerPlus" => reactive_power_plus,
    "ReactiveEnergyPlus" => reactive_energy_plus,
    "ReactivePowerMinus" => reactive_power_minus,
    "ReactiveEnergyMinus" => reactive_energy_minus,
    "ApparentPowerPlus" => apparent_power_plus,
    "ApparentEnergyPlus" => apparent_energy_plus,
    "ApparentPowerMinus" => apparent_power_minus,
    "ApparentEnergyMinus" => apparent_energy_minus,
    "PowerFactor" => power_factor,
    "SupplyFrequency" => supply_frequency,
});

/// Per-phase view; current in A, voltage in V.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PhaseData {
    pub active_power_plus: f64,
    pub active_energy_plus: f64,
    pub active_power_minus: f64,
    pub active_energy_minus: f64,
    pub reactive_power_plus: f64,
    pub reactive_energy_plus: f64,
    pub reactive_power_minus: f64,
    pub reactive_energy_minus: f64,
    pub apparent_power_plus: f64,
    pub apparent_energy_plus: f64,
    pub apparent_power_minus: f64,
    pub apparent_energy_minus: f64,
    pub current: f64,
    pub voltage: f64,
    pub power_factor: f64,
}

impl PhaseData {
    pub fn refresh(&mut self, values: &PhaseValues) {
        self.active_power_plus = values.active_power_plus;
        self.active_energy_plus = values.active_energy_plus;
        self.active_power_minus = values.active_power_minus;
        self.active_energy_minus = values.active_energy_minus;
        self.reactive_power_plus = values.reactive_power_plus;
        self.reactive_energy_plus = values.reactive_energy_plus;
        self.reactive_power_minus = values.reactive_power_minus;
        self.reactive_energy_minus = values.reactive_energy_minus;
        self.apparent_power_plus = values.apparent_power_plus;
        self.apparent_energy_plus = values.apparent_energy_plus;
        self.apparent_power_minus = values.apparent_power_minus;
        self.apparent_energy_minus = values.apparent_energy_minus;
        self.current = values.current / MILLI_PER_UNIT;
        self.voltage = values.voltage / MILLI_PER_UNIT;
        self.power_factor = values.power_factor / MILLI_PER_UNIT;
    }
}

view_properties!(PhaseData {
    "ActivePowerPlus" => active_power_plus,
    "ActiveEnergyPlus" => active_energy_plus,
    "ActivePowerMinus" => active_power_minus,
    "ActiveEnergyMinus" => active_energy_minus,
    "ReactivePowerPlus" => reactive_power_plus,
    "ReactiveEnergyPlus" => reactive_energy_plus,
    "ReactivePowerMinus" => reactive_power_minus,
    "ReactiveEnergyMinus" => reactive_energy_minus,
    "ApparentPowerPlus" => apparent_power_plus,
    "ApparentEnergyPlus" => apparent_energy_plus,
    "ApparentPowerMinus" => apparent_power_minus,
    "ApparentEnergyMinus" => apparent_energy_minus,
    "Current" => current,
    "Voltage" => voltage,
    "PowerFactor" => power_factor,
});

#[cfg(test)]
mod tests {
    use super::*;
    use devgw_core::PropertyAccess;
    use serde_json::json;

    fn fixture() -> Em300lrData {
        serde_json::from_value(json!({
            "serial": "72130001",
            "status": 0,
            "1-0:1.4.0*255": 1520.0,
            "1-0:1.8.0*255": 9876543.0,
            "1-0:13.4.0*255": 982.0,
            "1-0:14.4.0*255": 50012.0,
            "1-0:31.4.0*255": 6543.0,
            "1-0:32.4.0*255": 231400.0,
            "1-0:51.4.0*255": 1200.0,
            "1-0:72.4.0*255": 229800.0,
            "1-0:61.4.0*255": 310.0
        }))
        .unwrap()
    }

    #[test]
    fn total_view_copies_power_and_scales_factor() {
        let raw = fixture();
        let mut total = TotalData::default();
        total.refresh(&raw);
        assert_eq!(total.active_power_plus, 1520.0);
        assert_eq!(total.active_energy_plus, 9876543.0);
        assert!((total.power_factor - 0.982).abs() < 1e-9);
        assert!((total.supply_frequency - 50.012).abs() < 1e-9);
        assert_eq!(total.active_power_minus, 0.0);
    }

    #[test]
    fn phase_views_convert_milli_units() {
        let raw = fixture();
        let mut l1 = PhaseData::default();
        l1.refresh(&raw.phase(Phase::L1));
        assert!((l1.current - 6.543).abs() < 1e-9);
        assert!((l1.voltage - 231.4).abs() < 1e-9);

        let mut l2 = PhaseData::default();
        l2.refresh(&raw.phase(Phase::L2));
        assert!((l2.current - 1.2).abs() < 1e-9);

        let mut l3 = PhaseData::default();
        l3.refresh(&raw.phase(Phase::L3));
        assert_eq!(l3.active_power_plus, 310.0);
        assert!((l3.voltage - 229.8).abs() < 1e-9);
    }

    #[test]
    fn views_expose_properties_by_name() {
        let raw = fixture();
        let mut total = TotalData::default();
        total.refresh(&raw);
        assert_eq!(total.property("activepowerplus"), Some(json!(1520.0)));
        assert!(TotalData::has_property("SupplyFrequency"));
        assert!(!TotalData::has_property("Voltage"));
        assert!(PhaseData::has_property("voltage"));

        let serialized = serde_json::to_value(&total).unwrap();
        assert_eq!(serialized["ActivePowerPlus"], json!(1520.0));
    }
}
