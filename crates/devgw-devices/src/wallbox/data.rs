//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "wallbox"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "KEBA UDP report payloads and views."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use strum::{Display, IntoStaticStr};

use devgw_core::view_properties;

/// Milli units (mA, mW) to base units.
const MILLI: f64 = 1000.0;
/// Tenths (0.1 Wh, 0.1 %) to base units.
const TENTHS: f64 = 10.0;

/// Report ids of the charging history, oldest slot last.
pub const HISTORY_FIRST: u32 = 101;
pub const HISTORY_LAST: u32 = 130;
pub const HISTORY_LEN: usize = (HISTORY_LAST - HISTORY_FIRST + 1) as usize;

/// `ID` field carried by every report; sent as a string by most firmware versions.
#[serde_as]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ReportId {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(rename = "ID")]
    pub id: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Report1Raw {
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Serial")]
    pub serial: String,
    #[serde(rename = "Firmware")]
    pub firmware: String,
    #[serde(rename = "COM-module")]
    pub com_module: i64,
    #[serde(rename = "Backend")]
    pub backend: i64,
    #[serde(rename = "DIP-Sw1")]
    pub dip_sw1: String,
    #[serde(rename = "DIP-Sw2")]
    pub dip_sw2: String,
    #[serde(rename = "Sec")]
    pub sec: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Report2Raw {
    #[serde(rename = "State")]
    pub state: i64,
    #[serde(rename = "Error1")]
    pub error1: i64,
    #[serde(rename = "Error2")]
    pub error2: i64,
    #[serde(rename = "Plug")]
    pub plug: i64,
    #[serde(rename = "AuthON")]
    pub auth_on: i64,
    #[serde(rename = "Authreq")]
    pub auth_req: i64,
    #[serde(rename = "Enable sys")]
    pub enable_sys: i64,
    #[serde(rename = "Enable user")]
    pub enable_user: i64,
    #[serde(rename = "Max curr")]
    pub max_curr: f64,
    #[serde(rename = "Max curr %")]
    pub max_curr_percent: f64,
    #[serde(rename = "Curr HW")]
    pub curr_hw: f64,
    #[serde(rename = "Curr user")]
    pub curr_user: f64,
    #[serde(rename = "Curr FS")]
    pub curr_fs: f64,
    #[serde(rename = "Tmo FS")]
    pub tmo_fs: i64,
    #[serde(rename = "Curr timer")]
    pub curr_timer: f64,
    #[serde(rename = "Tmo CT")]
    pub tmo_ct: i64,
    #[serde(rename = "Setenergy")]
    pub setenergy: f64,
    #[serde(rename = "Output")]
    pub output: i64,
    #[serde(rename = "Input")]
    pub input: i64,
    #[serde(rename = "Serial")]
    pub serial: String,
    #[serde(rename = "Sec")]
    pub sec: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Report3Raw {
    #[serde(rename = "U1")]
    pub u1: f64,
    #[serde(rename = "U2")]
    pub u2: f64,
    #[serde(rename = "U3")]
    pub u3: f64,
    #[serde(rename = "I1")]
    pub i1: f64,
    #[serde(rename = "I2")]
    pub i2: f64,
    #[serde(rename = "I3")]
    pub i3: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "PF")]
    pub pf: f64,
    #[serde(rename = "E pres")]
    pub e_pres: f64,
    #[serde(rename = "E total")]
    pub e_total: f64,
    #[serde(rename = "Serial")]
    pub serial: String,
    #[serde(rename = "Sec")]
    pub sec: i64,
}

/// Session record served by report 100 (current session) and 101..=130 (history).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionRaw {
    #[serde(rename = "Session ID")]
    pub session_id: i64,
    #[serde(rename = "Curr HW")]
    pub curr_hw: f64,
    #[serde(rename = "E start")]
    pub e_start: f64,
    #[serde(rename = "E pres")]
    pub e_pres: f64,
    #[serde(rename = "started[s]")]
    pub started_s: i64,
    #[serde(rename = "ended[s]")]
    pub ended_s: i64,
    pub started: String,
    pub ended: String,
    pub reason: i64,
    #[serde(rename = "RFID tag")]
    pub rfid_tag: String,
    #[serde(rename = "RFID class")]
    pub rfid_class: String,
    #[serde(rename = "Serial")]
    pub serial: String,
}

/// Charging state reported in report 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum ChargingState {
    Starting,
    NotReady,
    Ready,
    Charging,
    Error,
    AuthorizationRejected,
    Unknown,
}

impl ChargingState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ChargingState::Starting,
            1 => ChargingState::NotReady,
            2 => ChargingState::Ready,
            3 => ChargingState::Charging,
            4 => ChargingState::Error,
            5 => ChargingState::AuthorizationRejected,
            _ => ChargingState::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Report1Data {
    pub product: String,
    pub serial: String,
    pub firmware: String,
    pub com_module: i64,
    pub backend: i64,
    pub dip_switch1: String,
    pub dip_switch2: String,
    pub uptime_seconds: i64,
}

impl Report1Data {
    pub fn refresh(&mut self, raw: &Report1Raw) {
        self.product = raw.product.clone();
        self.serial = raw.serial.clone();
        self.firmware = raw.firmware.clone();
        self.com_module = raw.com_module;
        self.backend = raw.backend;
        self.dip_switch1 = raw.dip_sw1.clone();
        self.dip_switch2 = raw.dip_sw2.clone();
        self.uptime_seconds = raw.sec;
    }
}

view_properties!(Report1Data {
    "Product" => product,
    "Serial" => serial,
    "Firmware" => firmware,
    "ComModule" => com_module,
    "Backend" => backend,
    "DipSwitch1" => dip_switch1,
    "DipSwitch2" => dip_switch2,
    "UptimeSeconds" => uptime_seconds,
});

/// Charger state and limits. Currents in A, energy in Wh, percentages in %.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Report2Data {
    pub state: i64,
    pub state_text: String,
    pub error1: i64,
    pub error2: i64,
    pub plug: i64,
    pub auth_on: bool,
    pub auth_required: bool,
    pub enable_sys: bool,
    pub enable_user: bool,
    pub max_current: f64,
    pub max_current_percent: f64,
    pub current_hardware: f64,
    pub current_user: f64,
    pub current_failsafe: f64,
    pub timeout_failsafe: i64,
    pub current_timer: f64,
    pub timeout_current_timer: i64,
    pub set_energy: f64,
    pub output: i64,
    pub input: i64,
}

impl Report2Data {
    pub fn refresh(&mut self, raw: &Report2Raw) {
        self.state = raw.state;
        self.state_text = ChargingState::from_code(raw.state).to_string();
        self.error1 = raw.error1;
        self.error2 = raw.error2;
        self.plug = raw.plug;
        self.auth_on = raw.auth_on != 0;
        self.auth_required = raw.auth_req != 0;
        self.enable_sys = raw.enable_sys != 0;
        self.enable_user = raw.enable_user != 0;
        self.max_current = raw.max_curr / MILLI;
        self.max_current_percent = raw.max_curr_percent / TENTHS;
        self.current_hardware = raw.curr_hw / MILLI;
        self.current_user = raw.curr_user / MILLI;
        self.current_failsafe = raw.curr_fs / MILLI;
        self.timeout_failsafe = raw.tmo_fs;
        self.current_timer = raw.curr_timer / MILLI;
        self.timeout_current_timer = raw.tmo_ct;
        self.set_energy = raw.setenergy / TENTHS;
        self.output = raw.output;
        self.input = raw.input;
    }
}

view_properties!(Report2Data {
    "State" => state,
    "StateText" => state_text,
    "Error1" => error1,
    "Error2" => error2,
    "Plug" => plug,
    "AuthOn" => auth_on,
    "AuthRequired" => auth_required,
    "EnableSys" => enable_sys,
    "EnableUser" => enable_user,
    "MaxCurrent" => max_current,
    "MaxCurrentPercent" => max_current_percent,
    "CurrentHardware" => current_hardware,
    "CurrentUser" => current_user,
    "CurrentFailsafe" => current_failsafe,
    "TimeoutFailsafe" => timeout_failsafe,
    "CurrentTimer" => current_timer,
    "TimeoutCurrentTimer" => timeout_current_timer,
    "SetEnergy" => set_energy,
    "Output" => output,
    "Input" => input,
});

/// Live metering. Voltages in V, currents in A, power in W, energy in Wh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Report3Data {
    pub voltage1: f64,
    pub voltage2: f64,
    pub voltage3: f64,
    pub current1: f64,
    pub current2: f64,
    pub current3: f64,
    pub power: f64,
    pub power_factor: f64,
    pub energy_present: f64,
    pub energy_total: f64,
}

impl Report3Data {
    pub fn refresh(&mut self, raw: &Report3Raw) {
        self.voltage1 = raw.u1;
        self.voltage2 = raw.u2;
        self.voltage3 = raw.u3;
        self.current1 = raw.i1 / MILLI;
        self.current2 = raw.i2 / MILLI;
        self.current3 = raw.i3 / MILLI;
        self.power = raw.p / MILLI;
        self.power_factor = raw.pf / TENTHS;
        self.energy_present = raw.e_pres / TENTHS;
        self.energy_total = raw.e_total / TENTHS;
    }
}

view_properties!(Report3Data {
    "Voltage1" => voltage1,
    "Voltage2" => voltage2,
    "Voltage3" => voltage3,
    "Current1" => current1,
    "Current2" => current2,
    "Current3" => current3,
    "Power" => power,
    "PowerFactor" => power_factor,
    "EnergyPresent" => energy_present,
    "EnergyTotal" => energy_total,
});

/// One charging session. Energy in Wh, current in A, times in seconds of charger uptime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChargingReport {
    pub report_id: u32,
    pub session_id: i64,
    pub current_hardware: f64,
    pub energy_start: f64,
    pub energy_present: f64,
    pub started_seconds: i64,
    pub ended_seconds: i64,
    pub started: String,
    pub ended: String,
    pub reason: i64,
    pub rfid_tag: String,
    pub rfid_class: String,
    pub serial: String,
}

impl ChargingReport {
    pub fn refresh(&mut self, report_id: u32, raw: &SessionRaw) {
        self.report_id = report_id;
        self.session_id = raw.session_id;
        self.current_hardware = raw.curr_hw / MILLI;
        self.energy_start = raw.e_start / TENTHS;
        self.energy_present = raw.e_pres / TENTHS;
        self.started_seconds = raw.started_s;
        self.ended_seconds = raw.ended_s;
        self.started = raw.started.clone();
        self.ended = raw.ended.clone();
        self.reason = raw.reason;
        self.rfid_tag = raw.rfid_tag.clone();
        self.rfid_class = raw.rfid_class.clone();
        self.serial = raw.serial.clone();
    }

    /// History slot content; sessions with id zero were never recorded.
    pub fn from_history(report_id: u32, raw: Option<&SessionRaw>) -> Option<Self> {
        let raw = raw.filter(|raw| raw.session_id != 0)?;
        let mut report = Self::default();
        report.refresh(report_id, raw);
        Some(report)
    }
}

view_properties!(ChargingReport {
    "ReportId" => report_id,
    "SessionId" => session_id,
    "CurrentHardware" => current_hardware,
    "EnergyStart" => energy_start,
    "EnergyPresent" => energy_present,
    "StartedSeconds" => started_seconds,
    "EndedSeconds" => ended_seconds,
    "Started" => started,
    "Ended" => ended,
    "Reason" => reason,
    "RfidTag" => rfid_tag,
    "RfidClass" => rfid_class,
    "Serial" => serial,
});
