//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "wallbox"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "KEBA KeContact P30 wallbox gateway over UDP."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! The charger answers `report N` datagrams with a JSON object whose `ID` repeats the
//! requested report. Commands are acknowledged with `TCH-OK :done`.

mod data;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use devgw_common::WallboxSettings;
use devgw_core::{
    canonical_name, decode_json, DeviceGateway, GatewayError, OperationStatus, PropertyAccess,
    PropertyReading, SingleFlight, StatusCode,
};
use devgw_transport::{UdpClient, UdpEndpoint, UdpTransport};

pub use data::{
    ChargingReport, ChargingState, Report1Data, Report1Raw, Report2Data, Report2Raw, Report3Data,
    Report3Raw, ReportId, SessionRaw, HISTORY_FIRST, HISTORY_LAST, HISTORY_LEN,
};

const ACCEPTED: &str = "TCH-OK :done";

const VIEW_NAMES: &[&str] = &["Report1", "Report2", "Report3", "Report100", "Reports"];

const WRITABLE: &[&str] = &[
    "Ena",
    "Curr",
    "CurrTime",
    "SetEnergy",
    "Output",
    "Display",
    "Unlock",
    "Start",
    "Stop",
];

const MAX_DISPLAY_TEXT: usize = 23;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WallboxViews {
    report1: Report1Data,
    report2: Report2Data,
    report3: Report3Data,
    report100: ChargingReport,
    reports: Vec<Option<ChargingReport>>,
}

impl Default for WallboxViews {
    fn default() -> Self {
        Self {
            report1: Report1Data::default(),
            report2: Report2Data::default(),
            report3: Report3Data::default(),
            report100: ChargingReport::default(),
            reports: vec![None; HISTORY_LEN],
        }
    }
}

#[derive(Debug, Deserialize)]
struct InfoRaw {
    #[serde(rename = "Firmware")]
    firmware: String,
}

fn endpoint_of(settings: &WallboxSettings) -> UdpEndpoint {
    UdpEndpoint {
        host: settings.address.clone(),
        port: settings.port,
        local_port: settings.local_port,
        timeout: settings.timeout,
    }
}

fn parse_flag(value: &str) -> Option<u32> {
    value.parse::<u32>().ok().filter(|flag| *flag <= 1)
}

fn parse_current(value: &str) -> Option<u32> {
    value
        .parse::<u32>()
        .ok()
        .filter(|current| *current == 0 || (6000..=63000).contains(current))
}

/// Translate a property write into the charger command, validating the value.
pub fn command_for(property: &str, value: &str) -> Result<String, String> {
    let value = value.trim();
    let invalid = || format!("'{value}' is not a valid value for {property}");
    match property {
        "Ena" => parse_flag(value).map(|flag| format!("ena {flag}")).ok_or_else(invalid),
        "Curr" => parse_current(value)
            .map(|current| format!("curr {current}"))
            .ok_or_else(invalid),
        "CurrTime" => {
            let mut parts = value.split_whitespace();
            let current = parts.next().and_then(parse_current);
            let seconds = parts
                .next()
                .and_then(|seconds| seconds.parse::<u32>().ok())
                .filter(|seconds| *seconds <= 860_400);
            match (current, seconds, parts.next()) {
                (Some(current), Some(seconds), None) => Ok(format!("currtime {current} {seconds}")),
                _ => Err(invalid()),
            }
        }
        "SetEnergy" => value
            .parse::<u64>()
            .ok()
            .filter(|energy| *energy <= 999_999_999)
            .map(|energy| format!("setenergy {energy}"))
            .ok_or_else(invalid),
        "Output" => value
            .parse::<u32>()
            .ok()
            .filter(|output| *output <= 150)
            .map(|output| format!("output {output}"))
            .ok_or_else(invalid),
        "Display" => {
            if value.is_empty() || value.chars().count() > MAX_DISPLAY_TEXT {
                return Err(invalid());
            }
            Ok(format!("display 0 0 0 0 {}", value.replace(' ', "$")))
        }
        "Unlock" => Ok("unlock".to_owned()),
        "Start" | "Stop" => {
            let parts: Vec<&str> = value.split_whitespace().collect();
            let limit = if property == "Start" { 2 } else { 1 };
            if parts.is_empty() || parts.len() > limit {
                return Err(invalid());
            }
            Ok(format!("{} {}", property.to_ascii_lowercase(), parts.join(" ")))
        }
        _ => Err(format!("property '{property}' is not writable")),
    }
}

pub struct WallboxGateway<T = UdpClient> {
    flight: SingleFlight,
    transport: T,
    settings: RwLock<WallboxSettings>,
    views: RwLock<WallboxViews>,
}

impl WallboxGateway<UdpClient> {
    pub fn new(settings: WallboxSettings) -> Self {
        let transport = UdpClient::new(endpoint_of(&settings));
        Self::with_transport(settings, transport)
    }
}

impl<T: UdpTransport> WallboxGateway<T> {
    pub fn with_transport(settings: WallboxSettings, transport: T) -> Self {
        Self {
            flight: SingleFlight::new("wallbox"),
            transport,
            settings: RwLock::new(settings),
            views: RwLock::new(WallboxViews::default()),
        }
    }

    pub fn settings(&self) -> WallboxSettings {
        self.settings.read().clone()
    }

    pub fn update(&self, settings: WallboxSettings) {
        self.transport.update(endpoint_of(&settings));
        *self.settings.write() = settings;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn report1(&self) -> Report1Data {
        self.views.read().report1.clone()
    }

    pub fn report2(&self) -> Report2Data {
        self.views.read().report2.clone()
    }

    pub fn report3(&self) -> Report3Data {
        self.views.read().report3.clone()
    }

    pub fn report100(&self) -> ChargingReport {
        self.views.read().report100.clone()
    }

    /// History slots for reports 101..=130; `None` where the charger holds no session.
    pub fn reports(&self) -> Vec<Option<ChargingReport>> {
        self.views.read().reports.clone()
    }

    pub async fn read_report1(&self) -> OperationStatus {
        self.flight
            .run("read_report1", || async {
                let raw: Report1Raw = self.fetch_report(1).await?;
                self.views.write().report1.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_report2(&self) -> OperationStatus {
        self.flight
            .run("read_report2", || async {
                let raw: Report2Raw = self.fetch_report(2).await?;
                self.views.write().report2.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_report3(&self) -> OperationStatus {
        self.flight
            .run("read_report3", || async {
                let raw: Report3Raw = self.fetch_report(3).await?;
                self.views.write().report3.refresh(&raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    pub async fn read_report100(&self) -> OperationStatus {
        self.flight
            .run("read_report100", || async {
                let raw: SessionRaw = self.fetch_report(100).await?;
                self.views.write().report100.refresh(100, &raw);
                Ok::<_, GatewayError>(())
            })
            .await
    }

    /// Read the charging history into the fixed list of slots.
    pub async fn read_reports(&self) -> OperationStatus {
        self.flight.run("read_reports", || self.read_reports_inner()).await
    }

    /// Firmware banner answered to the `i` command.
    pub async fn read_info(&self) -> PropertyReading {
        let (status, value) = self
            .flight
            .run_with("read_info", || async {
                let reply = self.transport.exchange("i").await?;
                let body = if reply.starts_with('{') {
                    reply
                } else {
                    format!("{{{reply}}}")
                };
                let info: InfoRaw = decode_json("info", &body)?;
                Ok::<_, GatewayError>(Value::from(info.firmware))
            })
            .await;
        PropertyReading::new(status, value)
    }

    async fn fetch_report<R: DeserializeOwned>(&self, id: u32) -> Result<R, GatewayError> {
        let command = format!("report {id}");
        let reply = self.transport.exchange(&command).await?;
        let header: ReportId = decode_json(&command, &reply)?;
        if header.id != id {
            return Err(GatewayError::decoding(
                &command,
                format!("reply carries ID {}", header.id),
            ));
        }
        debug!(report = id, "wallbox report received");
        decode_json(&command, &reply)
    }

    async fn fetch_history(&self, id: u32) -> Result<Option<SessionRaw>, GatewayError> {
        let command = format!("report {id}");
        let reply = self.transport.exchange(&command).await?;
        if reply.trim().is_empty() {
            return Ok(None);
        }
        let header: ReportId = decode_json(&command, &reply)?;
        if header.id != id {
            return Err(GatewayError::decoding(
                &command,
                format!("reply carries ID {}", header.id),
            ));
        }
        decode_json(&command, &reply).map(Some)
    }

    async fn read_all_inner(&self) -> Result<(), GatewayError> {
        let report1: Report1Raw = self
            .fetch_report(1)
            .await
            .map_err(|err| GatewayError::sub_read("report 1", err))?;
        let report2: Report2Raw = self
            .fetch_report(2)
            .await
            .map_err(|err| GatewayError::sub_read("report 2", err))?;
        let report3: Report3Raw = self
            .fetch_report(3)
            .await
            .map_err(|err| GatewayError::sub_read("report 3", err))?;
        let report100: SessionRaw = self
            .fetch_report(100)
            .await
            .map_err(|err| GatewayError::sub_read("report 100", err))?;

        let mut views = self.views.write();
        views.report1.refresh(&report1);
        views.report2.refresh(&report2);
        views.report3.refresh(&report3);
        views.report100.refresh(100, &report100);
        info!(
            gateway = "wallbox",
            state = %views.report2.state_text,
            power = views.report3.power,
            "wallbox data refreshed"
        );
        Ok(())
    }

    async fn read_reports_inner(&self) -> Result<(), GatewayError> {
        let mut reports = Vec::with_capacity(HISTORY_LEN);
        for id in HISTORY_FIRST..=HISTORY_LAST {
            let raw = self
                .fetch_history(id)
                .await
                .map_err(|err| GatewayError::sub_read(&format!("report {id}"), err))?;
            reports.push(ChargingReport::from_history(id, raw.as_ref()));
        }
        let recorded = reports.iter().filter(|slot| slot.is_some()).count();
        self.views.write().reports = reports;
        info!(gateway = "wallbox", recorded, "charging history refreshed");
        Ok(())
    }

    async fn send_command(&self, command: &str) -> Result<(), GatewayError> {
        let reply = self.transport.exchange(command).await?;
        if reply != ACCEPTED {
            return Err(GatewayError::device_failure(
                reply,
                format!("command '{command}' was not accepted"),
            ));
        }
        info!(gateway = "wallbox", command, "command accepted");
        Ok(())
    }
}

#[async_trait]
impl<T: UdpTransport + 'static> DeviceGateway for WallboxGateway<T> {
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
            "Report1" => serde_json::to_value(&views.report1),
            "Report2" => serde_json::to_value(&views.report2),
            "Report3" => serde_json::to_value(&views.report3),
            "Report100" => serde_json::to_value(&views.report100),
            _ => serde_json::to_value(&views.reports),
        };
        value.ok()
    }

    /// History entries are addressed by report id, e.g. `Reports/101`.
    fn view_property(&self, view: &str, property: &str) -> Option<Value> {
        let views = self.views.read();
        match self.canonical_view(view)? {
            "Report1" => views.report1.property(property),
            "Report2" => views.report2.property(property),
            "Report3" => views.report3.property(property),
            "Report100" => views.report100.property(property),
            _ => {
                let id = property.parse::<u32>().ok()?;
                let index = id.checked_sub(HISTORY_FIRST)? as usize;
                serde_json::to_value(views.reports.get(index)?).ok()
            }
        }
    }

    async fn read_all(&self) -> OperationStatus {
        self.flight.run("read_all", || self.read_all_inner()).await
    }

    async fn read_property(&self, name: &str) -> PropertyReading {
        let report = if Report1Data::has_property(name) {
            1
        } else if Report2Data::has_property(name) {
            2
        } else if Report3Data::has_property(name) {
            3
        } else {
            return PropertyReading::new(
                OperationStatus::not_found(format!("property '{name}' is not readable")),
                None,
            );
        };
        let (status, value) = self
            .flight
            .run_with("read_property", || async {
                let value = match report {
                    1 => {
                        let raw: Report1Raw = self.fetch_report(1).await?;
                        let mut views = self.views.write();
                        views.report1.refresh(&raw);
                        views.report1.property(name)
                    }
                    2 => {
                        let raw: Report2Raw = self.fetch_report(2).await?;
                        let mut views = self.views.write();
                        views.report2.refresh(&raw);
                        views.report2.property(name)
                    }
                    _ => {
                        let raw: Report3Raw = self.fetch_report(3).await?;
                        let mut views = self.views.write();
                        views.report3.refresh(&raw);
                        views.report3.property(name)
                    }
                };
                Ok::<_, GatewayError>(value.unwrap_or(Value::Null))
            })
            .await;
        PropertyReading::new(status, value)
    }

    async fn write_property(&self, name: &str, value: &str) -> OperationStatus {
        let Some(property) = canonical_name(WRITABLE, name) else {
            return OperationStatus::not_found(format!("property '{name}' is not writable"));
        };
        let command = match command_for(property, value) {
            Ok(command) => command,
            Err(reason) => return OperationStatus::new(StatusCode::BadDecodingError, reason),
        };
        self.flight
            .run("write_property", || self.send_command(&command))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedUdp;
    use serde_json::json;
    use std::time::Duration;

    fn settings() -> WallboxSettings {
        WallboxSettings {
            address: "wallbox.local".into(),
            port: 7090,
            local_port: 0,
            timeout: Duration::from_millis(500),
        }
    }

    fn charger() -> ScriptedUdp {
        let udp = ScriptedUdp::new();
        udp.on(
            "report 1",
            json!({
                "ID": "1", "Product": "KC-P30-EC240422-E00", "Serial": "18273645",
                "Firmware": "P30 v 3.10.16", "Sec": 4242
            })
            .to_string(),
        )
        .on(
            "report 2",
            json!({
                "ID": "2", "State": 3, "Plug": 7, "Enable sys": 1,
                "Max curr": 16000, "Curr user": 10000, "Setenergy": 100000
            })
            .to_string(),
        )
        .on(
            "report 3",
            json!({
                "ID": "3", "U1": 229, "U2": 231, "U3": 230, "I1": 9980, "P": 6900000,
                "PF": 975, "E pres": 45210, "E total": 12345678
            })
            .to_string(),
        )
        .on(
            "report 100",
            json!({
                "ID": "100", "Session ID": 77, "E start": 12300000,
                "E pres": 45210, "RFID tag": "e3f76b8d"
            })
            .to_string(),
        );
        udp
    }

    #[tokio::test]
    async fn read_all_reads_the_four_reports_in_order() {
        let gateway = WallboxGateway::with_transport(settings(), charger());
        assert!(gateway.read_all().await.is_good());

        assert_eq!(
            gateway.transport().commands(),
            vec!["report 1", "report 2", "report 3", "report 100"]
        );
        assert_eq!(gateway.report1().serial, "18273645");
        assert_eq!(gateway.report2().state_text, "Charging");
        assert_eq!(gateway.report2().current_user, 10.0);
        assert_eq!(gateway.report2().set_energy, 10000.0);
        assert_eq!(gateway.report3().current1, 9.98);
        assert_eq!(gateway.report3().power, 6900.0);
        assert_eq!(gateway.report3().power_factor, 97.5);
        assert_eq!(gateway.report100().energy_present, 4521.0);
        assert_eq!(gateway.report100().rfid_tag, "e3f76b8d");
    }

    #[tokio::test]
    async fn mismatched_report_id_is_a_decoding_error() {
        let udp = charger();
        udp.on("report 2", json!({ "ID": "3", "U1": 230 }).to_string());
        let gateway = WallboxGateway::with_transport(settings(), udp);

        let status = gateway.read_report2().await;
        assert_eq!(status.code(), StatusCode::BadDecodingError);

        let status = gateway.read_all().await;
        assert_eq!(status.code(), StatusCode::BadCommunicationError);
        assert!(status.explanation().contains("report 2"));
        assert_eq!(gateway.report1(), Report1Data::default());
    }

    #[tokio::test]
    async fn history_keeps_thirty_slots_with_explicit_gaps() {
        let udp = ScriptedUdp::new();
        for id in HISTORY_FIRST..=HISTORY_LAST {
            let session = if id % 2 == 1 { id as i64 } else { 0 };
            udp.on(
                &format!("report {id}"),
                json!({ "ID": id.to_string(), "Session ID": session, "E pres": 1000 }).to_string(),
            );
        }
        udp.on("report 130", "");
        let gateway = WallboxGateway::with_transport(settings(), udp);

        assert!(gateway.read_reports().await.is_good());
        let reports = gateway.reports();
        assert_eq!(reports.len(), HISTORY_LEN);
        assert_eq!(reports[0].as_ref().map(|r| r.session_id), Some(101));
        assert!(reports[1].is_none());
        assert!(reports[29].is_none());
        assert_eq!(reports[2].as_ref().map(|r| r.energy_present), Some(100.0));

        assert_eq!(
            gateway.view_property("reports", "103").unwrap()["SessionId"],
            json!(103)
        );
        assert_eq!(gateway.view_property("reports", "102"), Some(Value::Null));
        assert_eq!(gateway.view_property("reports", "131"), None);
    }

    #[tokio::test]
    async fn unknown_write_is_rejected_without_a_datagram() {
        let gateway = WallboxGateway::with_transport(settings(), charger());
        let status = gateway.write_property("UnknownField", "1").await;
        assert_eq!(status.code(), StatusCode::BadNotFound);
        assert_eq!(gateway.transport().call_count(), 0);

        let status = gateway.write_property("curr", "4000").await;
        assert_eq!(status.code(), StatusCode::BadDecodingError);
        assert_eq!(gateway.transport().call_count(), 0);
    }

    #[tokio::test]
    async fn accepted_and_rejected_commands() {
        let udp = charger();
        udp.on("curr 16000", ACCEPTED).on("ena 0", "TCH-ERR");
        let gateway = WallboxGateway::with_transport(settings(), udp);

        assert!(gateway.write_property("Curr", "16000").await.is_good());
        let status = gateway.write_property("ENA", "0").await;
        assert_eq!(status.code(), StatusCode::BadDeviceFailure);
        assert!(status.explanation().contains("TCH-ERR"));
        assert_eq!(gateway.transport().commands(), vec!["curr 16000", "ena 0"]);
    }

    #[tokio::test]
    async fn property_read_refreshes_the_owning_report() {
        let gateway = WallboxGateway::with_transport(settings(), charger());
        let reading = gateway.read_property("power").await;
        assert!(reading.status.is_good());
        assert_eq!(reading.value, Some(json!(6900.0)));
        assert_eq!(gateway.transport().commands(), vec!["report 3"]);

        let reading = gateway.read_property("Voltage9").await;
        assert_eq!(reading.status.code(), StatusCode::BadNotFound);
        assert_eq!(gateway.transport().call_count(), 1);
    }

    #[tokio::test]
    async fn info_banner_is_wrapped_into_json() {
        let udp = ScriptedUdp::new();
        udp.on("i", "\"Firmware\":\"P30 v 3.10.16 (180608-103710)\"");
        let gateway = WallboxGateway::with_transport(settings(), udp);
        let reading = gateway.read_info().await;
        assert_eq!(reading.value, Some(json!("P30 v 3.10.16 (180608-103710)")));
    }

    #[test]
    fn commands_are_validated() {
        assert_eq!(command_for("CurrTime", "10000 60").unwrap(), "currtime 10000 60");
        assert!(command_for("CurrTime", "10000").is_err());
        assert_eq!(command_for("Display", "hello world").unwrap(), "display 0 0 0 0 hello$world");
        assert!(command_for("Display", "").is_err());
        assert_eq!(
            command_for("Start", "e3f76b8d 01010400000000000000").unwrap(),
            "start e3f76b8d 01010400000000000000"
        );
        assert!(command_for("Stop", "a b").is_err());
        assert_eq!(command_for("Unlock", "").unwrap(), "unlock");
        assert_eq!(command_for("SetEnergy", "100000").unwrap(), "setenergy 100000");
        assert!(command_for("Ena", "2").is_err());
    }
}
