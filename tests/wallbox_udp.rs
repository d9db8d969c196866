//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Wallbox gateway against an in-process UDP charger."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod support;

use std::time::Duration;

use devgw_common::WallboxSettings;
use devgw_core::{DeviceGateway, StatusCode};
use devgw_devices::WallboxGateway;
use serde_json::json;
use support::spawn_charger;

fn settings(port: u16) -> WallboxSettings {
    WallboxSettings {
        address: "127.0.0.1".into(),
        port,
        local_port: 0,
        timeout: Duration::from_millis(300),
    }
}

#[tokio::test]
async fn reports_are_read_over_udp() {
    let (port, charger) = spawn_charger().await;
    let gateway = WallboxGateway::new(settings(port));

    let status = gateway.read_all().await;
    assert!(status.is_good(), "{status}");
    assert_eq!(
        charger.commands(),
        vec!["report 1", "report 2", "report 3", "report 100"]
    );
    assert_eq!(gateway.report1().serial, "18273645");
    assert_eq!(gateway.report2().state_text, "Ready");
    assert_eq!(gateway.report2().max_current, 32.0);
    assert_eq!(gateway.report3().energy_total, 987654.3);
    assert_eq!(
        gateway.view_property("Report2", "CurrentUser"),
        Some(json!(16.0))
    );
}

#[tokio::test]
async fn history_slots_follow_the_charger() {
    let (port, charger) = spawn_charger().await;
    let gateway = WallboxGateway::new(settings(port));

    assert!(gateway.read_reports().await.is_good());
    let reports = gateway.reports();
    assert_eq!(reports.len(), 30);
    assert_eq!(reports.iter().filter(|slot| slot.is_some()).count(), 3);
    let newest = reports[0].as_ref().unwrap();
    assert_eq!(newest.session_id, 399);
    assert_eq!(newest.energy_present, 5234.0);
    assert_eq!(newest.rfid_tag, "e3f76b8d");
    assert_eq!(charger.commands().len(), 30);
}

#[tokio::test]
async fn mismatched_id_and_silence() {
    let (port, charger) = spawn_charger().await;
    charger.reply("report 3", json!({ "ID": "2", "State": 3 }));
    let gateway = WallboxGateway::new(settings(port));

    let status = gateway.read_report3().await;
    assert_eq!(status.code(), StatusCode::BadDecodingError);

    charger.replies.lock().remove("report 1");
    let status = gateway.read_all().await;
    assert_eq!(status.code(), StatusCode::BadCommunicationError);
    assert!(status.explanation().starts_with("report 1 read failed"));
}

#[tokio::test]
async fn commands_are_acknowledged() {
    let (port, charger) = spawn_charger().await;
    let gateway = WallboxGateway::new(settings(port));

    assert!(gateway.write_property("Curr", "10000").await.is_good());
    let status = gateway.write_property("Ena", "0").await;
    assert_eq!(status.code(), StatusCode::BadDeviceFailure);
    assert_eq!(
        gateway.write_property("UnknownField", "1").await.code(),
        StatusCode::BadNotFound
    );
    assert_eq!(charger.commands(), vec!["curr 10000", "ena 0"]);
}
