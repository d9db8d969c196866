//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "EM300LR gateway against an in-process HTTP meter."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod support;

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use devgw_common::Em300lrSettings;
use devgw_core::{DeviceGateway, StatusCode};
use devgw_devices::em300lr::Phase;
use devgw_devices::Em300lrGateway;
use support::{spawn_meter, PASSWORD, SERIAL};
use url::Url;

fn settings(addr: SocketAddr, password: &str) -> Em300lrSettings {
    Em300lrSettings {
        address: Url::parse(&format!("http://{addr}/")).unwrap(),
        timeout: Duration::from_secs(2),
        password: password.to_owned(),
        serial_number: SERIAL.to_owned(),
    }
}

#[tokio::test]
async fn login_cookie_carries_into_the_data_request() {
    let (addr, meter) = spawn_meter().await;
    let gateway = Em300lrGateway::new(settings(addr, PASSWORD)).unwrap();

    let status = gateway.read_all().await;
    assert!(status.is_good(), "{status}");
    assert_eq!(meter.posts(), 1);

    let total = gateway.total();
    assert_eq!(total.active_power_plus, 2450.5);
    assert_eq!(total.power_factor, 0.981);
    assert_eq!(total.supply_frequency, 50.02);

    let phase1 = gateway.phase(Phase::L1);
    assert_eq!(phase1.active_power_plus, 812.0);
    assert_eq!(phase1.current, 3.55);
    assert_eq!(phase1.voltage, 230.1);
    assert_eq!(gateway.phase(Phase::L3).active_power_plus, 848.0);
    assert_eq!(gateway.status().code(), StatusCode::Good);
}

#[tokio::test]
async fn foreign_meter_is_not_logged_into() {
    let (addr, meter) = spawn_meter().await;
    *meter.serial.lock() = "72139999".to_owned();
    let gateway = Em300lrGateway::new(settings(addr, PASSWORD)).unwrap();

    let status = gateway.read_all().await;
    assert_eq!(status.code(), StatusCode::BadNotFound);
    assert_eq!(meter.posts(), 0);
    assert_eq!(meter.data_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_password_is_no_communication() {
    let (addr, meter) = spawn_meter().await;
    let gateway = Em300lrGateway::new(settings(addr, "guess")).unwrap();

    let status = gateway.read_all().await;
    assert_eq!(status.code(), StatusCode::BadNoCommunication);
    assert_eq!(meter.posts(), 1);
    assert_eq!(meter.data_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn device_status_and_recovery() {
    let (addr, meter) = spawn_meter().await;
    let gateway = Em300lrGateway::new(settings(addr, PASSWORD)).unwrap();

    meter.status.store(7, Ordering::SeqCst);
    let status = gateway.read_all().await;
    assert_eq!(status.code(), StatusCode::BadDeviceFailure);
    assert!(status.explanation().contains('7'));
    assert_eq!(gateway.total().active_power_plus, 0.0);

    meter.status.store(0, Ordering::SeqCst);
    assert!(gateway.read_all().await.is_good());
    assert_eq!(gateway.total().active_power_plus, 2450.5);
}

#[tokio::test]
async fn unreachable_meter_is_internal_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let gateway = Em300lrGateway::new(settings(addr, PASSWORD)).unwrap();

    let status = gateway.read_all().await;
    assert_eq!(status.code(), StatusCode::BadInternalError);
    assert!(!gateway.is_locked());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_share_one_device_session_at_a_time() {
    let (addr, meter) = spawn_meter().await;
    let gateway = Arc::new(Em300lrGateway::new(settings(addr, PASSWORD)).unwrap());

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let gateway = gateway.clone();
        tasks.push(tokio::spawn(async move { gateway.read_all().await }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_good());
    }
    assert_eq!(meter.posts(), 4);
    assert_eq!(meter.data_requests.load(Ordering::SeqCst), 4);
}
