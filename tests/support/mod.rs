//! ---
//! ems_section: "15-testing-qa-runbook"
//! ems_subsection: "integration-tests"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "In-process fake devices shared by the integration suites."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, UdpSocket};

pub const SERIAL: &str = "72130001";
pub const PASSWORD: &str = "s3cret";
const SESSION: &str = "PHPSESSID=4f2a9c";

/// TQ energy manager web service: identity request, cookie based login, OBIS data.
#[derive(Default)]
pub struct FakeMeter {
    pub serial: Mutex<String>,
    pub posts: AtomicUsize,
    pub data_requests: AtomicUsize,
    pub status: AtomicI32,
}

impl FakeMeter {
    pub fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }
}

pub async fn spawn_meter() -> (SocketAddr, Arc<FakeMeter>) {
    let meter = Arc::new(FakeMeter::default());
    *meter.serial.lock() = SERIAL.to_owned();

    let router = Router::new()
        .route("/start.php", get(identity).post(login))
        .route("/mum-webservice/data.php", get(measurements))
        .with_state(meter.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, meter)
}

async fn identity(State(meter): State<Arc<FakeMeter>>) -> Json<Value> {
    let serial = meter.serial.lock().clone();
    Json(json!({ "serial": serial, "app_version": "2.6.4", "authentication": false }))
}

async fn login(
    State(meter): State<Arc<FakeMeter>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    meter.posts.fetch_add(1, Ordering::SeqCst);
    let serial = meter.serial.lock().clone();
    let accepted = form.get("login") == Some(&serial)
        && form.get("password").map(String::as_str) == Some(PASSWORD)
        && form.get("save_login").map(String::as_str) == Some("1");
    if !accepted {
        return Json(json!({ "serial": serial, "authentication": false })).into_response();
    }
    (
        [(header::SET_COOKIE, format!("{SESSION}; Path=/"))],
        Json(json!({ "serial": serial, "authentication": true })),
    )
        .into_response()
}

async fn measurements(State(meter): State<Arc<FakeMeter>>, headers: HeaderMap) -> Response {
    meter.data_requests.fetch_add(1, Ordering::SeqCst);
    let has_session = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookies| cookies.contains(SESSION));
    if !has_session {
        return StatusCode::FORBIDDEN.into_response();
    }
    let serial = meter.serial.lock().clone();
    Json(json!({
        "serial": serial,
        "status": meter.status.load(Ordering::SeqCst),
        "1-0:1.4.0*255": 2450.5,
        "1-0:1.8.0*255": 18250300.0,
        "1-0:2.4.0*255": 0.0,
        "1-0:13.4.0*255": 981,
        "1-0:14.4.0*255": 50020,
        "1-0:21.4.0*255": 812.0,
        "1-0:31.4.0*255": 3550,
        "1-0:32.4.0*255": 230100,
        "1-0:33.4.0*255": 975,
        "1-0:41.4.0*255": 790.5,
        "1-0:61.4.0*255": 848.0
    }))
    .into_response()
}

/// KEBA charger answering report requests and commands over UDP.
#[derive(Default)]
pub struct FakeCharger {
    pub commands: Mutex<Vec<String>>,
    pub replies: Mutex<HashMap<String, String>>,
}

impl FakeCharger {
    pub fn reply(&self, command: &str, reply: Value) {
        self.replies.lock().insert(command.to_owned(), reply.to_string());
    }

    pub fn reply_text(&self, command: &str, reply: &str) {
        self.replies.lock().insert(command.to_owned(), reply.to_owned());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

pub async fn spawn_charger() -> (u16, Arc<FakeCharger>) {
    let charger = Arc::new(FakeCharger::default());
    charger.reply(
        "report 1",
        json!({
            "ID": "1", "Product": "KC-P30-EC240422-E00",
            "Serial": "18273645", "Firmware": "P30 v 3.10.16"
        }),
    );
    charger.reply(
        "report 2",
        json!({
            "ID": "2", "State": 2, "Plug": 7, "Enable sys": 1,
            "Max curr": 32000, "Curr user": 16000
        }),
    );
    charger.reply(
        "report 3",
        json!({
            "ID": "3", "U1": 230, "U2": 229, "U3": 231, "I1": 0, "P": 0,
            "E pres": 0, "E total": 9876543
        }),
    );
    charger.reply(
        "report 100",
        json!({ "ID": "100", "Session ID": 0, "E pres": 0 }),
    );
    for id in 101..=130u32 {
        let session = if id <= 103 { 500 - id } else { 0 };
        charger.reply(
            &format!("report {id}"),
            json!({
                "ID": id.to_string(), "Session ID": session,
                "E pres": 52340, "RFID tag": "e3f76b8d"
            }),
        );
    }
    charger.reply_text("curr 10000", "TCH-OK :done");
    charger.reply_text("ena 0", "TCH-ERR :unknown");

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let device = charger.clone();
    tokio::spawn(async move {
        let mut buffer = [0u8; 512];
        loop {
            let Ok((len, from)) = socket.recv_from(&mut buffer).await else {
                break;
            };
            let command = String::from_utf8_lossy(&buffer[..len]).trim().to_owned();
            device.commands.lock().push(command.clone());
            let reply = device.replies.lock().get(&command).cloned();
            if let Some(reply) = reply {
                let _ = socket.send_to(format!("{reply}\n").as_bytes(), from).await;
            }
        }
    });
    (port, charger)
}
