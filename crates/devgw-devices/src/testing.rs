//! ---
//! ems_section: "06-device-integrations"
//! ems_subsection: "testing"
//! ems_type: "source"
//! ems_scope: "test"
//! ems_description: "Scripted transports with call-count spies."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use devgw_transport::{
    HttpEndpoint, HttpTransport, ModbusEndpoint, ModbusTransport, TransportError, UdpEndpoint,
    UdpTransport,
};
use parking_lot::Mutex;

/// One recorded HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCall {
    pub method: &'static str,
    pub path: String,
    pub form: Vec<(String, String)>,
}

impl HttpCall {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Failure(String),
}

/// Tracks how many calls overlap, to assert single-flight behaviour.
#[derive(Debug, Default)]
struct Overlap {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Overlap {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// HTTP transport answering from a table keyed by `METHOD path`.
///
/// Unscripted requests get an empty body, like a device answering 404.
#[derive(Debug, Default)]
pub struct ScriptedHttp {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<HttpCall>>,
    delay: Mutex<Option<Duration>>,
    overlap: Overlap,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get(&self, path: &str, body: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .insert(format!("GET {path}"), Reply::Body(body.into()));
        self
    }

    pub fn on_post(&self, path: &str, body: impl Into<String>) -> &Self {
        self.replies
            .lock()
            .insert(format!("POST {path}"), Reply::Body(body.into()));
        self
    }

    pub fn fail_get(&self, path: &str, message: &str) -> &Self {
        self.replies
            .lock()
            .insert(format!("GET {path}"), Reply::Failure(message.into()));
        self
    }

    pub fn with_delay(&self, delay: Duration) -> &Self {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<HttpCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.overlap.max.load(Ordering::SeqCst)
    }

    async fn answer(
        &self,
        method: &'static str,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        self.overlap.enter();
        self.calls.lock().push(HttpCall {
            method,
            path: path.to_owned(),
            form: form
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
                .collect(),
        });
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = self.replies.lock().get(&format!("{method} {path}")).cloned();
        self.overlap.leave();
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Failure(message)) => {
                Err(TransportError::Io(std::io::Error::other(message)))
            }
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedHttp {
    async fn get(&self, path: &str) -> Result<String, TransportError> {
        self.answer("GET", path, &[]).await
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<String, TransportError> {
        self.answer("POST", path, form).await
    }

    fn update(&self, _endpoint: HttpEndpoint) {}
}

/// UDP transport answering commands from a table; unknown commands time out.
#[derive(Debug, Default)]
pub struct ScriptedUdp {
    replies: Mutex<HashMap<String, String>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedUdp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, command: &str, reply: impl Into<String>) -> &Self {
        self.replies.lock().insert(command.to_owned(), reply.into());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.commands.lock().len()
    }
}

#[async_trait]
impl UdpTransport for ScriptedUdp {
    async fn exchange(&self, command: &str) -> Result<String, TransportError> {
        self.commands.lock().push(command.to_owned());
        self.replies
            .lock()
            .get(command)
            .cloned()
            .ok_or(TransportError::Timeout(Duration::from_millis(100)))
    }

    fn update(&self, _endpoint: UdpEndpoint) {}
}

/// easyControls variable table reachable through holding register 1.
///
/// A write of `vXXXXX` selects a variable, a write of `vXXXXX=value` stores it; the next
/// read returns `vXXXXX=value` zero-padded to the requested register count.
#[derive(Debug, Default)]
pub struct HeliosDevice {
    variables: Mutex<HashMap<String, String>>,
    selected: Mutex<Option<String>>,
    answer_as: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl HeliosDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, value: &str) -> &Self {
        self.variables.lock().insert(id.to_owned(), value.to_owned());
        self
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.variables.lock().get(id).cloned()
    }

    /// Answer every read with this variable id regardless of the request.
    pub fn answer_as(&self, id: &str) {
        *self.answer_as.lock() = Some(id.to_owned());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModbusTransport for HeliosDevice {
    async fn read_holding_registers(
        &self,
        _address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let selected = self.selected.lock().clone().unwrap_or_default();
        let id = self.answer_as.lock().clone().unwrap_or_else(|| selected.clone());
        let value = self.get(&selected).unwrap_or_default();
        let mut bytes = format!("{id}={value}").into_bytes();
        bytes.resize(count as usize * 2, 0);
        Ok(bytes
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    async fn write_multiple_registers(
        &self,
        _address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes: Vec<u8> = values.iter().flat_map(|word| word.to_be_bytes()).collect();
        let text = String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_owned();
        match text.split_once('=') {
            Some((id, value)) => {
                self.variables.lock().insert(id.to_owned(), value.to_owned());
            }
            None => *self.selected.lock() = Some(text),
        }
        Ok(())
    }

    fn update(&self, _endpoint: ModbusEndpoint) {}
}

/// In-memory holding registers.
///
/// Unset registers read as zero. Every transport call is counted.
#[derive(Debug, Default)]
pub struct RegisterBank {
    registers: parking_lot::Mutex<HashMap<u16, u16>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl RegisterBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, address: u16, values: &[u16]) {
        let mut registers = self.registers.lock();
        for (offset, value) in values.iter().enumerate() {
            registers.insert(address.wrapping_add(offset as u16), *value);
        }
    }

    pub fn get(&self, address: u16, count: u16) -> Vec<u16> {
        let registers = self.registers.lock();
        (0..count)
            .map(|offset| *registers.get(&address.wrapping_add(offset)).unwrap_or(&0))
            .collect()
    }

    /// Number of read/write calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following call fail as if the device went offline.
    pub fn set_offline(&self, offline: bool) {
        self.failing.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Modbus("device offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ModbusTransport for RegisterBank {
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.check_online()?;
        Ok(self.get(address, count))
    }

    async fn write_multiple_registers(
        &self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        self.check_online()?;
        self.set(address, values);
        Ok(())
    }

    fn update(&self, _endpoint: ModbusEndpoint) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_bank_read_write_cycle() {
        let bank = RegisterBank::new();
        bank.write_multiple_registers(1, &[123, 456]).await.unwrap();
        bank.set(3, &[789]);

        let values = bank.read_holding_registers(1, 4).await.unwrap();
        assert_eq!(values, vec![123, 456, 789, 0]);
        assert_eq!(bank.calls(), 2);

        bank.set_offline(true);
        assert!(bank.read_holding_registers(1, 1).await.is_err());
        assert_eq!(bank.calls(), 3);
    }

    #[test]
    fn register_bank_wraps_at_the_top_of_the_address_space() {
        let bank = RegisterBank::new();
        bank.set(0xFFFF, &[7, 8]);
        assert_eq!(bank.get(0xFFFF, 2), vec![7, 8]);
        assert_eq!(bank.get(0, 1), vec![8]);
    }
}
