//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Modbus TCP client and in-memory register bank."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::*;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Connection parameters for a Modbus TCP device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusEndpoint {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout: Duration,
}

/// Holding register primitives used by the Modbus gateways.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    async fn write_multiple_registers(
        &self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError>;

    /// Re-apply the endpoint; an open connection is dropped and re-established lazily.
    fn update(&self, endpoint: ModbusEndpoint);
}

/// `tokio-modbus` TCP client that connects on first use and reconnects after any error.
pub struct ModbusTcpClient {
    endpoint: RwLock<ModbusEndpoint>,
    context: Mutex<Option<Context>>,
}

impl ModbusTcpClient {
    pub fn new(endpoint: ModbusEndpoint) -> Self {
        Self {
            endpoint: RwLock::new(endpoint),
            context: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> ModbusEndpoint {
        self.endpoint.read().clone()
    }

    async fn connect(endpoint: &ModbusEndpoint) -> Result<Context, TransportError> {
        let target = format!("{}:{}", endpoint.host, endpoint.port);
        let socket_addr: SocketAddr = tokio::net::lookup_host(target.as_str())
            .await?
            .next()
            .ok_or_else(|| TransportError::Resolve(target.clone()))?;
        let context = timeout(
            endpoint.timeout,
            tcp::connect_slave(socket_addr, Slave(endpoint.slave_id)),
        )
        .await
        .map_err(|_| TransportError::Timeout(endpoint.timeout))??;
        info!(
            address = %socket_addr,
            slave = endpoint.slave_id,
            "modbus connection established"
        );
        Ok(context)
    }

    /// Lock the connection slot, connecting first when it is empty.
    async fn connected(
        &self,
        endpoint: &ModbusEndpoint,
    ) -> Result<MutexGuard<'_, Option<Context>>, TransportError> {
        let mut guard = self.context.lock().await;
        if guard.is_none() {
            *guard = Some(Self::connect(endpoint).await?);
        }
        Ok(guard)
    }

    /// Classify a finished request, discarding the connection on transport failures.
    fn settle<T>(
        slot: &mut Option<Context>,
        endpoint: &ModbusEndpoint,
        outcome: Result<tokio_modbus::Result<T>, Elapsed>,
    ) -> Result<T, TransportError> {
        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(exception))) => Err(TransportError::Exception(format!("{exception:?}"))),
            Ok(Err(err)) => {
                warn!(error = %err, "modbus request failed; dropping connection");
                *slot = None;
                Err(TransportError::Modbus(err.to_string()))
            }
            Err(_) => {
                warn!(
                    timeout_ms = endpoint.timeout.as_millis() as u64,
                    "modbus request timed out; dropping connection"
                );
                *slot = None;
                Err(TransportError::Timeout(endpoint.timeout))
            }
        }
    }
}

#[async_trait]
impl ModbusTransport for ModbusTcpClient {
    async fn read_holding_registers(
        &self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        debug!(address, count, "read holding registers");
        let endpoint = self.endpoint();
        let mut slot = self.connected(&endpoint).await?;
        let Some(context) = slot.as_mut() else {
            return Err(TransportError::Modbus("no connection".into()));
        };
        let outcome = timeout(
            endpoint.timeout,
            context.read_holding_registers(address, count),
        )
        .await;
        Self::settle(&mut slot, &endpoint, outcome)
    }

    async fn write_multiple_registers(
        &self,
        address: u16,
        values: &[u16],
    ) -> Result<(), TransportError> {
        debug!(address, count = values.len(), "write multiple registers");
        let endpoint = self.endpoint();
        let mut slot = self.connected(&endpoint).await?;
        let Some(context) = slot.as_mut() else {
            return Err(TransportError::Modbus("no connection".into()));
        };
        let outcome = timeout(
            endpoint.timeout,
            context.write_multiple_registers(address, values),
        )
        .await;
        Self::settle(&mut slot, &endpoint, outcome)
    }

    fn update(&self, endpoint: ModbusEndpoint) {
        debug!(
            host = %endpoint.host,
            port = endpoint.port,
            slave = endpoint.slave_id,
            "modbus endpoint updated"
        );
        *self.endpoint.write() = endpoint;
        if let Ok(mut context) = self.context.try_lock() {
            *context = None;
        }
    }
}
