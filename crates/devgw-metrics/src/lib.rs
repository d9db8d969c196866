//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use devgw_core::{OperationStatus, ReadObserver};
use prometheus::{GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Shared registry type used across the daemon.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render the registry in the Prometheus text format.
pub fn encode(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&registry.gather())
        .map_err(|err| {
            error!(error = %err, "failed to encode metrics");
            err
        })
        .context("metrics encoding error")
}

/// Content type of [`encode`] output.
pub fn content_type() -> &'static str {
    prometheus::TEXT_FORMAT
}

/// Per-gateway operation counters, fed through the single-flight observer hook.
#[derive(Clone, Debug)]
pub struct GatewayMetrics {
    registry: SharedRegistry,
    reads_total: IntCounterVec,
    read_duration_seconds: HistogramVec,
}

impl GatewayMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let reads_total = IntCounterVec::new(
            Opts::new(
                "devgw_reads_total",
                "Guarded gateway operations by gateway and resulting status",
            ),
            &["gateway", "status"],
        )?;
        registry.register(Box::new(reads_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.005, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let read_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "devgw_read_duration_seconds",
                "Time spent inside the single-flight window",
            )
            .buckets(buckets),
            &["gateway"],
        )?;
        registry.register(Box::new(read_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            reads_total,
            read_duration_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn reads(&self, gateway: &str, status: &str) -> u64 {
        self.reads_total.with_label_values(&[gateway, status]).get()
    }
}

impl ReadObserver for GatewayMetrics {
    fn on_operation(
        &self,
        gateway: &str,
        _operation: &str,
        status: &OperationStatus,
        elapsed: Duration,
    ) {
        self.reads_total
            .with_label_values(&[gateway, status.name()])
            .inc();
        self.read_duration_seconds
            .with_label_values(&[gateway])
            .observe(elapsed.as_secs_f64());
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    build_info: GaugeVec,
    startup_ok: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let build_info = GaugeVec::new(
            Opts::new("devgwd_build_info", "Build metadata for the running daemon binary"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        let startup_ok = GaugeVec::new(
            Opts::new(
                "devgwd_gateway_startup_ok",
                "Indicator (0/1) whether the startup read of a gateway succeeded",
            ),
            &["gateway"],
        )?;
        registry.register(Box::new(startup_ok.clone()))?;

        Ok(Self {
            build_info,
            startup_ok,
        })
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }

    pub fn set_startup(&self, gateway: &str, ok: bool) {
        self.startup_ok
            .with_label_values(&[gateway])
            .set(if ok { 1.0 } else { 0.0 });
    }
}

pub use prometheus;
