//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Single-flight guard serialising device round trips per gateway."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::status::{OperationStatus, StatusCode};

/// Receives the outcome of every guarded operation (metrics, audit, tests).
pub trait ReadObserver: Send + Sync {
    fn on_operation(
        &self,
        gateway: &str,
        operation: &str,
        status: &OperationStatus,
        elapsed: Duration,
    );
}

/// Exclusive gate plus the status record shared by every gateway.
///
/// Only one guarded operation runs at a time; further callers wait on the gate. The status
/// is reset to `Good` when an operation starts and replaced by its outcome when it ends.
pub struct SingleFlight {
    gateway: &'static str,
    gate: Mutex<()>,
    locked: AtomicBool,
    startup_ok: AtomicBool,
    status: RwLock<OperationStatus>,
    observer: RwLock<Option<Arc<dyn ReadObserver>>>,
}

/// Clears the locked flag when dropped, also while unwinding.
struct LockedFlag<'a>(&'a AtomicBool);

impl<'a> LockedFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LockedFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SingleFlight {
    pub fn new(gateway: &'static str) -> Self {
        Self {
            gateway,
            gate: Mutex::new(()),
            locked: AtomicBool::new(false),
            startup_ok: AtomicBool::new(false),
            status: RwLock::new(OperationStatus::default()),
            observer: RwLock::new(None),
        }
    }

    pub fn gateway(&self) -> &'static str {
        self.gateway
    }

    /// Non-blocking check used by controllers to reject requests while a read is running.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> OperationStatus {
        self.status.read().clone()
    }

    pub fn is_startup_ok(&self) -> bool {
        self.startup_ok.load(Ordering::SeqCst)
    }

    pub fn mark_startup(&self, status: &OperationStatus) {
        self.startup_ok.store(status.is_good(), Ordering::SeqCst);
    }

    pub fn set_observer(&self, observer: Arc<dyn ReadObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Run `body` exclusively and record its outcome as the gateway status.
    pub async fn run<F, Fut>(&self, operation: &str, body: F) -> OperationStatus
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        self.run_with(operation, body).await.0
    }

    /// Like [`SingleFlight::run`] but hands back the value produced on success.
    pub async fn run_with<T, F, Fut>(
        &self,
        operation: &str,
        body: F,
    ) -> (OperationStatus, Option<T>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let _permit = self.gate.lock().await;
        let _flag = LockedFlag::raise(&self.locked);
        let started = Instant::now();
        *self.status.write() = OperationStatus::good();

        let outcome = AssertUnwindSafe(async move { body().await })
            .catch_unwind()
            .await;
        let (status, value) = match outcome {
            Ok(Ok(value)) => (OperationStatus::good(), Some(value)),
            Ok(Err(err)) => (err.into_status(), None),
            Err(panic) => (
                OperationStatus::new(StatusCode::BadInternalError, panic_message(panic)),
                None,
            ),
        };

        let elapsed = started.elapsed();
        if status.is_good() {
            debug!(
                gateway = self.gateway,
                operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "operation completed"
            );
        } else {
            warn!(
                gateway = self.gateway,
                operation,
                status = status.name(),
                explanation = status.explanation(),
                elapsed_ms = elapsed.as_millis() as u64,
                "operation failed"
            );
        }
        *self.status.write() = status.clone();
        if let Some(observer) = self.observer.read().as_ref() {
            observer.on_operation(self.gateway, operation, &status, elapsed);
        }
        (status, value)
    }
}

impl std::fmt::Debug for SingleFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("gateway", &self.gateway)
            .field("locked", &self.is_locked())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic during read: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic during read: {message}")
    } else {
        "panic during read".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        calls: parking_lot::Mutex<Vec<(String, StatusCode)>>,
    }

    impl ReadObserver for Recorder {
        fn on_operation(&self, _: &str, operation: &str, status: &OperationStatus, _: Duration) {
            self.calls.lock().push((operation.to_owned(), status.code()));
        }
    }

    #[tokio::test]
    async fn successful_run_reports_good_with_empty_explanation() {
        let flight = SingleFlight::new("test");
        assert!(flight.status().is_uncertain());

        let status = flight.run("read_all", || async { Ok(()) }).await;
        assert!(status.is_good());
        assert_eq!(flight.status(), OperationStatus::good());
        assert!(flight.status().explanation().is_empty());
        assert!(!flight.is_locked());
    }

    #[tokio::test]
    async fn errors_become_status_and_lock_is_released() {
        let flight = SingleFlight::new("test");
        let status = flight
            .run("read_all", || async {
                Err(GatewayError::empty_response("data.php"))
            })
            .await;
        assert_eq!(status.code(), StatusCode::BadUnknownResponse);
        assert!(!status.explanation().is_empty());
        assert_eq!(flight.status(), status);
        assert!(!flight.is_locked());
    }

    #[tokio::test]
    async fn panics_are_caught_as_internal_errors() {
        let flight = SingleFlight::new("test");
        let status = flight
            .run("read_all", || async {
                if flight_is_doomed() {
                    panic!("register map exhausted");
                }
                Ok(())
            })
            .await;
        assert_eq!(status.code(), StatusCode::BadInternalError);
        assert!(status.explanation().contains("register map exhausted"));
        assert!(!flight.is_locked());

        let recovered = flight.run("read_all", || async { Ok(()) }).await;
        assert!(recovered.is_good());
    }

    fn flight_is_doomed() -> bool {
        true
    }

    #[tokio::test]
    async fn locked_flag_spans_the_body() {
        let flight = SingleFlight::new("test");
        let status = flight
            .run("read_all", || async {
                assert!(flight.is_locked());
                Ok(())
            })
            .await;
        assert!(status.is_good());
        assert!(!flight.is_locked());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_runs_never_overlap() {
        let flight = Arc::new(SingleFlight::new("test"));
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let flight = flight.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                flight
                    .run("read_all", || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_good());
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(!flight.is_locked());
    }

    #[tokio::test]
    async fn run_with_returns_value_only_on_success() {
        let flight = SingleFlight::new("test");
        let (status, value) = flight.run_with("read_property", || async { Ok(21.5) }).await;
        assert!(status.is_good());
        assert_eq!(value, Some(21.5));

        let (status, value) = flight
            .run_with::<f64, _, _>("read_property", || async {
                Err(GatewayError::NotFound("missing".into()))
            })
            .await;
        assert_eq!(status.code(), StatusCode::BadNotFound);
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn observer_sees_every_outcome() {
        let flight = SingleFlight::new("test");
        let recorder = Arc::new(Recorder::default());
        flight.set_observer(recorder.clone());

        flight.run("first", || async { Ok(()) }).await;
        flight
            .run("second", || async {
                Err(GatewayError::NoCommunication("login rejected".into()))
            })
            .await;

        let calls = recorder.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("first".to_owned(), StatusCode::Good),
                ("second".to_owned(), StatusCode::BadNoCommunication),
            ]
        );
    }

    #[test]
    fn startup_flag_tracks_status() {
        let flight = SingleFlight::new("test");
        assert!(!flight.is_startup_ok());
        flight.mark_startup(&OperationStatus::good());
        assert!(flight.is_startup_ok());
        flight.mark_startup(&OperationStatus::not_found("serial mismatch"));
        assert!(!flight.is_startup_ok());
    }
}
