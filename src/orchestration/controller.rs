//! Lifecycle control for managed services.
//!
//! State is never cached: every operation asks the runtime. Transitions for
//! the same workload are serialized by a per-workload async mutex, so
//! concurrent enables issue a single start command. Status reads do not take
//! the lock and may observe a transition in flight.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use tokio::sync::{Mutex, MutexGuard};

use super::runtime::{RuntimeError, ServiceState, WorkloadController, WorkloadStatus};
use crate::config::ManagedService;
use crate::http::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("No managed service is registered under {0:?}")]
    UnknownService(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::UnknownService(_) => ApiError::NotFound(err.to_string()),
            ControlError::Runtime(e) => e.into(),
        }
    }
}

struct ManagedEntry {
    service: ManagedService,
    lock: Arc<Mutex<()>>,
}

/// Result of an enable or disable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub service: String,
    /// False when the workload was already in the requested state.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service: String,
    pub status: WorkloadStatus,
}

pub struct ServiceController {
    runtime: Arc<dyn WorkloadController>,
    entries: Vec<ManagedEntry>,
    timeout: Duration,
}

impl ServiceController {
    pub fn new(
        runtime: Arc<dyn WorkloadController>,
        services: Vec<ManagedService>,
        timeout: Duration,
    ) -> Self {
        // Routes pointing at the same workload share one lock.
        let mut locks: HashMap<String, Arc<Mutex<()>>> = HashMap::new();
        let entries = services
            .into_iter()
            .map(|service| {
                let lock = locks.entry(service.container.clone()).or_default().clone();
                ManagedEntry { service, lock }
            })
            .collect();
        Self {
            runtime,
            entries,
            timeout,
        }
    }

    fn resolve(&self, route: &str) -> Result<&ManagedEntry, ControlError> {
        self.entries
            .iter()
            .find(|e| e.service.route == route)
            .ok_or_else(|| ControlError::UnknownService(route.to_string()))
    }

    fn default_entry(&self) -> Result<&ManagedEntry, ControlError> {
        self.entries
            .first()
            .ok_or_else(|| ControlError::UnknownService("default".to_string()))
    }

    async fn call<T>(
        &self,
        fut: impl Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or(Err(RuntimeError::Timeout(self.timeout)))
    }

    /// Waiting for the lock is bounded by the same timeout as a runtime call.
    async fn acquire<'a>(
        &self,
        entry: &'a ManagedEntry,
    ) -> Result<MutexGuard<'a, ()>, RuntimeError> {
        tokio::time::timeout(self.timeout, entry.lock.lock())
            .await
            .map_err(|_| RuntimeError::Timeout(self.timeout))
            .inspect_err(|e| log::warn!("Gave up waiting on {}: {e}", entry.service.name))
    }

    pub async fn enable(&self, route: &str) -> Result<Transition, ControlError> {
        let entry = self.resolve(route)?;
        let container = entry.service.container.as_str();
        let _guard = self.acquire(entry).await?;

        let current = self.call(self.runtime.inspect(container)).await?;
        if current.state == ServiceState::Running {
            log::info!("{} is already running, nothing to enable", entry.service.name);
            return Ok(Transition {
                service: entry.service.name.clone(),
                changed: false,
            });
        }

        log::info!("Enabling {} ({container})...", entry.service.name);
        self.call(self.runtime.start(container)).await?;
        log::info!("{} enabled successfully", entry.service.name);
        Ok(Transition {
            service: entry.service.name.clone(),
            changed: true,
        })
    }

    pub async fn disable(&self, route: &str) -> Result<Transition, ControlError> {
        let entry = self.resolve(route)?;
        let container = entry.service.container.as_str();
        let _guard = self.acquire(entry).await?;

        let current = self.call(self.runtime.inspect(container)).await?;
        if current.state == ServiceState::Stopped {
            log::info!("{} is already stopped, nothing to disable", entry.service.name);
            return Ok(Transition {
                service: entry.service.name.clone(),
                changed: false,
            });
        }

        log::info!("Disabling {} ({container})...", entry.service.name);
        self.call(self.runtime.stop(container)).await?;
        log::info!("{} disabled successfully", entry.service.name);
        Ok(Transition {
            service: entry.service.name.clone(),
            changed: true,
        })
    }

    /// Status of the service behind `route`, or of the first configured
    /// service when `route` is `None`.
    pub async fn status(&self, route: Option<&str>) -> Result<ServiceStatus, ControlError> {
        let entry = match route {
            Some(route) => self.resolve(route)?,
            None => self.default_entry()?,
        };
        let status = self
            .call(self.runtime.inspect(&entry.service.container))
            .await
            .inspect_err(|e| log::error!("Error getting status of {}: {e}", entry.service.name))?;
        Ok(ServiceStatus {
            service: entry.service.name.clone(),
            status,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeRuntime, query_service};
    use super::*;
    use std::sync::atomic::Ordering;

    fn controller(runtime: Arc<FakeRuntime>) -> ServiceController {
        ServiceController::new(runtime, vec![query_service()], Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_enable_twice_starts_once() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::stopped(),
        ));
        let controller = controller(runtime.clone());

        let first = controller.enable("query").await.unwrap();
        let second = controller.enable("query").await.unwrap();
        assert!(first.changed);
        assert!(!second.changed);
        assert_eq!(second.service, "query-service");
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);

        let status = controller.status(None).await.unwrap();
        assert_eq!(status.status.state, ServiceState::Running);
        assert!(status.status.started_at.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enables_issue_one_start() {
        let runtime = Arc::new(FakeRuntime::with_latency(
            "ms-consulta",
            WorkloadStatus::stopped(),
            Duration::from_millis(30),
        ));
        let controller = Arc::new(controller(runtime.clone()));

        let enables = (0..16).map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move { controller.enable("query").await })
        });
        let results = futures_util::future::join_all(enables).await;

        let changed = results
            .into_iter()
            .map(|r| r.expect("task panicked").expect("enable failed"))
            .filter(|t| t.changed)
            .count();
        assert_eq!(changed, 1);
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.status(Some("query")).await.unwrap().status.state,
            ServiceState::Running
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_enable_and_disable_do_not_overlap() {
        let runtime = Arc::new(FakeRuntime::with_latency(
            "ms-consulta",
            WorkloadStatus::stopped(),
            Duration::from_millis(20),
        ));
        let controller = Arc::new(controller(runtime.clone()));

        let enable = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.enable("query").await })
        };
        let disable = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.disable("query").await })
        };
        enable.await.unwrap().unwrap();
        disable.await.unwrap().unwrap();

        // Whichever ran first, the second observed its completed result.
        let starts = runtime.starts.load(Ordering::SeqCst);
        let stops = runtime.stops.load(Ordering::SeqCst);
        let state = controller.status(None).await.unwrap().status.state;
        match state {
            ServiceState::Stopped => assert_eq!((starts, stops), (1, 1)),
            ServiceState::Running => assert_eq!((starts, stops), (1, 0)),
            ServiceState::Unknown => panic!("unexpected unknown state"),
        }
    }

    #[tokio::test]
    async fn test_disable_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::running(None),
        ));
        let controller = controller(runtime.clone());

        assert!(controller.disable("query").await.unwrap().changed);
        assert!(!controller.disable("query").await.unwrap().changed);
        assert_eq!(runtime.stops.load(Ordering::SeqCst), 1);
        assert_eq!(
            controller.status(None).await.unwrap().status,
            WorkloadStatus::stopped()
        );
    }

    #[tokio::test]
    async fn test_unknown_state_is_started() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::unknown(),
        ));
        let controller = controller(runtime.clone());
        assert!(controller.enable("query").await.unwrap().changed);
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found_conditions() {
        let runtime = Arc::new(FakeRuntime::default());
        let controller = controller(runtime.clone());

        // Configured, but the workload does not exist in the runtime.
        assert!(matches!(
            controller.enable("query").await,
            Err(ControlError::Runtime(RuntimeError::NotFound(_)))
        ));
        assert!(matches!(
            controller.status(None).await,
            Err(ControlError::Runtime(RuntimeError::NotFound(_)))
        ));

        // Not configured at all.
        assert!(matches!(
            controller.status(Some("unknown-service")).await,
            Err(ControlError::UnknownService(_))
        ));
        assert!(matches!(
            controller.disable("unknown-service").await,
            Err(ControlError::UnknownService(_))
        ));
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_and_hung_runtime() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::stopped(),
        ));
        let controller = controller(runtime.clone());

        runtime.unreachable.store(true, Ordering::SeqCst);
        assert!(matches!(
            controller.enable("query").await,
            Err(ControlError::Runtime(RuntimeError::Unavailable(_)))
        ));

        runtime.unreachable.store(false, Ordering::SeqCst);
        runtime.hang.store(true, Ordering::SeqCst);
        assert!(matches!(
            controller.status(None).await,
            Err(ControlError::Runtime(RuntimeError::Timeout(_)))
        ));

        assert!(matches!(
            controller.enable("query").await,
            Err(ControlError::Runtime(RuntimeError::Timeout(_)))
        ));

        // The timed out enable released the lock for the next caller.
        runtime.hang.store(false, Ordering::SeqCst);
        assert!(controller.enable("query").await.unwrap().changed);
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_callers_time_out_on_a_hung_runtime() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::stopped(),
        ));
        runtime.hang.store(true, Ordering::SeqCst);
        let timeout = Duration::from_millis(200);
        let controller = Arc::new(ServiceController::new(
            runtime.clone(),
            vec![query_service()],
            timeout,
        ));

        let enables = (0..6).map(|_| {
            let controller = controller.clone();
            tokio::spawn(async move {
                let started = std::time::Instant::now();
                let result = controller.enable("query").await;
                (result, started.elapsed())
            })
        });
        let results = futures_util::future::join_all(enables).await;

        for result in results {
            let (result, waited) = result.expect("task panicked");
            assert!(matches!(
                result,
                Err(ControlError::Runtime(RuntimeError::Timeout(_)))
            ));
            // At most one lock wait plus one hung inspect.
            assert!(waited < timeout * 3, "waited {waited:?}");
        }
        assert_eq!(runtime.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_routes_sharing_a_workload_share_a_lock() {
        let runtime = Arc::new(FakeRuntime::with_workload(
            "ms-consulta",
            WorkloadStatus::stopped(),
        ));
        let alias = ManagedService {
            route: "consulta".to_string(),
            ..query_service()
        };
        let controller =
            ServiceController::new(runtime, vec![query_service(), alias], Duration::from_secs(1));
        assert!(Arc::ptr_eq(
            &controller.entries[0].lock,
            &controller.entries[1].lock
        ));
    }
}
