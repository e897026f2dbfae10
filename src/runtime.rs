//! Coordination core: constructs the fabric, conflict engine, and
//! allocator from one config, and supervises their periodic tasks.
//!
//! All three subsystems are explicitly constructed and injected; there is
//! no process-wide shared instance. `start` spawns the liveness sweep,
//! the monitoring/scaling cycle, and the deferred auto-resolution loop;
//! `shutdown` stops them and waits for each to exit.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::alloc::ResourceAllocator;
use crate::config::CoordConfig;
use crate::conflict::ConflictEngine;
use crate::error::Result;
use crate::events::EventBus;
use crate::fabric::MessageFabric;

pub struct CoordinationCore {
    config: CoordConfig,
    events: Arc<EventBus>,
    fabric: Arc<MessageFabric>,
    conflicts: Arc<ConflictEngine>,
    allocator: Arc<ResourceAllocator>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoordinationCore {
    pub fn new(config: CoordConfig) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventBus::new(config.fabric.event_capacity));
        let fabric = Arc::new(MessageFabric::new(
            config.fabric.clone(),
            Arc::clone(&events),
        ));
        let conflicts = Arc::new(ConflictEngine::new(
            config.conflict.clone(),
            Arc::clone(&fabric),
            Arc::clone(&events),
        ));
        let allocator = Arc::new(ResourceAllocator::new(
            config.allocator.clone(),
            Arc::clone(&events),
        ));
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            events,
            fabric,
            conflicts,
            allocator,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &CoordConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn fabric(&self) -> &Arc<MessageFabric> {
        &self.fabric
    }

    pub fn conflicts(&self) -> &Arc<ConflictEngine> {
        &self.conflicts
    }

    pub fn allocator(&self) -> &Arc<ResourceAllocator> {
        &self.allocator
    }

    /// Spawn the three periodic tasks. Calling `start` twice stacks a
    /// second set of tasks, so don't.
    pub fn start(&self) {
        let sweep_interval = Duration::from_secs(self.config.fabric.heartbeat_interval_secs);
        let monitor_interval = Duration::from_secs(self.config.allocator.monitor_interval_secs);
        let resolve_interval = Duration::from_millis(self.config.conflict.auto_resolve_interval_ms);

        let mut tasks = self.tasks.lock();

        let fabric = Arc::clone(&self.fabric);
        tasks.push(self.spawn_periodic("liveness-sweep", sweep_interval, move || {
            fabric.sweep();
        }));

        let allocator = Arc::clone(&self.allocator);
        tasks.push(self.spawn_periodic("monitor-cycle", monitor_interval, move || {
            allocator.run_monitor_cycle();
        }));

        let conflicts = Arc::clone(&self.conflicts);
        tasks.push(self.spawn_periodic("auto-resolution", resolve_interval, move || {
            conflicts.run_auto_resolution_cycle();
            conflicts.prune();
        }));

        info!(
            sweep_secs = sweep_interval.as_secs(),
            monitor_secs = monitor_interval.as_secs(),
            resolve_ms = resolve_interval.as_millis() as u64,
            "Coordination core started"
        );
    }

    /// Signal all periodic tasks to stop and wait for them to exit.
    pub async fn shutdown(&self) {
        if self.shutdown.send(true).is_err() {
            debug!("No running tasks to stop");
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task exited abnormally");
            }
        }
        info!("Coordination core stopped");
    }

    fn spawn_periodic(
        &self,
        name: &'static str,
        period: Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> JoinHandle<()> {
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it so the task
            // waits a full period before its first cycle.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => tick(),
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!(task = name, "Periodic task stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::{ResourcePool, ResourceRequirement, ResourceType};
    use crate::conflict::{ConflictContext, ConflictKind, ConflictSeverity, ConflictStatus};

    fn fast_config() -> CoordConfig {
        let mut config = CoordConfig::default();
        config.fabric.heartbeat_interval_secs = 1;
        config.allocator.monitor_interval_secs = 1;
        config.conflict.auto_resolve_interval_ms = 20;
        config.conflict.auto_resolve_delay_ms = 0;
        config
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = CoordConfig::default();
        config.fabric.heartbeat_interval_secs = 0;
        assert!(CoordinationCore::new(config).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let core = CoordinationCore::new(fast_config()).unwrap();
        core.start();
        assert_eq!(core.tasks.lock().len(), 3);

        core.shutdown().await;
        assert!(core.tasks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_subsystems_share_one_event_bus() {
        let core = CoordinationCore::new(fast_config()).unwrap();
        let mut rx = core.events().subscribe();

        core.fabric().register_agent("agent-a", vec![]).unwrap();
        core.allocator()
            .register_pool(ResourcePool::new(
                "pool-1",
                ResourceType::Compute,
                100.0,
                "cores",
            ))
            .unwrap();
        core.allocator()
            .allocate(
                "agent-a",
                &[ResourceRequirement::new(ResourceType::Compute, 10.0)],
                5,
            )
            .unwrap();

        // Registration also emits the join-notice broadcast attempt, so
        // assert on membership rather than strict ordering.
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        assert!(kinds.contains(&"agent-registered"));
        assert!(kinds.contains(&"resources-allocated"));
    }

    #[tokio::test]
    async fn test_auto_resolution_task_resolves_conflicts() {
        let core = CoordinationCore::new(fast_config()).unwrap();
        core.fabric().register_agent("x", vec![]).unwrap();
        core.fabric().register_agent("y", vec![]).unwrap();

        let conflict_id = core
            .conflicts()
            .detect_conflict(
                ConflictKind::Resource,
                vec!["x".into(), "y".into()],
                ConflictContext::default().with_resources(vec!["pool-1".into()]),
                "contended pool",
                ConflictSeverity::Medium,
            )
            .unwrap();

        core.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        core.shutdown().await;

        assert_eq!(
            core.conflicts().get(&conflict_id).unwrap().status,
            ConflictStatus::Resolved
        );
    }
}
