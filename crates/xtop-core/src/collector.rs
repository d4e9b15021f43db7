//! Collector registry — the input boundary
//! between the core and the concrete kernel/procfs/sysfs/eBPF readers, which
//! are out of scope for this crate. A `Vec<Box<dyn Collector>>` invoked
//! uniformly, with soft failures aggregated rather than aborting the tick.

use crate::errors::CollectError;
use crate::model::Snapshot;

/// Implemented by every concrete kernel reader. `name()` must be stable —
/// it is how `trigger_by_name` finds an out-of-band collector (e.g. a
/// `bigfiles` or `deleted_open` scanner) among the registered set.
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;
    fn collect(&self, snap: &mut Snapshot) -> Result<(), CollectError>;
}

/// Owns the registered collectors and runs them uniformly each tick.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn Collector>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collector: Box<dyn Collector>) {
        self.collectors.push(collector);
    }

    /// Runs every registered collector against `snap`, aggregating soft
    /// failures instead of aborting.
    pub fn collect_all(&self, snap: &mut Snapshot) -> Vec<CollectError> {
        let mut errors = Vec::new();
        for collector in &self.collectors {
            if let Err(e) = collector.collect(snap) {
                errors.push(e);
            }
        }
        errors
    }

    /// Out-of-band trigger for scanners that aren't run on every tick (spec
    /// out-of-band trigger for scanners that only run when a mount is
    /// WARN/CRIT). No-op if no collector with that name is registered.
    pub fn trigger_by_name(&self, name: &str) -> Result<(), CollectError> {
        match self.collectors.iter().find(|c| c.name() == name) {
            Some(collector) => {
                let mut throwaway = Snapshot::default();
                collector.collect(&mut throwaway)
            }
            None => Ok(()),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }
}

/// Closure-backed collector for tests — real procfs/eBPF readers are out
/// of scope, so this is the test tooling needed to exercise the orchestrator's
/// tick loop without one.
pub struct MockCollector<F: Fn(&mut Snapshot) -> Result<(), CollectError> + Send + Sync> {
    name: String,
    func: F,
}

impl<F: Fn(&mut Snapshot) -> Result<(), CollectError> + Send + Sync> MockCollector<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self { name: name.into(), func }
    }
}

impl<F: Fn(&mut Snapshot) -> Result<(), CollectError> + Send + Sync> Collector for MockCollector<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, snap: &mut Snapshot) -> Result<(), CollectError> {
        (self.func)(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_all_runs_every_collector_and_aggregates_errors() {
        let mut registry = CollectorRegistry::new();
        registry.register(Box::new(MockCollector::new("ok", |snap| {
            snap.timestamp = 42;
            Ok(())
        })));
        registry.register(Box::new(MockCollector::new("broken", |_| {
            Err(CollectError::Unavailable("psi"))
        })));

        let mut snap = Snapshot::default();
        let errors = registry.collect_all(&mut snap);
        assert_eq!(snap.timestamp, 42);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn trigger_by_name_is_a_no_op_for_unknown_collector() {
        let registry = CollectorRegistry::new();
        assert!(registry.trigger_by_name("bigfiles").is_ok());
    }

    #[test]
    fn trigger_by_name_invokes_the_matching_collector() {
        let mut registry = CollectorRegistry::new();
        let called = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = called.clone();
        registry.register(Box::new(MockCollector::new("bigfiles", move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        })));
        registry.trigger_by_name("bigfiles").unwrap();
        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
