use crate::metrics::average::DecayedAverage;
use crate::metrics::counters::{CallRate, StatusCounter};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Handle to one registered metric of any kind.
#[derive(Clone)]
pub enum Metric {
    Average(Arc<DecayedAverage>),
    CallRate(Arc<CallRate>),
    Status(Arc<StatusCounter>),
}

impl Metric {
    fn dump(&self) -> Map<String, Value> {
        match self {
            Metric::Average(m) => m.dump(),
            Metric::CallRate(m) => m.dump(),
            Metric::Status(m) => m.dump(),
        }
    }

    /// Whether both handles point at the same metric instance.
    fn is_same_instance(&self, other: &Metric) -> bool {
        match (self, other) {
            (Metric::Average(a), Metric::Average(b)) => Arc::ptr_eq(a, b),
            (Metric::CallRate(a), Metric::CallRate(b)) => Arc::ptr_eq(a, b),
            (Metric::Status(a), Metric::Status(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Process-wide registry of named metrics.
///
/// Names are dot-separated hierarchical paths (`connector.orders.async`);
/// `dump()` merges every metric's flat dump into the nested namespace.
/// Create-by-name overwrites; deletion only removes the entry if the handle
/// still matches the registered instance, which guards against stale deletes
/// after a reload swapped the metric under the same name.
#[derive(Default)]
pub struct MetricRegistry {
    metrics: DashMap<String, Metric>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a metric handle under `name`, replacing any previous entry.
    pub fn insert(&self, name: &str, metric: Metric) {
        self.metrics.insert(name.to_string(), metric);
    }

    pub fn create_average(
        &self,
        name: &str,
        rate_per_minute: f64,
        sample_size: usize,
    ) -> Arc<DecayedAverage> {
        let metric = Arc::new(DecayedAverage::new(rate_per_minute, sample_size));
        self.insert(name, Metric::Average(metric.clone()));
        metric
    }

    pub fn create_call_rate(&self, name: &str) -> Arc<CallRate> {
        let metric = Arc::new(CallRate::new());
        self.insert(name, Metric::CallRate(metric.clone()));
        metric
    }

    pub fn create_status(&self, name: &str) -> Arc<StatusCounter> {
        let metric = Arc::new(StatusCounter::new());
        self.insert(name, Metric::Status(metric.clone()));
        metric
    }

    /// Delete by identity: removes `name` only while it still maps to the
    /// same instance as `handle`.
    pub fn delete(&self, name: &str, handle: &Metric) {
        self.metrics
            .remove_if(name, |_, current| current.is_same_instance(handle));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Full nested dump: each name is split on `.` and the metric's flat
    /// dump is merged at the resulting path.
    pub fn dump(&self) -> Value {
        let mut root = Map::new();
        for entry in self.metrics.iter() {
            let node = nested_node(&mut root, entry.key());
            for (key, value) in entry.value().dump() {
                node.insert(key, value);
            }
        }
        Value::Object(root)
    }
}

fn nested_node<'a>(root: &'a mut Map<String, Value>, name: &str) -> &'a mut Map<String, Value> {
    let mut node = root;
    for part in name.split('.') {
        let slot = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        node = slot.as_object_mut().unwrap();
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_merge() {
        let registry = MetricRegistry::new();
        let c = registry.create_average("a.b.c", 6.0, 10);
        registry.create_average("a.b.d", 6.0, 10);
        c.record(1.0);

        let dump = registry.dump();
        assert_eq!(dump["a"]["b"]["c"]["count"], Value::from(1));
        assert_eq!(dump["a"]["b"]["d"]["count"], Value::from(0));
        assert!(dump["a"]["b"]["c"].get("d").is_none());
    }

    #[test]
    fn test_create_overwrites_existing_name() {
        let registry = MetricRegistry::new();
        let first = registry.create_average("x", 6.0, 10);
        first.record(1.0);
        let second = registry.create_average("x", 6.0, 10);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(registry.dump()["x"]["count"], Value::from(0));
    }

    #[test]
    fn test_delete_by_identity_ignores_stale_handle() {
        let registry = MetricRegistry::new();
        let stale = registry.create_average("x", 6.0, 10);
        let current = registry.create_average("x", 6.0, 10);

        registry.delete("x", &Metric::Average(stale));
        assert!(registry.contains("x"));

        registry.delete("x", &Metric::Average(current));
        assert!(!registry.contains("x"));
    }

    #[test]
    fn test_status_and_call_rate_in_dump() {
        let registry = MetricRegistry::new();
        let status = registry.create_status("connector.orders.status");
        registry.create_call_rate("rps");
        status.observe("200");

        let dump = registry.dump();
        assert_eq!(dump["connector"]["orders"]["status"]["status_200"], Value::from(1));
        assert_eq!(dump["rps"]["count"], Value::from(0));
    }
}
