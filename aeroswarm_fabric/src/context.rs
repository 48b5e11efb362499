//! Per-agent context store: bounded snapshot rings, tools and resources.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use aeroswarm_core::clock::{SimClock, TimePoint};
use aeroswarm_core::error::SimError;
use aeroswarm_core::geom::{Quaternionr, Real, Vector3r};
use aeroswarm_core::sensors::SharedClock;

/// One agent's shared context at a point in time.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub agent_id: String,
    pub position: Vector3r,
    pub velocity: Vector3r,
    pub orientation: Quaternionr,
    pub mission_state: String,
    pub perception: HashMap<String, String>,
    pub planning: HashMap<String, String>,
    pub execution: HashMap<String, String>,
    /// Kernel time point (nanoseconds); zero is invalid.
    pub timestamp: TimePoint,
}

impl ContextSnapshot {
    pub fn new(agent_id: impl Into<String>, timestamp: TimePoint) -> Self {
        Self {
            agent_id: agent_id.into(),
            position: Vector3r::zeros(),
            velocity: Vector3r::zeros(),
            orientation: Quaternionr::identity(),
            mission_state: "idle".to_string(),
            perception: HashMap::new(),
            planning: HashMap::new(),
            execution: HashMap::new(),
            timestamp,
        }
    }
}

/// A capability an agent offers to the swarm.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub parameters: Vec<String>,
    /// Agent that provides this tool.
    pub agent_id: String,
}

/// A shared consumable or device.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    /// "sensor", "actuator", "computation" or "energy".
    pub resource_type: String,
    pub owner_id: String,
    pub available: bool,
    pub capacity: Real,
    pub current_usage: Real,
}

#[derive(Debug, Clone)]
pub struct ContextStoreConfig {
    /// Snapshots retained per agent.
    pub buffer_size: usize,
    /// Snapshots older than this are purged on publish, seconds.
    pub context_timeout_sec: f64,
    pub max_agents: usize,
}

impl Default for ContextStoreConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            context_timeout_sec: 5.0,
            max_agents: 100,
        }
    }
}

/// Context-sharing store: agent id -> bounded ring of snapshots.
///
/// Publishing evicts anything older than the timeout and drops the oldest
/// entry past the buffer size. Queries for unknown agents return empty, not
/// an error.
pub struct ContextStore {
    config: ContextStoreConfig,
    clock: SharedClock,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    history: HashMap<String, VecDeque<ContextSnapshot>>,
    tools: HashMap<(String, String), Tool>,
    resources: HashMap<String, Resource>,
}

impl ContextStore {
    pub fn new(config: ContextStoreConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn config(&self) -> &ContextStoreConfig {
        &self.config
    }

    /// Publishes one snapshot. Fails on an empty agent id or zero timestamp.
    pub fn publish(&self, snapshot: ContextSnapshot) -> Result<(), SimError> {
        if snapshot.agent_id.is_empty() {
            return Err(SimError::invalid("context without agent id"));
        }
        if snapshot.timestamp == 0 {
            return Err(SimError::invalid("context without timestamp"));
        }
        let mut inner = self.inner.lock().unwrap();
        if !inner.history.contains_key(&snapshot.agent_id)
            && inner.history.len() >= self.config.max_agents
        {
            return Err(SimError::invalid("agent limit reached"));
        }
        let buffer_size = self.config.buffer_size;
        let ring = inner.history.entry(snapshot.agent_id.clone()).or_default();
        ring.push_back(snapshot);
        while ring.len() > buffer_size {
            ring.pop_front();
        }
        self.evict_expired(&mut inner);
        Ok(())
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let now = self.clock.now();
        let timeout_ns = (self.config.context_timeout_sec * 1e9) as u64;
        for ring in inner.history.values_mut() {
            while let Some(front) = ring.front() {
                if now.saturating_sub(front.timestamp) > timeout_ns {
                    ring.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// All snapshots for an agent; with an empty id, the latest snapshot per
    /// agent.
    pub fn query(&self, agent_id: &str) -> Vec<ContextSnapshot> {
        let inner = self.inner.lock().unwrap();
        if agent_id.is_empty() {
            let mut latest: Vec<ContextSnapshot> = inner
                .history
                .values()
                .filter_map(|ring| ring.back().cloned())
                .collect();
            latest.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
            latest
        } else {
            inner
                .history
                .get(agent_id)
                .map(|ring| ring.iter().cloned().collect())
                .unwrap_or_default()
        }
    }

    pub fn latest(&self, agent_id: &str) -> Option<ContextSnapshot> {
        self.inner
            .lock()
            .unwrap()
            .history
            .get(agent_id)
            .and_then(|ring| ring.back().cloned())
    }

    /// The most recent `count` snapshots for an agent, oldest first.
    pub fn history(&self, agent_id: &str, count: usize) -> Vec<ContextSnapshot> {
        let inner = self.inner.lock().unwrap();
        let Some(ring) = inner.history.get(agent_id) else {
            return Vec::new();
        };
        let skip = ring.len().saturating_sub(count);
        ring.iter().skip(skip).cloned().collect()
    }

    // ---- tools ----

    pub fn register_tool(&self, tool: Tool) -> Result<(), SimError> {
        if tool.name.is_empty() || tool.agent_id.is_empty() {
            return Err(SimError::invalid("tool needs a name and an agent id"));
        }
        self.inner
            .lock()
            .unwrap()
            .tools
            .insert((tool.agent_id.clone(), tool.name.clone()), tool);
        Ok(())
    }

    pub fn unregister_tool(&self, agent_id: &str, tool_name: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .tools
            .remove(&(agent_id.to_string(), tool_name.to_string()))
            .is_some()
    }

    /// Tools whose description contains the capability substring; all tools
    /// when the filter is empty.
    pub fn discover_tools(&self, capability: &str) -> Vec<Tool> {
        let inner = self.inner.lock().unwrap();
        let mut tools: Vec<Tool> = inner
            .tools
            .values()
            .filter(|tool| capability.is_empty() || tool.description.contains(capability))
            .cloned()
            .collect();
        tools.sort_by(|a, b| (&a.agent_id, &a.name).cmp(&(&b.agent_id, &b.name)));
        tools
    }

    // ---- resources ----

    pub fn register_resource(&self, resource: Resource) -> Result<(), SimError> {
        if resource.id.is_empty() {
            return Err(SimError::invalid("resource needs an id"));
        }
        self.inner
            .lock()
            .unwrap()
            .resources
            .insert(resource.id.clone(), resource);
        Ok(())
    }

    pub fn unregister_resource(&self, resource_id: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .resources
            .remove(resource_id)
            .is_some()
    }

    /// Resources of the given type; all resources when the filter is empty.
    pub fn query_resources(&self, resource_type: &str) -> Vec<Resource> {
        let inner = self.inner.lock().unwrap();
        let mut resources: Vec<Resource> = inner
            .resources
            .values()
            .filter(|r| resource_type.is_empty() || r.resource_type == resource_type)
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));
        resources
    }

    /// Claims `amount` of a resource's capacity.
    pub fn request_resource(&self, resource_id: &str, amount: Real) -> Result<(), SimError> {
        let mut inner = self.inner.lock().unwrap();
        let resource = inner
            .resources
            .get_mut(resource_id)
            .ok_or_else(|| SimError::invalid(format!("unknown resource '{resource_id}'")))?;
        if !resource.available || resource.current_usage + amount > resource.capacity {
            return Err(SimError::invalid(format!(
                "resource '{resource_id}' exhausted"
            )));
        }
        resource.current_usage += amount;
        Ok(())
    }

    pub fn release_resource(&self, resource_id: &str, amount: Real) {
        if let Some(resource) = self.inner.lock().unwrap().resources.get_mut(resource_id) {
            resource.current_usage = (resource.current_usage - amount).max(0.0);
        }
    }

    pub fn agent_count(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.history.clear();
        inner.tools.clear();
        inner.resources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroswarm_core::clock::SteppableClock;
    use std::sync::Arc;

    fn store() -> (Arc<SteppableClock>, ContextStore) {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let shared: SharedClock = clock.clone();
        (clock, ContextStore::new(ContextStoreConfig::default(), shared))
    }

    #[test]
    fn test_publish_rejects_empty_agent_and_zero_timestamp() {
        let (_clock, store) = store();
        assert!(store.publish(ContextSnapshot::new("", 5)).is_err());
        assert!(store.publish(ContextSnapshot::new("a", 0)).is_err());
        assert!(store.publish(ContextSnapshot::new("a", 5)).is_ok());
    }

    #[test]
    fn test_query_unknown_agent_is_empty_not_error() {
        let (_clock, store) = store();
        assert!(store.query("ghost").is_empty());
        assert!(store.latest("ghost").is_none());
        assert!(store.history("ghost", 10).is_empty());
    }

    #[test]
    fn test_empty_query_returns_latest_per_agent() {
        let (_clock, store) = store();
        store.publish(ContextSnapshot::new("a", 1)).unwrap();
        store.publish(ContextSnapshot::new("a", 2)).unwrap();
        store.publish(ContextSnapshot::new("b", 3)).unwrap();
        let latest = store.query("");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].agent_id, "a");
        assert_eq!(latest[0].timestamp, 2);
    }

    #[test]
    fn test_buffer_size_drops_oldest() {
        let clock = Arc::new(SteppableClock::new(1_000_000, 1.0));
        let shared: SharedClock = clock.clone();
        let store = ContextStore::new(
            ContextStoreConfig {
                buffer_size: 3,
                ..Default::default()
            },
            shared,
        );
        for ts in 1..=5 {
            store.publish(ContextSnapshot::new("a", ts)).unwrap();
        }
        let history = store.query("a");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, 3);
    }

    #[test]
    fn test_ttl_eviction_on_publish() {
        let clock = Arc::new(SteppableClock::new(1_000_000_000, 1.0)); // 1 s steps
        let shared: SharedClock = clock.clone();
        let store = ContextStore::new(
            ContextStoreConfig {
                context_timeout_sec: 2.0,
                ..Default::default()
            },
            shared,
        );
        store.publish(ContextSnapshot::new("a", 1)).unwrap();
        for _ in 0..5 {
            clock.step();
        }
        // Publishing now purges the stale snapshot.
        store
            .publish(ContextSnapshot::new("a", clock.now()))
            .unwrap();
        let history = store.query("a");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, clock.now());
    }

    #[test]
    fn test_history_returns_most_recent_oldest_first() {
        let (_clock, store) = store();
        for ts in 1..=10 {
            store.publish(ContextSnapshot::new("a", ts)).unwrap();
        }
        let history = store.history("a", 3);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].timestamp, 8);
        assert_eq!(history[2].timestamp, 10);
    }

    #[test]
    fn test_tool_discovery_by_capability_substring() {
        let (_clock, store) = store();
        store
            .register_tool(Tool {
                name: "thermal_scan".into(),
                description: "thermal imaging sweep".into(),
                parameters: vec!["area".into()],
                agent_id: "a".into(),
            })
            .unwrap();
        store
            .register_tool(Tool {
                name: "relay".into(),
                description: "radio relay".into(),
                parameters: vec![],
                agent_id: "b".into(),
            })
            .unwrap();
        assert_eq!(store.discover_tools("thermal").len(), 1);
        assert_eq!(store.discover_tools("").len(), 2);
        assert!(store.unregister_tool("a", "thermal_scan"));
        assert!(store.discover_tools("thermal").is_empty());
    }

    #[test]
    fn test_resource_claims_respect_capacity() {
        let (_clock, store) = store();
        store
            .register_resource(Resource {
                id: "battery_bank".into(),
                resource_type: "energy".into(),
                owner_id: "base".into(),
                available: true,
                capacity: 1.0,
                current_usage: 0.0,
            })
            .unwrap();
        assert!(store.request_resource("battery_bank", 0.7).is_ok());
        assert!(store.request_resource("battery_bank", 0.7).is_err());
        store.release_resource("battery_bank", 0.7);
        assert!(store.request_resource("battery_bank", 0.7).is_ok());
        assert_eq!(store.query_resources("energy").len(), 1);
    }
}
