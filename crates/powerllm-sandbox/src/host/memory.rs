//! In-memory host.
//!
//! Keeps states in a [`DashMap`], records every fired event and service
//! call, and dispatches services to registered closures. Useful wherever a
//! real home-automation core is not available.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    EventBus, Host, HostError, HostResult, JsonMap, MAX_STATE_LENGTH, ServiceRegistry, State,
    StateStore, valid_entity_id,
};

/// A service implementation.
pub type ServiceHandler =
    Arc<dyn Fn(&JsonMap) -> HostResult<Option<serde_json::Value>> + Send + Sync>;

/// An event recorded by [`InMemoryHost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiredEvent {
    pub event_type: String,
    pub event_data: JsonMap,
}

/// A service call recorded by [`InMemoryHost`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub service_data: JsonMap,
}

/// Initial state entry as accepted by [`InMemoryHost::load_states`].
#[derive(Debug, Deserialize)]
struct StateSeed {
    state: String,
    #[serde(default)]
    attributes: JsonMap,
}

#[derive(Default)]
pub struct InMemoryHost {
    states: DashMap<String, State>,
    services: DashMap<(String, String), ServiceHandler>,
    events: Mutex<Vec<FiredEvent>>,
    calls: Mutex<Vec<ServiceCall>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style state seeding.
    pub fn with_state(self, entity_id: &str, state: &str, attributes: JsonMap) -> Self {
        self.states
            .insert(entity_id.to_string(), State::new(entity_id, state, attributes));
        self
    }

    /// Register a service handler, replacing any previous one.
    pub fn register_service<F>(&self, domain: &str, service: &str, handler: F)
    where
        F: Fn(&JsonMap) -> HostResult<Option<serde_json::Value>> + Send + Sync + 'static,
    {
        self.services.insert(
            (domain.to_lowercase(), service.to_lowercase()),
            Arc::new(handler),
        );
    }

    /// Seed states from a JSON object of the form
    /// `{"light.kitchen": {"state": "on", "attributes": {...}}}`.
    pub fn load_states(&self, json: &serde_json::Value) -> HostResult<usize> {
        let seeds: BTreeMap<String, StateSeed> = serde_json::from_value(json.clone())
            .map_err(|e| HostError::ServiceFailed(format!("invalid state file: {e}")))?;
        let count = seeds.len();
        for (entity_id, seed) in seeds {
            self.set(&entity_id, &seed.state, Some(seed.attributes), false)?;
        }
        Ok(count)
    }

    /// Events fired so far, oldest first.
    pub fn fired_events(&self) -> Vec<FiredEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Service calls made so far, oldest first.
    pub fn service_calls(&self) -> Vec<ServiceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn matches(domains: &[String], state: &State) -> bool {
        domains.is_empty() || domains.iter().any(|d| d == state.domain())
    }
}

impl Host for InMemoryHost {
    fn bus(&self) -> &dyn EventBus {
        self
    }

    fn states(&self) -> &dyn StateStore {
        self
    }

    fn services(&self) -> &dyn ServiceRegistry {
        self
    }
}

impl EventBus for InMemoryHost {
    fn fire(&self, event_type: &str, event_data: JsonMap) -> HostResult<()> {
        if event_type.is_empty() || event_type.len() > MAX_STATE_LENGTH {
            return Err(HostError::InvalidEventType(event_type.to_string()));
        }
        debug!(event_type, "event fired");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(FiredEvent {
                event_type: event_type.to_string(),
                event_data,
            });
        Ok(())
    }
}

impl StateStore for InMemoryHost {
    fn entity_ids(&self, domains: &[String]) -> Vec<String> {
        let mut ids: Vec<String> = self
            .states
            .iter()
            .filter(|entry| Self::matches(domains, entry.value()))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    fn all(&self, domains: &[String]) -> Vec<State> {
        let mut states: Vec<State> = self
            .states
            .iter()
            .filter(|entry| Self::matches(domains, entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    fn get(&self, entity_id: &str) -> Option<State> {
        self.states
            .get(&entity_id.to_lowercase())
            .map(|entry| entry.value().clone())
    }

    fn remove(&self, entity_id: &str) -> bool {
        self.states.remove(&entity_id.to_lowercase()).is_some()
    }

    fn set(
        &self,
        entity_id: &str,
        new_state: &str,
        attributes: Option<JsonMap>,
        force_update: bool,
    ) -> HostResult<()> {
        let entity_id = entity_id.to_lowercase();
        if !valid_entity_id(&entity_id) {
            return Err(HostError::InvalidEntityId(entity_id));
        }
        let length = new_state.chars().count();
        if length > MAX_STATE_LENGTH {
            return Err(HostError::InvalidState { length });
        }
        let now = Utc::now();
        match self.states.get_mut(&entity_id) {
            Some(mut existing) => {
                let attributes = attributes.unwrap_or_else(|| existing.attributes.clone());
                let same_state = existing.state == new_state;
                if same_state && existing.attributes == attributes && !force_update {
                    return Ok(());
                }
                if !same_state {
                    existing.last_changed = now;
                }
                existing.state = new_state.to_string();
                existing.attributes = attributes;
                existing.last_updated = now;
            }
            None => {
                let state = State::new(&entity_id, new_state, attributes.unwrap_or_default());
                self.states.insert(entity_id.clone(), state);
            }
        }
        debug!(entity_id = %entity_id, state = new_state, "state written");
        Ok(())
    }
}

impl ServiceRegistry for InMemoryHost {
    fn services(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in self.services.iter() {
            let (domain, service) = entry.key();
            grouped
                .entry(domain.clone())
                .or_default()
                .push(service.clone());
        }
        for services in grouped.values_mut() {
            services.sort();
        }
        grouped
    }

    fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services
            .contains_key(&(domain.to_lowercase(), service.to_lowercase()))
    }

    fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: JsonMap,
        blocking: bool,
    ) -> HostResult<Option<serde_json::Value>> {
        let key = (domain.to_lowercase(), service.to_lowercase());
        let handler = self
            .services
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HostError::ServiceNotFound {
                domain: key.0.clone(),
                service: key.1.clone(),
            })?;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ServiceCall {
                domain: key.0.clone(),
                service: key.1.clone(),
                service_data: service_data.clone(),
            });
        debug!(domain = %key.0, service = %key.1, blocking, "service called");
        let response = handler(&service_data)?;
        Ok(if blocking { response } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> JsonMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn states_roundtrip() {
        let host = InMemoryHost::new().with_state("light.kitchen", "on", JsonMap::new());
        assert!(host.is_state("light.kitchen", "on"));
        host.set("light.kitchen", "off", Some(attrs(json!({"brightness": 0}))), false)
            .unwrap();
        assert!(host.is_state_attr("light.kitchen", "brightness", &json!(0)));
        assert_eq!(host.entity_ids(&[]), vec!["light.kitchen"]);
        assert!(host.remove("light.kitchen"));
        assert!(host.get("light.kitchen").is_none());
    }

    #[test]
    fn invalid_writes_are_rejected() {
        let host = InMemoryHost::new();
        assert!(matches!(
            host.set("kitchen", "on", None, false),
            Err(HostError::InvalidEntityId(_))
        ));
        let long = "x".repeat(300);
        assert!(matches!(
            host.set("light.kitchen", &long, None, false),
            Err(HostError::InvalidState { length: 300 })
        ));
    }

    #[test]
    fn domain_filter() {
        let host = InMemoryHost::new()
            .with_state("light.a", "on", JsonMap::new())
            .with_state("switch.b", "off", JsonMap::new());
        assert_eq!(host.entity_ids(&["switch".to_string()]), vec!["switch.b"]);
        assert_eq!(host.all(&[]).len(), 2);
    }

    #[test]
    fn services_dispatch_and_record() {
        let host = InMemoryHost::new();
        host.register_service("light", "turn_on", |_| Ok(Some(json!({"ok": true}))));
        assert!(host.has_service("light", "turn_on"));
        let response = host
            .call("light", "turn_on", attrs(json!({"entity_id": "light.a"})), true)
            .unwrap();
        assert_eq!(response, Some(json!({"ok": true})));
        assert_eq!(host.service_calls().len(), 1);
        assert!(matches!(
            host.call("light", "explode", JsonMap::new(), false),
            Err(HostError::ServiceNotFound { .. })
        ));
        assert_eq!(ServiceRegistry::services(&host)["light"], vec!["turn_on"]);
    }

    #[test]
    fn events_are_recorded() {
        let host = InMemoryHost::new();
        host.fire("custom_event", attrs(json!({"a": 1}))).unwrap();
        assert!(host.fire("", JsonMap::new()).is_err());
        let events = host.fired_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "custom_event");
    }

    #[test]
    fn load_states_from_json() {
        let host = InMemoryHost::new();
        let count = host
            .load_states(&json!({
                "sensor.temp": {"state": "21.5", "attributes": {"unit_of_measurement": "°C"}},
                "light.desk": {"state": "off"}
            }))
            .unwrap();
        assert_eq!(count, 2);
        assert!(host.is_state("sensor.temp", "21.5"));
    }
}
