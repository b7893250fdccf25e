//! Host collaborator surface.
//!
//! The sandbox never talks to a home-automation core directly. It sees the
//! host through the [`Host`] trait and its three registries, which is all a
//! script can reach through `hass`. [`InMemoryHost`] is the bundled
//! implementation used by the CLI and the tests.

pub mod memory;
pub mod objects;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::{FiredEvent, InMemoryHost, ServiceCall, ServiceHandler};

/// JSON object used for state attributes and event/service payloads.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Maximum length of a state string.
pub const MAX_STATE_LENGTH: usize = 255;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by host operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// An entity id does not have the `domain.object_id` form.
    #[error("Invalid entity ID: {0}")]
    InvalidEntityId(String),

    /// A state value is too long.
    #[error(
        "Invalid state with length {length}. State max length is {MAX_STATE_LENGTH} characters."
    )]
    InvalidState { length: usize },

    /// No handler is registered for a service.
    #[error("Service {domain}.{service} not found.")]
    ServiceNotFound { domain: String, service: String },

    /// An event type was empty or otherwise unusable.
    #[error("Invalid event type: {0:?}")]
    InvalidEventType(String),

    /// A service handler reported a failure.
    #[error("{0}")]
    ServiceFailed(String),
}

impl HostError {
    /// Exception kind name seen by scripts and in tool results.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidEntityId(_) => "InvalidEntityFormatError",
            Self::ServiceNotFound { .. } => "ServiceNotFound",
            Self::InvalidState { .. } | Self::InvalidEventType(_) | Self::ServiceFailed(_) => {
                "HomeAssistantError"
            }
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// A snapshot of one entity's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: JsonMap,
    pub last_changed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl State {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>, attributes: JsonMap) -> Self {
        let now = Utc::now();
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
        }
    }

    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or(self.entity_id.as_str(), |(domain, _)| domain)
    }

    pub fn object_id(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map_or("", |(_, object_id)| object_id)
    }

    /// Friendly name, falling back to the object id with spaces.
    pub fn name(&self) -> String {
        match self.attributes.get("friendly_name") {
            Some(serde_json::Value::String(name)) => name.clone(),
            _ => self.object_id().replace('_', " "),
        }
    }

    /// JSON view exposed to scripts and written into tool output.
    pub fn as_json(&self) -> serde_json::Value {
        serde_json::json!({
            "entity_id": self.entity_id,
            "state": self.state,
            "attributes": self.attributes,
            "last_changed": self.last_changed.to_rfc3339(),
            "last_updated": self.last_updated.to_rfc3339(),
        })
    }
}

/// Whether an entity id has the `domain.object_id` form.
///
/// Both parts use lowercase letters, digits and underscores, may not start
/// or end with an underscore, and the domain may not contain `__`.
pub fn valid_entity_id(entity_id: &str) -> bool {
    let Some((domain, object_id)) = entity_id.split_once('.') else {
        return false;
    };
    let part_ok = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            && !part.starts_with('_')
            && !part.ends_with('_')
    };
    part_ok(domain) && part_ok(object_id) && !domain.contains("__")
}

/// Whether a domain name is valid on its own.
pub fn valid_domain(domain: &str) -> bool {
    valid_entity_id(&format!("{domain}.x"))
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Event bus (`hass.bus`).
pub trait EventBus: Send + Sync {
    fn fire(&self, event_type: &str, event_data: JsonMap) -> HostResult<()>;
}

/// State machine (`hass.states`).
pub trait StateStore: Send + Sync {
    /// Entity ids, optionally restricted to the given domains.
    fn entity_ids(&self, domains: &[String]) -> Vec<String>;

    /// Full states, optionally restricted to the given domains.
    fn all(&self, domains: &[String]) -> Vec<State>;

    fn get(&self, entity_id: &str) -> Option<State>;

    fn is_state(&self, entity_id: &str, state: &str) -> bool {
        self.get(entity_id).is_some_and(|s| s.state == state)
    }

    fn is_state_attr(&self, entity_id: &str, name: &str, value: &serde_json::Value) -> bool {
        self.get(entity_id)
            .and_then(|s| s.attributes.get(name).cloned())
            .is_some_and(|v| &v == value)
    }

    /// Remove an entity. Returns whether it existed.
    fn remove(&self, entity_id: &str) -> bool;

    fn set(
        &self,
        entity_id: &str,
        new_state: &str,
        attributes: Option<JsonMap>,
        force_update: bool,
    ) -> HostResult<()>;
}

/// Service registry (`hass.services`).
pub trait ServiceRegistry: Send + Sync {
    /// Registered services grouped by domain.
    fn services(&self) -> BTreeMap<String, Vec<String>>;

    fn has_service(&self, domain: &str, service: &str) -> bool;

    /// Call a service. `blocking` callers receive the handler's response.
    fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: JsonMap,
        blocking: bool,
    ) -> HostResult<Option<serde_json::Value>>;
}

/// The host handle bound to `hass` in every script.
pub trait Host: Send + Sync {
    fn bus(&self) -> &dyn EventBus;
    fn states(&self) -> &dyn StateStore;
    fn services(&self) -> &dyn ServiceRegistry;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_validation() {
        assert!(valid_entity_id("light.kitchen"));
        assert!(valid_entity_id("sensor.temp_2"));
        assert!(!valid_entity_id("light"));
        assert!(!valid_entity_id("Light.kitchen"));
        assert!(!valid_entity_id("light._kitchen"));
        assert!(!valid_entity_id("my__domain.x"));
        assert!(!valid_entity_id("light.kitchen_"));
        assert!(valid_domain("light"));
    }

    #[test]
    fn state_derived_fields() {
        let state = State::new("light.living_room", "on", JsonMap::new());
        assert_eq!(state.domain(), "light");
        assert_eq!(state.object_id(), "living_room");
        assert_eq!(state.name(), "living room");

        let mut attrs = JsonMap::new();
        attrs.insert("friendly_name".into(), "Lounge".into());
        let state = State::new("light.living_room", "on", attrs);
        assert_eq!(state.name(), "Lounge");
    }

    #[test]
    fn host_error_kinds() {
        assert_eq!(
            HostError::InvalidEntityId("x".into()).kind_name(),
            "InvalidEntityFormatError"
        );
        let err = HostError::ServiceNotFound {
            domain: "light".into(),
            service: "explode".into(),
        };
        assert_eq!(err.kind_name(), "ServiceNotFound");
        assert_eq!(err.to_string(), "Service light.explode not found.");
    }
}
