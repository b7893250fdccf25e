//! Script-facing views of the host.
//!
//! `hass` and its three registries are [`ScriptObject`]s that declare their
//! capability owner, so the attribute guard checks the allowlist before any
//! of the methods here can be reached. States handed to scripts are
//! snapshots; changing one never writes back to the store.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{Host, JsonMap, State};
use crate::allowlist::Owner;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Attr, ScriptObject};
use crate::value::{CallArgs, DateTimeValue, Dict, Value, from_json, to_json};

/// JSON object for an optional mapping argument; `None` is an empty map.
fn json_map(value: Option<&Value>, what: &str) -> Result<JsonMap> {
    match value {
        None | Some(Value::None) => Ok(JsonMap::new()),
        Some(value @ Value::Dict(_)) => match to_json(value) {
            serde_json::Value::Object(map) => Ok(map),
            _ => Ok(JsonMap::new()),
        },
        Some(other) => Err(SandboxError::type_error(format!(
            "{what} must be a dict, not {}",
            other.type_name()
        ))),
    }
}

/// Domain filter argument: a single domain, a list of domains or `None`.
fn domain_filter(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::None) => Ok(Vec::new()),
        Some(Value::Str(domain)) => Ok(vec![domain.to_lowercase()]),
        Some(other) => other
            .sequence_items()
            .ok_or_else(|| {
                SandboxError::type_error(format!(
                    "domain_filter must be a str or a list, not {}",
                    other.type_name()
                ))
            })?
            .iter()
            .map(|v| v.as_str().map(str::to_lowercase))
            .collect(),
    }
}

fn missing_member(class: &str, name: &str) -> SandboxError {
    SandboxError::attribute_error(format!("'{class}' object has no attribute '{name}'"))
}

// ---------------------------------------------------------------------------
// hass
// ---------------------------------------------------------------------------

/// The object bound to `hass`.
pub struct HassHandle {
    host: Arc<dyn Host>,
}

impl HassHandle {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self { host }
    }
}

impl ScriptObject for HassHandle {
    fn type_name(&self) -> &str {
        Owner::Host.class_name()
    }

    fn owner(&self) -> Option<Owner> {
        Some(Owner::Host)
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        let host = Arc::clone(&self.host);
        let value = match name {
            "bus" => Value::object(BusHandle { host }),
            "states" => Value::object(StatesHandle { host }),
            "services" => Value::object(ServicesHandle { host }),
            _ => return None,
        };
        Some(Attr::Value(value))
    }

    fn repr(&self) -> String {
        "<HomeAssistant object>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// hass.bus
// ---------------------------------------------------------------------------

pub struct BusHandle {
    host: Arc<dyn Host>,
}

impl ScriptObject for BusHandle {
    fn type_name(&self) -> &str {
        Owner::EventBus.class_name()
    }

    fn owner(&self) -> Option<Owner> {
        Some(Owner::EventBus)
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        (name == "fire").then_some(Attr::Method)
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        if name != "fire" {
            return Err(missing_member(self.type_name(), name));
        }
        args.expect("fire", 1, 2)?;
        args.allow_keywords("fire", &["event_type", "event_data", "origin", "context"])?;
        let event_type = args.required("fire", 0, "event_type")?.as_str()?;
        let event_data = json_map(args.arg(1, "event_data"), "event_data")?;
        self.host.bus().fire(event_type, event_data)?;
        Ok(Value::None)
    }

    fn repr(&self) -> String {
        "<EventBus object>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// hass.states
// ---------------------------------------------------------------------------

pub struct StatesHandle {
    host: Arc<dyn Host>,
}

impl StatesHandle {
    fn dispatch(&self, name: &str, args: &CallArgs) -> Result<Value> {
        let states = self.host.states();
        match name {
            "get" => {
                args.expect("get", 1, 1)?;
                let entity_id = args.positional[0].as_str()?;
                Ok(states
                    .get(entity_id)
                    .map_or(Value::None, |s| Value::object(StateObject::new(s))))
            }
            "set" => {
                args.expect("set", 2, 4)?;
                args.allow_keywords("set", &["attributes", "force_update", "context"])?;
                let entity_id = args.positional[0].as_str()?;
                let new_state = args.positional[1].to_str();
                let attributes = match args.arg(2, "attributes") {
                    None | Some(Value::None) => None,
                    value => Some(json_map(value, "attributes")?),
                };
                let force_update = args.arg(3, "force_update").is_some_and(Value::truthy);
                states.set(entity_id, &new_state, attributes, force_update)?;
                Ok(Value::None)
            }
            "remove" => {
                args.expect("remove", 1, 1)?;
                Ok(Value::Bool(states.remove(args.positional[0].as_str()?)))
            }
            "is_state" => {
                args.expect("is_state", 2, 2)?;
                let entity_id = args.positional[0].as_str()?;
                Ok(Value::Bool(
                    states.is_state(entity_id, &args.positional[1].to_str()),
                ))
            }
            "is_state_attr" => {
                args.expect("is_state_attr", 3, 3)?;
                let entity_id = args.positional[0].as_str()?;
                let attr = args.positional[1].as_str()?;
                Ok(Value::Bool(states.is_state_attr(
                    entity_id,
                    attr,
                    &to_json(&args.positional[2]),
                )))
            }
            "entity_ids" => {
                args.expect("entity_ids", 0, 1)?;
                let domains = domain_filter(args.arg(0, "domain_filter"))?;
                Ok(Value::list(
                    states
                        .entity_ids(&domains)
                        .into_iter()
                        .map(Value::from)
                        .collect(),
                ))
            }
            "all" => {
                args.expect("all", 0, 1)?;
                let domains = domain_filter(args.arg(0, "domain_filter"))?;
                Ok(Value::list(
                    states
                        .all(&domains)
                        .into_iter()
                        .map(|s| Value::object(StateObject::new(s)))
                        .collect(),
                ))
            }
            other => Err(missing_member(Owner::StateStore.class_name(), other)),
        }
    }
}

impl ScriptObject for StatesHandle {
    fn type_name(&self) -> &str {
        Owner::StateStore.class_name()
    }

    fn owner(&self) -> Option<Owner> {
        Some(Owner::StateStore)
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        Owner::StateStore
            .allowed()
            .contains(&name)
            .then_some(Attr::Method)
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        self.dispatch(name, &args)
    }

    fn repr(&self) -> String {
        "<StateMachine object>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// hass.services
// ---------------------------------------------------------------------------

pub struct ServicesHandle {
    host: Arc<dyn Host>,
}

impl ServicesHandle {
    fn dispatch(&self, name: &str, args: &CallArgs) -> Result<Value> {
        let services = self.host.services();
        match name {
            "call" => {
                args.expect("call", 2, 4)?;
                args.allow_keywords(
                    "call",
                    &["service_data", "blocking", "context", "target", "return_response"],
                )?;
                let domain = args.positional[0].as_str()?;
                let service = args.positional[1].as_str()?;
                let mut data = json_map(args.arg(2, "service_data"), "service_data")?;
                if let Some(target) = args.keyword("target") {
                    data.extend(json_map(Some(target), "target")?);
                }
                let blocking = args.arg(3, "blocking").is_some_and(Value::truthy);
                let response = services.call(domain, service, data, blocking)?;
                Ok(response.as_ref().map_or(Value::None, from_json))
            }
            "has_service" => {
                args.expect("has_service", 2, 2)?;
                Ok(Value::Bool(services.has_service(
                    args.positional[0].as_str()?,
                    args.positional[1].as_str()?,
                )))
            }
            "services" => {
                args.expect("services", 0, 0)?;
                let mut grouped = Dict::new();
                for (domain, names) in services.services() {
                    let names = names.into_iter().map(Value::from).collect();
                    grouped.insert(Value::from(domain), Value::list(names))?;
                }
                Ok(Value::dict(grouped))
            }
            other => Err(missing_member(Owner::ServiceRegistry.class_name(), other)),
        }
    }
}

impl ScriptObject for ServicesHandle {
    fn type_name(&self) -> &str {
        Owner::ServiceRegistry.class_name()
    }

    fn owner(&self) -> Option<Owner> {
        Some(Owner::ServiceRegistry)
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        Owner::ServiceRegistry
            .allowed()
            .contains(&name)
            .then_some(Attr::Method)
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        self.dispatch(name, &args)
    }

    fn repr(&self) -> String {
        "<ServiceRegistry object>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// State snapshots
// ---------------------------------------------------------------------------

/// A read-only state snapshot as seen by scripts.
pub struct StateObject {
    state: State,
}

impl StateObject {
    pub fn new(state: State) -> Self {
        Self { state }
    }

    fn timestamp(at: &DateTime<Utc>) -> Value {
        Value::DateTime(DateTimeValue::aware(
            at.naive_utc(),
            crate::modules::datetime::utc(),
        ))
    }

    fn attributes(&self) -> Value {
        from_json(&serde_json::Value::Object(self.state.attributes.clone()))
    }
}

impl ScriptObject for StateObject {
    fn type_name(&self) -> &str {
        "State"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        let s = &self.state;
        let value = match name {
            "entity_id" => Value::from(s.entity_id.as_str()),
            "state" => Value::from(s.state.as_str()),
            "attributes" => self.attributes(),
            "domain" => Value::from(s.domain()),
            "object_id" => Value::from(s.object_id()),
            "name" => Value::from(s.name()),
            "last_changed" => Self::timestamp(&s.last_changed),
            "last_updated" => Self::timestamp(&s.last_updated),
            "as_dict" => return Some(Attr::Method),
            _ => return None,
        };
        Some(Attr::Value(value))
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        if name != "as_dict" {
            return Err(missing_member("State", name));
        }
        args.expect("as_dict", 0, 0)?;
        Ok(from_json(&self.state.as_json()))
    }

    fn repr(&self) -> String {
        let s = &self.state;
        let attrs: Vec<String> = s
            .attributes
            .iter()
            .map(|(k, v)| format!("{k}={}", from_json(v).to_str()))
            .collect();
        let attrs = if attrs.is_empty() {
            String::new()
        } else {
            format!("; {}", attrs.join(", "))
        };
        format!(
            "<state {}={}{attrs} @ {}>",
            s.entity_id,
            s.state,
            s.last_changed.to_rfc3339()
        )
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        Some(self.state.as_json())
    }

    fn equals(&self, other: &dyn ScriptObject) -> bool {
        other.as_any().downcast_ref::<StateObject>().is_some_and(|o| {
            o.state.entity_id == self.state.entity_id
                && o.state.state == self.state.state
                && o.state.attributes == self.state.attributes
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InMemoryHost, StateStore};
    use serde_json::json;

    fn host() -> Arc<InMemoryHost> {
        let mut attrs = JsonMap::new();
        attrs.insert("brightness".into(), json!(255));
        Arc::new(InMemoryHost::new().with_state("light.kitchen", "on", attrs))
    }

    fn states(host: &Arc<InMemoryHost>) -> StatesHandle {
        StatesHandle {
            host: Arc::clone(host) as Arc<dyn Host>,
        }
    }

    fn args(values: Vec<Value>) -> CallArgs {
        CallArgs::new(values)
    }

    #[test]
    fn hass_exposes_only_its_registries() {
        let hass = HassHandle::new(host());
        assert!(hass.attr("states").is_some());
        assert!(hass.attr("bus").is_some());
        assert!(hass.attr("config").is_none());
        assert_eq!(hass.owner(), Some(Owner::Host));
    }

    #[test]
    fn state_reads_return_snapshots() {
        let host = host();
        let handle = states(&host);
        let state = handle
            .dispatch("get", &args(vec![Value::from("light.kitchen")]))
            .unwrap();
        assert!(state.repr().starts_with("<state light.kitchen=on; brightness=255 @ "));
        assert!(handle
            .dispatch("get", &args(vec![Value::from("light.missing")]))
            .unwrap()
            .is_none());
        let ids = handle
            .dispatch("entity_ids", &args(vec![Value::from("light")]))
            .unwrap();
        assert_eq!(ids.repr(), "['light.kitchen']");
    }

    #[test]
    fn state_writes_go_through_the_store() {
        let host = host();
        let handle = states(&host);
        handle
            .dispatch("set", &args(vec![Value::from("sensor.count"), Value::Int(3)]))
            .unwrap();
        assert!(host.is_state("sensor.count", "3"));
        let err = handle
            .dispatch("set", &args(vec![Value::from("bad id"), Value::from("x")]))
            .unwrap_err();
        assert_eq!(err.kind_name(), "InvalidEntityFormatError");
        assert!(matches!(
            handle.dispatch("remove", &args(vec![Value::from("sensor.count")])),
            Ok(Value::Bool(true))
        ));
    }

    #[test]
    fn service_calls_convert_payloads() {
        let host = host();
        host.register_service("light", "turn_off", |_| Ok(Some(json!({"done": true}))));
        let services = ServicesHandle {
            host: Arc::clone(&host) as Arc<dyn Host>,
        };
        let mut data = Dict::new();
        data.insert(Value::from("entity_id"), Value::from("light.kitchen"))
            .unwrap();
        let call = CallArgs::with_keywords(
            vec![Value::from("light"), Value::from("turn_off"), Value::dict(data)],
            vec![("blocking".into(), Value::Bool(true))],
        );
        let response = services.dispatch("call", &call).unwrap();
        assert_eq!(response.repr(), "{'done': True}");
        assert_eq!(
            host.service_calls()[0].service_data["entity_id"],
            json!("light.kitchen")
        );
        let missing = services
            .dispatch("call", &args(vec![Value::from("light"), Value::from("explode")]))
            .unwrap_err();
        assert_eq!(missing.kind_name(), "ServiceNotFound");
    }

    #[test]
    fn bus_rejects_non_dict_payloads() {
        let host = host();
        let bus = BusHandle {
            host: Arc::clone(&host) as Arc<dyn Host>,
        };
        assert!(json_map(Some(&Value::Int(1)), "event_data").is_err());
        let fired = CallArgs::with_keywords(
            vec![Value::from("custom")],
            vec![("event_data".into(), Value::Int(1))],
        );
        assert!(json_map(fired.arg(1, "event_data"), "event_data").is_err());
        assert!(bus.attr("fire").is_some());
        assert!(bus.attr("listen").is_none());
    }
}
