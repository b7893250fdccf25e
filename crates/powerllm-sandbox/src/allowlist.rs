//! Capability allowlist.
//!
//! Static tables naming which members are reachable on each guarded owner.
//! The checks here are pure lookups; the attribute guard calls
//! [`check_attribute`] before resolving anything on an object.

/// Identity of an object whose attributes are restricted by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// The `hass` handle.
    Host,
    /// `hass.bus`.
    EventBus,
    /// `hass.states`.
    StateStore,
    /// `hass.services`.
    ServiceRegistry,
    /// The `time` wrapper.
    Clock,
    /// The `datetime` module.
    DateTimeModule,
    /// The `dt_util` namespace.
    DtUtil,
}

const HOST: &[&str] = &["bus", "services", "states"];
const EVENT_BUS: &[&str] = &["fire"];
const STATE_STORE: &[&str] = &[
    "entity_ids",
    "all",
    "get",
    "is_state",
    "is_state_attr",
    "remove",
    "set",
];
const SERVICE_REGISTRY: &[&str] = &["services", "has_service", "call"];
const CLOCK: &[&str] = &[
    "sleep",
    "strftime",
    "strptime",
    "gmtime",
    "localtime",
    "ctime",
    "time",
    "mktime",
];
const DATETIME_MODULE: &[&str] = &["date", "time", "datetime", "timedelta", "tzinfo"];
const DT_UTIL: &[&str] = &[
    "utcnow",
    "now",
    "as_utc",
    "as_timestamp",
    "as_local",
    "utc_from_timestamp",
    "start_of_local_day",
    "parse_datetime",
    "parse_date",
    "get_age",
];

/// Prefix marking asynchronous host operations, denied everywhere.
pub const ASYNC_PREFIX: &str = "async_";

impl Owner {
    /// Members reachable on this owner.
    pub fn allowed(self) -> &'static [&'static str] {
        match self {
            Self::Host => HOST,
            Self::EventBus => EVENT_BUS,
            Self::StateStore => STATE_STORE,
            Self::ServiceRegistry => SERVICE_REGISTRY,
            Self::Clock => CLOCK,
            Self::DateTimeModule => DATETIME_MODULE,
            Self::DtUtil => DT_UTIL,
        }
    }

    /// Class name used in violation messages.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Host => "HomeAssistant",
            Self::EventBus => "EventBus",
            Self::StateStore => "StateMachine",
            Self::ServiceRegistry => "ServiceRegistry",
            Self::Clock => "TimeWrapper",
            Self::DateTimeModule | Self::DtUtil => "module",
        }
    }
}

/// Whether `name` may be read on an object with the given owner.
pub fn is_allowed(owner: Option<Owner>, name: &str) -> bool {
    check_attribute(owner, name).is_ok()
}

/// Check an attribute read, returning the violation message on denial.
///
/// Order: the async rule, then the owner table, then the generic rule that
/// denies names starting with an underscore.
pub fn check_attribute(owner: Option<Owner>, name: &str) -> Result<(), String> {
    if name.starts_with(ASYNC_PREFIX) {
        return Err("Not allowed to access async methods".to_string());
    }
    if let Some(owner) = owner {
        if !owner.allowed().contains(&name) {
            return Err(format!(
                "Not allowed to access {}.{name}",
                owner.class_name()
            ));
        }
    }
    if name.starts_with('_') {
        return Err(format!(
            "\"{name}\" is an invalid attribute name because it starts with \"_\""
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_tables() {
        assert!(is_allowed(Some(Owner::Host), "states"));
        assert!(!is_allowed(Some(Owner::Host), "config"));
        assert!(is_allowed(Some(Owner::StateStore), "is_state_attr"));
        assert!(!is_allowed(Some(Owner::StateStore), "async_set"));
        assert!(is_allowed(Some(Owner::Clock), "sleep"));
        assert!(!is_allowed(Some(Owner::Clock), "perf_counter"));
        assert!(is_allowed(Some(Owner::DtUtil), "get_age"));
        assert!(is_allowed(Some(Owner::DateTimeModule), "timedelta"));
        assert!(!is_allowed(Some(Owner::DateTimeModule), "MINYEAR"));
    }

    #[test]
    fn async_prefix_is_denied_everywhere() {
        assert_eq!(
            check_attribute(None, "async_call").unwrap_err(),
            "Not allowed to access async methods"
        );
        assert!(!is_allowed(Some(Owner::EventBus), "async_fire"));
    }

    #[test]
    fn violation_messages_name_the_owner() {
        assert_eq!(
            check_attribute(Some(Owner::Host), "loop").unwrap_err(),
            "Not allowed to access HomeAssistant.loop"
        );
        assert_eq!(
            check_attribute(Some(Owner::ServiceRegistry), "register").unwrap_err(),
            "Not allowed to access ServiceRegistry.register"
        );
    }

    #[test]
    fn private_names_fall_back_to_generic_denial() {
        assert!(!is_allowed(None, "_secret"));
        assert!(!is_allowed(None, "__class__"));
        assert!(is_allowed(None, "upper"));
    }
}
