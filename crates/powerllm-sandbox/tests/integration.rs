//! Integration tests for the powerllm-sandbox crate.
//!
//! These tests run whole scripts through [`Sandbox`] and the tool adapter
//! against an [`InMemoryHost`], checking the result envelopes an agent sees.

use std::sync::Arc;

use powerllm_adapters::ToolRegistry;
use powerllm_sandbox::adapter;
use powerllm_sandbox::{
    Host, InMemoryHost, PrintPolicy, Sandbox, SandboxConfig, SandboxError, StateStore,
};
use serde_json::{Map, Value, json};

fn kitchen_host() -> Arc<InMemoryHost> {
    let mut attributes = Map::new();
    attributes.insert("brightness".into(), json!(255));
    attributes.insert("friendly_name".into(), json!("Kitchen"));
    Arc::new(
        InMemoryHost::new()
            .with_state("light.kitchen", "on", attributes)
            .with_state("sensor.outside", "12.5", Map::new()),
    )
}

fn sandbox_for(host: &Arc<InMemoryHost>) -> Sandbox {
    Sandbox::with_defaults(Arc::clone(host) as Arc<dyn Host>)
}

fn run(source: &str) -> Value {
    sandbox_for(&kitchen_host()).python_code_execute(source, None)
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[test]
fn output_literal() {
    assert_eq!(
        run("output['test'] = 'passed'"),
        json!({"output": {"test": "passed"}})
    );
}

#[test]
fn whitelisted_module_import() {
    assert_eq!(
        run("import math\noutput['cos'] = math.cos(0)"),
        json!({"output": {"cos": 1.0}})
    );
}

#[test]
fn data_is_available_to_the_script() {
    let sandbox = sandbox_for(&kitchen_host());
    let data = json!({"numbers": [3, 1, 2]});
    let result = sandbox.python_code_execute(
        "output['sorted'] = sorted(data['numbers'])\noutput['total'] = sum(data['numbers'])",
        Some(&data),
    );
    assert_eq!(result, json!({"output": {"sorted": [1, 2, 3], "total": 6}}));
}

#[test]
fn functions_and_comprehensions() {
    let source = "\
def square(n):
    return n * n

output['squares'] = [square(n) for n in range(4)]
output['evens'] = {n: n % 2 == 0 for n in range(3)}
";
    assert_eq!(
        run(source),
        json!({"output": {
            "squares": [0, 1, 4, 9],
            "evens": {"0": true, "1": false, "2": true},
        }})
    );
}

#[test]
fn exceptions_can_be_caught() {
    let source = "\
try:
    x = 1 / 0
except ZeroDivisionError:
    output['caught'] = True
";
    assert_eq!(run(source), json!({"output": {"caught": true}}));
}

#[test]
fn printed_text_and_logs_are_returned() {
    let result = run("print('hello', 'world')\nlogger.info('count=%d', 3)\noutput['x'] = 1");
    assert_eq!(
        result,
        json!({
            "output": {"x": 1},
            "printed": "hello world\n",
            "logs": [{"level": 20, "msg": "count=3"}],
        })
    );
}

#[test]
fn compiler_warnings_are_logged() {
    assert_eq!(
        run("x = 1\nx\noutput['a'] = 1"),
        json!({
            "output": {"a": 1},
            "logs": [{
                "level": 30,
                "msg": "Warning loading script: Line 2: expression result is discarded",
            }],
        })
    );
}

#[test]
fn print_policy_warn_drops_printed_text() {
    let sandbox = Sandbox::new(
        kitchen_host() as Arc<dyn Host>,
        SandboxConfig::default().with_print_policy(PrintPolicy::Warn),
    );
    let execution = sandbox.execute("print('ignored')", None).unwrap();
    assert_eq!(execution.printed, None);
    assert_eq!(execution.logs.len(), 1);
    assert_eq!(execution.logs[0].level, 30);
}

#[test]
fn nested_functions_do_not_keep_the_host_alive() {
    let host = kitchen_host();
    let sandbox = sandbox_for(&host);
    let baseline = Arc::strong_count(&host);
    let source = "\
def outer():
    h = hass
    def inner():
        return h
    return 1

output['r'] = outer()
";
    for _ in 0..3 {
        assert_eq!(sandbox.python_code_execute(source, None), json!({"output": {"r": 1}}));
    }
    assert_eq!(Arc::strong_count(&host), baseline);
}

#[test]
fn self_referencing_containers() {
    assert_eq!(
        run("import collections\nc = collections.Counter('ab')\nc.update(c)\noutput['c'] = c"),
        json!({"output": {"c": {"a": 2, "b": 2}}})
    );
    assert_eq!(
        run("a = []\na.append(a)\na.remove([])"),
        json!({
            "error": "HomeAssistantError",
            "error_text": "Error executing script (ValueError): list.remove(x): x not in list",
        })
    );
    assert_eq!(
        run("a = [1]\na.append(a)\na.remove(a)\noutput['a'] = a"),
        json!({"output": {"a": [1]}})
    );
}

#[test]
fn range_slices_past_the_integer_limit_overflow() {
    let result = run("r = range(0, 9223372036854775807, 4611686018427387904)\noutput['r'] = r[::1]");
    assert_eq!(
        result,
        json!({
            "error": "HomeAssistantError",
            "error_text": "Error executing script (OverflowError): integer overflow",
        })
    );
}

#[test]
fn executions_do_not_share_state() {
    let sandbox = sandbox_for(&kitchen_host());
    sandbox.execute("leftover = 1", None).unwrap();
    let result = sandbox.python_code_execute("output['x'] = leftover", None);
    assert_eq!(
        result,
        json!({
            "error": "HomeAssistantError",
            "error_text": "Error executing script (NameError): name 'leftover' is not defined",
        })
    );
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn failures_keep_printed_text_and_logs() {
    assert_eq!(
        run("logger.info('step 1 ok')\nprint('partial')\nx = 1 / 0"),
        json!({
            "error": "HomeAssistantError",
            "error_text": "Error executing script (ZeroDivisionError): division by zero",
            "printed": "partial\n",
            "logs": [{"level": 20, "msg": "step 1 ok"}],
        })
    );
}

#[test]
fn syntax_error_is_a_script_error() {
    let result = run("output['x'] = (1");
    assert_eq!(result["error"], "ScriptError");
    let text = result["error_text"].as_str().unwrap();
    assert!(text.starts_with("Compile error: "), "{text}");
}

#[test]
fn compile_errors_surface_through_execute() {
    let err = sandbox_for(&kitchen_host())
        .execute("def f(:\n    pass", None)
        .unwrap_err();
    assert!(matches!(err, SandboxError::Compile { .. }));
}

#[test]
fn async_attributes_are_forbidden() {
    assert_eq!(
        run("hass.async_create_task(None)"),
        json!({
            "error": "ServiceValidationError",
            "error_text": "Error executing script: Not allowed to access async methods",
        })
    );
}

#[test]
fn host_attributes_outside_the_allowlist_are_forbidden() {
    let result = run("hass.config");
    assert_eq!(result["error"], "ServiceValidationError");
    assert_eq!(
        result["error_text"],
        "Error executing script: Not allowed to access HomeAssistant.config"
    );
}

#[test]
fn import_outside_the_allowlist_fails() {
    assert_eq!(
        run("import os"),
        json!({
            "error": "HomeAssistantError",
            "error_text": "Error executing script (ImportError): Module os not found",
        })
    );
}

#[test]
fn inplace_on_unsupported_type_is_a_violation() {
    let result = run("x = {}\nx += {}");
    assert_eq!(result["error"], "ServiceValidationError");
    let text = result["error_text"].as_str().unwrap();
    assert!(text.contains("'+=' operation is not allowed"), "{text}");
}

#[test]
fn runaway_recursion_is_stopped() {
    let result = run("def f(n):\n    return f(n + 1)\n\nf(0)");
    assert_eq!(result["error"], "HomeAssistantError");
    let text = result["error_text"].as_str().unwrap();
    assert!(text.starts_with("Error executing script (RecursionError)"), "{text}");
}

#[test]
fn non_mapping_data_is_rejected() {
    let sandbox = sandbox_for(&kitchen_host());
    let result = sandbox.python_code_execute("output['x'] = 1", Some(&json!([1, 2])));
    assert_eq!(
        result["error_text"],
        "Error executing script (TypeError): data must be a mapping, not list"
    );
}

// ---------------------------------------------------------------------------
// Host interaction
// ---------------------------------------------------------------------------

#[test]
fn states_are_readable() {
    let source = "\
light = hass.states.get('light.kitchen')
output['state'] = light.state
output['brightness'] = light.attributes['brightness']
output['name'] = light.name
output['lights'] = hass.states.entity_ids('light')
";
    assert_eq!(
        run(source),
        json!({"output": {
            "state": "on",
            "brightness": 255,
            "name": "Kitchen",
            "lights": ["light.kitchen"],
        }})
    );
}

#[test]
fn states_are_writable() {
    let host = kitchen_host();
    let result = sandbox_for(&host).python_code_execute(
        "hass.states.set('sensor.result', '42', {'unit_of_measurement': 'W'})",
        None,
    );
    assert_eq!(result, json!({"output": {}}));
    let state = host.get("sensor.result").unwrap();
    assert_eq!(state.state, "42");
    assert_eq!(state.attributes["unit_of_measurement"], json!("W"));
}

#[test]
fn forbidden_async_writes_leave_no_trace() {
    let host = kitchen_host();
    let result = sandbox_for(&host)
        .python_code_execute("output['a'] = 1\nhass.states.async_set('light.x', 'on')", None);
    assert_eq!(
        result,
        json!({
            "error": "ServiceValidationError",
            "error_text": "Error executing script: Not allowed to access async methods",
        })
    );
    assert!(host.get("light.x").is_none());
}

#[test]
fn service_calls_reach_the_host() {
    let host = kitchen_host();
    host.register_service("light", "turn_off", |_| Ok(None));
    let result = sandbox_for(&host).python_code_execute(
        "hass.services.call('light', 'turn_off', {'entity_id': 'light.kitchen'})\n\
         output['has'] = hass.services.has_service('light', 'turn_off')",
        None,
    );
    assert_eq!(result, json!({"output": {"has": true}}));
    let calls = host.service_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].domain, "light");
    assert_eq!(calls[0].service_data["entity_id"], json!("light.kitchen"));
}

#[test]
fn missing_service_is_reported() {
    let result = run("hass.services.call('light', 'explode')");
    assert_eq!(result["error"], "HomeAssistantError");
    let text = result["error_text"].as_str().unwrap();
    assert!(text.starts_with("Error executing script (ServiceNotFound)"), "{text}");
}

#[test]
fn events_are_fired() {
    let host = kitchen_host();
    sandbox_for(&host)
        .execute("hass.bus.fire('script_done', {'ok': True})", None)
        .unwrap();
    let events = host.fired_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "script_done");
    assert_eq!(events[0].event_data["ok"], json!(true));
}

// ---------------------------------------------------------------------------
// Tool registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tool_is_callable_through_the_registry() {
    let registry = ToolRegistry::new();
    adapter::register(&registry, sandbox_for(&kitchen_host())).unwrap();
    assert!(registry.contains("python_code_execute"));

    let result = registry
        .call(
            "python_code_execute",
            json!({"source": "output['n'] = len(data)", "data": {"a": 1, "b": 2}}),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"output": {"n": 2}}));
}

#[tokio::test]
async fn registry_rejects_missing_source() {
    let registry = ToolRegistry::new();
    adapter::register(&registry, sandbox_for(&kitchen_host())).unwrap();
    assert!(registry.call("python_code_execute", json!({})).await.is_err());
}
