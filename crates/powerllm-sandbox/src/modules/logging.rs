//! `logging` façade.
//!
//! `getLogger` ignores the requested name and always hands back the
//! execution's own logger, so records land in the tool result.

use crate::diagnostics::{self, LoggerHandle};
use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::object::Module;
use crate::value::{Builtin, CallArgs, Value};

fn get_logger(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("getLogger", 0, 1)?;
    args.allow_keywords("getLogger", &["name"])?;
    Ok(Value::object(LoggerHandle::new(interp.logger())))
}

pub fn module() -> Value {
    let level = |n: u8| Value::Int(i64::from(n));
    Value::object(Module::new(
        "logging",
        vec![
            ("getLogger", Builtin::new("getLogger", get_logger)),
            ("DEBUG", level(diagnostics::DEBUG)),
            ("INFO", level(diagnostics::INFO)),
            ("WARNING", level(diagnostics::WARNING)),
            ("WARN", level(diagnostics::WARNING)),
            ("ERROR", level(diagnostics::ERROR)),
            ("CRITICAL", level(diagnostics::CRITICAL)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::downcast;

    #[test]
    fn level_constants_match_diagnostics() {
        let module = module();
        let logging = downcast::<Module>(&module).unwrap();
        assert!(matches!(logging.member("INFO"), Some(Value::Int(20))));
        assert!(matches!(logging.member("CRITICAL"), Some(Value::Int(50))));
        assert!(logging.member("getLogger").is_some());
        assert!(logging.member("basicConfig").is_none());
    }
}
