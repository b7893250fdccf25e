//! Tree-walking interpreter for compiled programs.
//!
//! The interpreter only understands guarded trees: attribute and item
//! access, writes, iteration, unpacking, augmented assignment and printing
//! are all dispatched through the hook functions bound in the global
//! namespace. A raw node reaching the evaluator is an internal error, never
//! a silent fallback to unguarded behaviour.

use std::collections::{HashMap, HashSet};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::ast::{
    BoolOp, ComprehensionKind, Expr, ExprKind, FStringPart, Generator, Params, Stmt, StmtKind,
    Target, UnaryOp,
};
use crate::compiler::Program;
use crate::diagnostics::ScriptLogger;
use crate::environment::Environment;
use crate::error::{Result, SandboxError, ScriptException, is_subclass};
use crate::format;
use crate::guards::GuardedEnvironment;
use crate::host::Host;
use crate::methods;
use crate::ops;
use crate::value::{
    CallArgs, Dict, Function, FunctionBody, RangeValue, SliceValue, TypeKind, Value, set_from,
};

// ---------------------------------------------------------------------------
// Scopes
// ---------------------------------------------------------------------------

/// A variable scope. Function calls and comprehensions get a child of the
/// scope they were defined in; lookups walk outwards to the globals.
#[derive(Default)]
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
    globals_decl: RefCell<HashSet<String>>,
}

impl Scope {
    /// A new global (root) scope.
    pub fn global() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Self {
            parent: Some(Rc::clone(parent)),
            ..Self::default()
        })
    }

    fn root(&self) -> &Scope {
        match &self.parent {
            Some(parent) => parent.root(),
            None => self,
        }
    }

    fn is_global_here(&self, name: &str) -> bool {
        self.parent.is_some() && self.globals_decl.borrow().contains(name)
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if self.is_global_here(name) {
            return self.root().vars.borrow().get(name).cloned();
        }
        if let Some(value) = self.vars.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.get(name))
    }

    /// Bind `name`, honouring `global` declarations.
    pub fn set(&self, name: &str, value: Value) {
        let target = if self.is_global_here(name) {
            self.root()
        } else {
            self
        };
        target.vars.borrow_mut().insert(name.to_string(), value);
    }

    /// Unbind `name`. Returns whether it was bound.
    pub fn remove(&self, name: &str) -> bool {
        let target = if self.is_global_here(name) {
            self.root()
        } else {
            self
        };
        target.vars.borrow_mut().remove(name).is_some()
    }

    pub fn declare_global(&self, name: &str) {
        self.globals_decl.borrow_mut().insert(name.to_string());
    }

    /// Drop every binding. Breaks reference cycles between functions and the
    /// scope they close over.
    pub fn clear(&self) {
        let vars = std::mem::take(&mut *self.vars.borrow_mut());
        drop(vars);
    }
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

/// How a block finished.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Values produced for a `for` loop or comprehension clause.
enum LoopItems {
    Range(RangeValue, usize),
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for LoopItems {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            Self::Range(range, index) => {
                if *index >= range.len() {
                    return None;
                }
                let value = range.get(*index);
                *index += 1;
                Some(Value::Int(value))
            }
            Self::Items(items) => items.next(),
        }
    }
}

enum Collected {
    Items(Vec<Value>),
    Dict(Dict),
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

pub struct Interpreter {
    globals: Rc<Scope>,
    builtins: HashMap<&'static str, Value>,
    guards: Rc<dyn GuardedEnvironment>,
    logger: Rc<ScriptLogger>,
    host: Arc<dyn Host>,
    max_call_depth: usize,
    depth: usize,
    /// Exceptions currently being handled, innermost last.
    handling: Vec<Rc<ScriptException>>,
    modules: HashMap<String, Value>,
    rng: StdRng,
    /// Child scopes created so far. A nested function and the call scope it
    /// closes over keep each other alive, so the run ends by clearing
    /// whichever are still reachable.
    scopes: Vec<Weak<Scope>>,
}

impl Interpreter {
    pub fn new(env: Environment) -> Self {
        Self {
            globals: env.globals,
            builtins: env.builtins,
            guards: env.guards,
            logger: env.logger,
            host: env.host,
            max_call_depth: env.max_call_depth,
            depth: 0,
            handling: Vec::new(),
            modules: HashMap::new(),
            rng: StdRng::from_entropy(),
            scopes: Vec::new(),
        }
    }

    /// Execute a compiled program against the global namespace.
    ///
    /// Local scopes are released when the program finishes, whether or not
    /// it succeeded. The globals are left for the caller to read.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        let globals = Rc::clone(&self.globals);
        let flow = self.exec_block(&program.body, &globals);
        self.release_scopes();
        match flow? {
            Flow::Normal => Ok(()),
            _ => Err(SandboxError::Internal(
                "control flow escaped the module body".into(),
            )),
        }
    }

    fn child_scope(&mut self, parent: &Rc<Scope>) -> Rc<Scope> {
        if self.scopes.len() == self.scopes.capacity() {
            self.scopes.retain(|scope| scope.strong_count() > 0);
        }
        let scope = Scope::child(parent);
        self.scopes.push(Rc::downgrade(&scope));
        scope
    }

    fn release_scopes(&mut self) {
        for scope in std::mem::take(&mut self.scopes) {
            if let Some(scope) = scope.upgrade() {
                scope.clear();
            }
        }
    }

    pub fn guards(&self) -> Rc<dyn GuardedEnvironment> {
        Rc::clone(&self.guards)
    }

    pub fn logger(&self) -> Rc<ScriptLogger> {
        Rc::clone(&self.logger)
    }

    pub fn host(&self) -> Arc<dyn Host> {
        Arc::clone(&self.host)
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// A global binding, e.g. `output` after the run.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }

    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.get(name).cloned()
    }

    pub fn cached_module(&self, name: &str) -> Option<Value> {
        self.modules.get(name).cloned()
    }

    pub fn cache_module(&mut self, name: &str, module: Value) {
        self.modules.insert(name.to_string(), module);
    }

    // -----------------------------------------------------------------------
    // Calls and hooks
    // -----------------------------------------------------------------------

    /// Call any callable value.
    pub fn call_value(&mut self, func: &Value, args: CallArgs) -> Result<Value> {
        match func {
            Value::Builtin(builtin) => (builtin.func)(self, args),
            Value::Function(function) => self.call_function(function, args),
            Value::Method(method) => {
                let method = Rc::clone(method);
                methods::call_method(self, &method.receiver, &method.name, args)
            }
            Value::Type(kind) => crate::builtins::construct(self, kind, args),
            Value::Object(obj) if obj.is_callable() => {
                let obj = Rc::clone(obj);
                obj.call(self, args)
            }
            other => Err(SandboxError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Guarded attribute read, as `obj.name` in a script.
    pub fn get_attr(&mut self, obj: &Value, name: &str) -> Result<Value> {
        self.call_hook("_getattr_", vec![obj.clone(), Value::from(name)])
    }

    /// Guarded item read, as `obj[index]` in a script.
    pub fn get_item(&mut self, obj: &Value, index: &Value) -> Result<Value> {
        self.call_hook("_getitem_", vec![obj.clone(), index.clone()])
    }

    fn call_hook(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let hook = self
            .globals
            .get(name)
            .ok_or_else(|| SandboxError::Internal(format!("guard hook {name} is not installed")))?;
        self.call_value(&hook, CallArgs::new(args))
    }

    fn call_function(&mut self, function: &Rc<Function>, args: CallArgs) -> Result<Value> {
        if self.depth >= self.max_call_depth {
            return Err(SandboxError::exception(
                "RecursionError",
                "maximum recursion depth exceeded",
            ));
        }
        let scope = self.child_scope(&function.closure);
        bind_arguments(function, args, &scope)?;
        self.depth += 1;
        let result = match &function.body {
            FunctionBody::Block(body) => self.exec_block(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::None,
            }),
            FunctionBody::Lambda(expr) => self.eval(expr, &scope),
        };
        self.depth -= 1;
        result
    }

    fn make_function(
        &mut self,
        name: &str,
        params: &Rc<Params>,
        body: FunctionBody,
        scope: &Rc<Scope>,
    ) -> Result<Value> {
        let mut defaults = Vec::with_capacity(params.positional.len());
        for param in &params.positional {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, scope)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(params.kwonly.len());
        for param in &params.kwonly {
            kw_defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, scope)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Function {
            name: Rc::from(name),
            params: Rc::clone(params),
            defaults,
            kw_defaults,
            body,
            closure: Rc::clone(scope),
        })))
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow> {
        for stmt in stmts {
            let flow = self.exec(stmt, scope)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::InPlace { target, op, value } => {
                let Target::Name(name) = target else {
                    return Err(SandboxError::Internal(
                        "in-place assignment to a non-name target".into(),
                    ));
                };
                let current = self.lookup(name, scope)?;
                let operand = self.eval(value, scope)?;
                let result = self.call_hook("_inplacevar_", vec![Value::from(*op), current, operand])?;
                scope.set(name, result);
            }
            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval(test, scope)?.truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch, scope);
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec_block(body, scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse, scope);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, scope)?;
                for item in self.loop_items(target, iterable)? {
                    self.bind_loop_target(target, item, scope)?;
                    match self.exec_block(body, scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                return self.exec_block(orelse, scope);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef { name, params, body } => {
                let function =
                    self.make_function(name, params, FunctionBody::Block(Rc::clone(body)), scope)?;
                scope.set(name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    match &alias.asname {
                        Some(asname) => {
                            let module = self.import(&alias.name)?;
                            scope.set(asname, module);
                        }
                        None => {
                            let top = alias.name.split('.').next().unwrap_or_default();
                            if top != alias.name {
                                self.import(&alias.name)?;
                            }
                            let module = self.import(top)?;
                            scope.set(top, module);
                        }
                    }
                }
            }
            StmtKind::ImportFrom { module, names, .. } => {
                let source = self.import(module)?;
                for alias in names {
                    let value = match self.get_attr(&source, &alias.name) {
                        Ok(value) => value,
                        Err(SandboxError::Exception(exc)) if exc.kind == "AttributeError" => {
                            return Err(SandboxError::exception(
                                "ImportError",
                                format!("cannot import name '{}' from '{module}'", alias.name),
                            ));
                        }
                        Err(err) => return Err(err),
                    };
                    scope.set(alias.asname.as_deref().unwrap_or(&alias.name), value);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            StmtKind::Raise { exc, cause } => {
                let Some(exc) = exc else {
                    return Err(match self.handling.last() {
                        Some(current) => SandboxError::Exception((**current).clone()),
                        None => SandboxError::exception(
                            "RuntimeError",
                            "No active exception to reraise",
                        ),
                    });
                };
                let value = self.eval(exc, scope)?;
                if let Some(cause) = cause {
                    self.eval(cause, scope)?;
                }
                return Err(SandboxError::Exception(exception_from(&value)?));
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg, scope)?.to_str(),
                        None => String::new(),
                    };
                    return Err(SandboxError::exception("AssertionError", message));
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Global(names) => {
                for name in names {
                    scope.declare_global(name);
                }
            }
            StmtKind::AugAssign { .. } => {
                return Err(SandboxError::Internal(
                    "unguarded augmented assignment reached the interpreter".into(),
                ));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[crate::ast::Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: &Rc<Scope>,
    ) -> Result<Flow> {
        let outcome = match self.exec_block(body, scope) {
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            Ok(flow) => Ok(flow),
            Err(err) => match err.as_catchable() {
                Some(exc) => self.handle(err, exc, handlers, scope),
                None => Err(err),
            },
        };
        if !finalbody.is_empty() {
            let flow = self.exec_block(finalbody, scope)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        outcome
    }

    fn handle(
        &mut self,
        err: SandboxError,
        exc: ScriptException,
        handlers: &[crate::ast::Handler],
        scope: &Rc<Scope>,
    ) -> Result<Flow> {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    let kind = self.eval(kind, scope)?;
                    exception_matches(&exc.kind, &kind)?
                }
            };
            if !matched {
                continue;
            }
            let exc = Rc::new(exc);
            if let Some(name) = &handler.name {
                scope.set(name, Value::Exception(Rc::clone(&exc)));
            }
            self.handling.push(exc);
            let result = self.exec_block(&handler.body, scope);
            self.handling.pop();
            if let Some(name) = &handler.name {
                scope.remove(name);
            }
            return result;
        }
        Err(err)
    }

    fn import(&mut self, name: &str) -> Result<Value> {
        let importer = self
            .builtin("__import__")
            .ok_or_else(|| SandboxError::Internal("import resolver is not installed".into()))?;
        self.call_value(&importer, CallArgs::new(vec![Value::from(name)]))
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    fn assign(&mut self, target: &Target, value: Value, scope: &Rc<Scope>) -> Result<()> {
        match target {
            Target::Name(name) => {
                scope.set(name, value);
                Ok(())
            }
            Target::GuardedSubscript { value: obj, index } => {
                let obj = self.eval(obj, scope)?;
                let index = self.eval(index, scope)?;
                let writable = self.call_hook("_write_", vec![obj])?;
                ops::set_item(&writable, &index, value)
            }
            Target::GuardedAttribute { value: obj, attr } => {
                let obj = self.eval(obj, scope)?;
                self.call_hook("_write_", vec![obj, Value::from(attr.as_str())])?;
                Err(SandboxError::violation(format!(
                    "Not allowed to write attribute '{attr}'"
                )))
            }
            Target::Unpack { targets, starred } => {
                let values = self.call_hook(
                    "_unpack_sequence_",
                    vec![value, Value::Int(targets.len() as i64), star_index(*starred)],
                )?;
                self.assign_row(targets, &values, scope)
            }
            Target::Attribute { .. }
            | Target::Subscript { .. }
            | Target::Sequence(_)
            | Target::Starred(_) => Err(SandboxError::Internal(
                "unguarded assignment target reached the interpreter".into(),
            )),
        }
    }

    fn assign_row(&mut self, targets: &[Target], row: &Value, scope: &Rc<Scope>) -> Result<()> {
        let values = ops::iterate(row)?;
        if values.len() != targets.len() {
            return Err(SandboxError::Internal("unpack hook returned wrong arity".into()));
        }
        for (target, value) in targets.iter().zip(values) {
            self.assign(target, value, scope)?;
        }
        Ok(())
    }

    fn delete(&mut self, target: &Target, scope: &Rc<Scope>) -> Result<()> {
        match target {
            Target::Name(name) => {
                if scope.remove(name) {
                    Ok(())
                } else {
                    Err(SandboxError::name_error(name))
                }
            }
            Target::GuardedSubscript { value, index } => {
                let obj = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                let writable = self.call_hook("_write_", vec![obj])?;
                ops::del_item(&writable, &index)
            }
            Target::GuardedAttribute { value, attr } => {
                let obj = self.eval(value, scope)?;
                self.call_hook("_write_", vec![obj, Value::from(attr.as_str())])?;
                Err(SandboxError::violation(format!(
                    "Not allowed to delete attribute '{attr}'"
                )))
            }
            Target::Unpack { targets, .. } => {
                for target in targets {
                    self.delete(target, scope)?;
                }
                Ok(())
            }
            _ => Err(SandboxError::Internal(
                "unguarded delete target reached the interpreter".into(),
            )),
        }
    }

    /// Items for a loop over `iterable`. Unpacking targets receive rows
    /// already split by the iter-unpack hook.
    fn loop_items(&mut self, target: &Target, iterable: Value) -> Result<LoopItems> {
        if let Target::Unpack { targets, starred } = target {
            let rows = self.call_hook(
                "_iter_unpack_sequence_",
                vec![
                    iterable,
                    Value::Int(targets.len() as i64),
                    star_index(*starred),
                ],
            )?;
            return Ok(LoopItems::Items(ops::iterate(&rows)?.into_iter()));
        }
        match self.call_hook("_getiter_", vec![iterable])? {
            Value::Range(range) => Ok(LoopItems::Range(range, 0)),
            other => Ok(LoopItems::Items(ops::iterate(&other)?.into_iter())),
        }
    }

    fn bind_loop_target(&mut self, target: &Target, item: Value, scope: &Rc<Scope>) -> Result<()> {
        match target {
            Target::Unpack { targets, .. } => self.assign_row(targets, &item, scope),
            other => self.assign(other, item, scope),
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn lookup(&self, name: &str, scope: &Rc<Scope>) -> Result<Value> {
        scope
            .get(name)
            .or_else(|| self.builtins.get(name).cloned())
            .ok_or_else(|| SandboxError::name_error(name))
    }

    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value> {
        match &expr.kind {
            ExprKind::Constant(constant) => Ok(constant_value(constant)),
            ExprKind::FString(parts) => Ok(Value::from(self.eval_fstring(parts, scope)?)),
            ExprKind::Name(name) => self.lookup(name, scope),
            ExprKind::List(items) => Ok(Value::list(self.eval_elements(items, scope)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_elements(items, scope)?)),
            ExprKind::Set(items) => Ok(Value::set(set_from(self.eval_elements(items, scope)?)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::new();
                for (key, value) in entries {
                    match key {
                        Some(key) => {
                            let key = self.eval(key, scope)?;
                            let value = self.eval(value, scope)?;
                            dict.insert(key, value)?;
                        }
                        None => {
                            let Value::Dict(other) = self.eval(value, scope)? else {
                                return Err(SandboxError::type_error(
                                    "'**' argument must be a mapping",
                                ));
                            };
                            for (_, (k, v)) in other.borrow().entries.iter() {
                                dict.insert(k.clone(), v.clone())?;
                            }
                        }
                    }
                }
                Ok(Value::dict(dict))
            }
            ExprKind::Starred(_) => Err(SandboxError::exception(
                "SyntaxError",
                "can't use starred expression here",
            )),
            ExprKind::BinOp { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                ops::binary(*op, &left, &right)
            }
            ExprKind::UnaryOp { op, operand } => {
                let value = self.eval(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    _ => ops::unary(*op, &value),
                }
            }
            ExprKind::BoolOp { op, values } => {
                let mut result = Value::None;
                for (i, expr) in values.iter().enumerate() {
                    result = self.eval(expr, scope)?;
                    let last = i + 1 == values.len();
                    let decided = match op {
                        BoolOp::And => !result.truthy(),
                        BoolOp::Or => result.truthy(),
                    };
                    if decided || last {
                        break;
                    }
                }
                Ok(result)
            }
            ExprKind::Compare { left, ops: comparisons } => {
                let mut left = self.eval(left, scope)?;
                for (op, right) in comparisons {
                    let right = self.eval(right, scope)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::Lambda { params, body } => {
                self.make_function("<lambda>", params, FunctionBody::Lambda(Rc::clone(body)), scope)
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                let func = self.eval(func, scope)?;
                let positional = self.eval_elements(args, scope)?;
                let mut kwargs = Vec::with_capacity(keywords.len());
                for keyword in keywords {
                    let value = self.eval(&keyword.value, scope)?;
                    match &keyword.name {
                        Some(name) => kwargs.push((name.clone(), value)),
                        None => {
                            let Value::Dict(mapping) = value else {
                                return Err(SandboxError::type_error(format!(
                                    "argument after ** must be a mapping, not {}",
                                    value.type_name()
                                )));
                            };
                            for (_, (k, v)) in mapping.borrow().entries.iter() {
                                let Value::Str(k) = k else {
                                    return Err(SandboxError::type_error("keywords must be strings"));
                                };
                                kwargs.push((k.to_string(), v.clone()));
                            }
                        }
                    }
                }
                self.call_value(&func, CallArgs::with_keywords(positional, kwargs))
            }
            ExprKind::Slice { lower, upper, step } => {
                let mut bound = |part: &Option<Box<Expr>>| -> Result<Option<i64>> {
                    match part {
                        None => Ok(None),
                        Some(expr) => match self.eval(expr, scope)? {
                            Value::None => Ok(None),
                            Value::Int(i) => Ok(Some(i)),
                            Value::Bool(b) => Ok(Some(i64::from(b))),
                            _ => Err(SandboxError::type_error(
                                "slice indices must be integers or None",
                            )),
                        },
                    }
                };
                Ok(Value::Slice(SliceValue {
                    lower: bound(lower)?,
                    upper: bound(upper)?,
                    step: bound(step)?,
                }))
            }
            ExprKind::Comprehension {
                kind,
                element,
                value,
                generators,
            } => {
                let inner = self.child_scope(scope);
                let mut collected = match kind {
                    ComprehensionKind::Dict => Collected::Dict(Dict::new()),
                    _ => Collected::Items(Vec::new()),
                };
                self.comprehend(generators, element, value.as_deref(), &inner, &mut collected)?;
                Ok(match (kind, collected) {
                    (_, Collected::Dict(dict)) => Value::dict(dict),
                    (ComprehensionKind::Set, Collected::Items(items)) => {
                        Value::set(set_from(items)?)
                    }
                    (_, Collected::Items(items)) => Value::list(items),
                })
            }
            ExprKind::GetAttr { value, attr } => {
                let obj = self.eval(value, scope)?;
                self.get_attr(&obj, attr)
            }
            ExprKind::GetItem { value, index } => {
                let obj = self.eval(value, scope)?;
                let index = self.eval(index, scope)?;
                self.get_item(&obj, &index)
            }
            ExprKind::PrintFunction => self
                .globals
                .get("_print_")
                .ok_or_else(|| SandboxError::Internal("guard hook _print_ is not installed".into())),
            ExprKind::Printed => Ok(Value::from(self.guards.printed())),
            ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Err(SandboxError::Internal(
                "unguarded access reached the interpreter".into(),
            )),
        }
    }

    fn eval_elements(&mut self, items: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match &item.kind {
                ExprKind::Starred(inner) => {
                    let value = self.eval(inner, scope)?;
                    let iterable = self.call_hook("_getiter_", vec![value])?;
                    out.extend(ops::iterate(&iterable)?);
                }
                _ => out.push(self.eval(item, scope)?),
            }
        }
        Ok(out)
    }

    fn eval_fstring(&mut self, parts: &[FStringPart], scope: &Rc<Scope>) -> Result<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field {
                    value,
                    conversion,
                    spec,
                } => {
                    let mut value = self.eval(value, scope)?;
                    if let Some(conversion) = conversion {
                        value = format::convert(&value, *conversion)?;
                    }
                    let spec = self.eval_fstring(spec, scope)?;
                    out.push_str(&format::format_value(&value, &spec)?);
                }
            }
        }
        Ok(out)
    }

    fn comprehend(
        &mut self,
        generators: &[Generator],
        element: &Expr,
        value: Option<&Expr>,
        scope: &Rc<Scope>,
        collected: &mut Collected,
    ) -> Result<()> {
        let Some((first, rest)) = generators.split_first() else {
            match collected {
                Collected::Items(items) => {
                    if items.len() >= ops::MAX_SEQUENCE_LEN {
                        return Err(SandboxError::exception("MemoryError", "comprehension too large"));
                    }
                    items.push(self.eval(element, scope)?);
                }
                Collected::Dict(dict) => {
                    let key = self.eval(element, scope)?;
                    let value = value.ok_or_else(|| {
                        SandboxError::Internal("dict comprehension without a value".into())
                    })?;
                    let value = self.eval(value, scope)?;
                    dict.insert(key, value)?;
                }
            }
            return Ok(());
        };
        let iterable = self.eval(&first.iter, scope)?;
        'items: for item in self.loop_items(&first.target, iterable)? {
            self.bind_loop_target(&first.target, item, scope)?;
            for condition in &first.conditions {
                if !self.eval(condition, scope)?.truthy() {
                    continue 'items;
                }
            }
            self.comprehend(rest, element, value, scope, collected)?;
        }
        Ok(())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.globals.clear();
        self.modules.clear();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn star_index(starred: Option<usize>) -> Value {
    starred.map_or(Value::None, |i| Value::Int(i as i64))
}

fn constant_value(constant: &crate::ast::Constant) -> Value {
    use crate::ast::Constant;
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::Str(Rc::clone(s)),
    }
}

/// The exception a `raise` operand stands for.
fn exception_from(value: &Value) -> Result<ScriptException> {
    match value {
        Value::Exception(exc) => Ok((**exc).clone()),
        Value::Type(TypeKind::Exception(kind)) => Ok(ScriptException::new(kind.as_ref(), "")),
        _ => Err(SandboxError::type_error(
            "exceptions must derive from BaseException",
        )),
    }
}

/// Whether an `except` clause operand matches an exception kind.
fn exception_matches(kind: &str, clause: &Value) -> Result<bool> {
    match clause {
        Value::Type(TypeKind::Exception(base)) => Ok(is_subclass(kind, base)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(kind, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(SandboxError::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn name_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{n}'")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Bind call arguments to a function's parameters in `scope`.
fn bind_arguments(function: &Function, args: CallArgs, scope: &Scope) -> Result<()> {
    let params = &function.params;
    let name = &function.name;
    let CallArgs {
        positional,
        keywords,
    } = args;

    let n_params = params.positional.len();
    let mut bound: Vec<Option<Value>> = vec![None; n_params];
    let mut extra = Vec::new();
    for (i, value) in positional.into_iter().enumerate() {
        if i < n_params {
            bound[i] = Some(value);
        } else {
            extra.push(value);
        }
    }
    if !extra.is_empty() && params.vararg.is_none() {
        let given = n_params + extra.len();
        return Err(SandboxError::type_error(format!(
            "{name}() takes {n_params} positional argument{} but {given} {} given",
            if n_params == 1 { "" } else { "s" },
            if given == 1 { "was" } else { "were" }
        )));
    }

    let mut kwonly: Vec<Option<Value>> = vec![None; params.kwonly.len()];
    let mut kwargs = Dict::new();
    for (key, value) in keywords {
        if let Some(i) = params.positional.iter().position(|p| p.name == key) {
            if bound[i].is_some() {
                return Err(SandboxError::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            bound[i] = Some(value);
        } else if let Some(i) = params.kwonly.iter().position(|p| p.name == key) {
            kwonly[i] = Some(value);
        } else if params.kwarg.is_some() {
            kwargs.insert(Value::from(key), value)?;
        } else {
            return Err(SandboxError::type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
    }

    let mut missing = Vec::new();
    for (i, slot) in bound.into_iter().enumerate() {
        let param = &params.positional[i];
        match slot.or_else(|| function.defaults.get(i).cloned().flatten()) {
            Some(value) => scope.set(&param.name, value),
            None => missing.push(param.name.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(SandboxError::type_error(format!(
            "{name}() missing {} required positional argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            name_list(&missing)
        )));
    }

    for (i, slot) in kwonly.into_iter().enumerate() {
        let param = &params.kwonly[i];
        match slot.or_else(|| function.kw_defaults.get(i).cloned().flatten()) {
            Some(value) => scope.set(&param.name, value),
            None => missing.push(param.name.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(SandboxError::type_error(format!(
            "{name}() missing {} required keyword-only argument{}: {}",
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            name_list(&missing)
        )));
    }

    if let Some(vararg) = &params.vararg {
        scope.set(vararg, Value::tuple(extra));
    }
    if let Some(kwarg) = &params.kwarg {
        scope.set(kwarg, Value::dict(kwargs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_shadow_and_declare_globals() {
        let globals = Scope::global();
        globals.set("x", Value::Int(1));
        let local = Scope::child(&globals);
        assert_eq!(local.get("x").map(|v| v.repr()), Some("1".into()));

        local.set("x", Value::Int(2));
        assert_eq!(globals.get("x").map(|v| v.repr()), Some("1".into()));

        local.declare_global("y");
        local.set("y", Value::Int(3));
        assert_eq!(globals.get("y").map(|v| v.repr()), Some("3".into()));
        assert!(local.remove("y"));
        assert!(globals.get("y").is_none());
    }

    #[test]
    fn nested_functions_release_their_scopes() {
        use crate::compiler::compile_restricted;
        use crate::config::SandboxConfig;
        use crate::host::InMemoryHost;

        let source = "def outer():\n    h = hass\n    def inner():\n        return h\n    return 1\n\nouter()\n";
        let program = compile_restricted(source).program.unwrap();
        let host: Arc<dyn Host> = Arc::new(InMemoryHost::new());
        let env = Environment::build(
            Arc::clone(&host),
            None,
            Rc::new(ScriptLogger::new(true)),
            &SandboxConfig::default(),
        )
        .unwrap();
        let globals = Rc::clone(&env.globals);
        let mut interp = Interpreter::new(env);
        interp.run(&program).unwrap();
        assert!(interp.scopes.is_empty());

        globals.clear();
        drop(interp);
        assert_eq!(Arc::strong_count(&host), 1);
    }

    #[test]
    fn exception_clause_matching() {
        let lookup = Value::Type(TypeKind::Exception(Rc::from("LookupError")));
        assert!(exception_matches("KeyError", &lookup).unwrap());
        assert!(!exception_matches("ValueError", &lookup).unwrap());
        let pair = Value::tuple(vec![
            Value::Type(TypeKind::Exception(Rc::from("ValueError"))),
            lookup,
        ]);
        assert!(exception_matches("ValueError", &pair).unwrap());
        assert!(exception_matches("ValueError", &Value::Int(1)).is_err());
    }

    #[test]
    fn missing_argument_names() {
        assert_eq!(name_list(&["a"]), "'a'");
        assert_eq!(name_list(&["a", "b", "c"]), "'a', 'b' and 'c'");
    }
}
