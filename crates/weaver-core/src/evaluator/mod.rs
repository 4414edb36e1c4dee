// Tree-walking interpreter for Weave classes
//
// `Runtime` is the activation sink proxies are defined into. Parents that are
// not defined yet are autoloaded through the shared `AstParser`.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info};

use crate::{
    ast::{
        BinaryOp, Block, ClassName, Declaration, Expr, LValue, Member, MethodNode, PropertyDecl,
        Stmt, SyntaxTree, UnaryOp, CONSTRUCTOR, SELF_CLASS,
    },
    parser::{Parser, WeaveParser},
    proxy::{ActivationError, ActivationSink, AstParser, TypeHandle},
};

pub mod advice;
mod builtins;
pub mod class;
pub mod errors;
pub mod value;


pub use advice::{AdviceKind, AdviceRegistry, JoinPoint, Pointcut};
pub use class::RuntimeClass;
pub use errors::EvaluatorError;
pub use value::{Instance, ObjectRef, Value};

/// Default limit on nested method calls
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Control flow result for handling break/continue/return
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    None,
    Break,
    Continue,
    Return(Value),
}

impl ControlFlow {
    fn into_value(self) -> Result<Value> {
        match self {
            ControlFlow::None => Ok(Value::Null),
            ControlFlow::Return(value) => Ok(value),
            ControlFlow::Break => Err(anyhow!("Unexpected break outside of loop")),
            ControlFlow::Continue => Err(anyhow!("Unexpected continue outside of loop")),
        }
    }
}

/// Execution state of one method activation
struct Frame {
    this: Option<ObjectRef>,
    /// Class whose source the running code belongs to
    class: Arc<RuntimeClass>,
    locals: HashMap<String, Value>,
    depth: usize,
}

impl Frame {
    fn this(&self) -> Result<&ObjectRef> {
        self.this
            .as_ref()
            .ok_or_else(|| EvaluatorError::invalid("'self' used outside an instance method").into())
    }
}

// Why a class could not be loaded
enum LoadFailure {
    Missing(String),
    Invalid(ActivationError),
}

/// Class table plus interpreter
pub struct Runtime {
    classes: DashMap<ClassName, Arc<RuntimeClass>>,
    loader: RwLock<Option<Arc<AstParser>>>,
    advice: Arc<AdviceRegistry>,
    // Serializes autoloading; the set holds units being loaded on this path
    loading: ReentrantMutex<RefCell<HashSet<ClassName>>>,
    output: Mutex<Vec<String>>,
    max_depth: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            classes: DashMap::new(),
            loader: RwLock::new(None),
            advice: Arc::new(AdviceRegistry::new()),
            loading: ReentrantMutex::new(RefCell::new(HashSet::new())),
            output: Mutex::new(Vec::new()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_loader(self, loader: Arc<AstParser>) -> Self {
        self.set_loader(loader);
        self
    }

    pub fn with_advice(mut self, advice: Arc<AdviceRegistry>) -> Self {
        self.advice = advice;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn set_loader(&self, loader: Arc<AstParser>) {
        *self.loader.write() = Some(loader);
    }

    pub fn advice(&self) -> &Arc<AdviceRegistry> {
        &self.advice
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn class(&self, name: &ClassName) -> Option<Arc<RuntimeClass>> {
        self.classes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Names of every defined class, sorted
    pub fn class_names(&self) -> Vec<ClassName> {
        let mut names: Vec<_> = self.classes.iter().map(|e| e.key().clone()).collect();
        names.sort_by(|a, b| a.key().cmp(b.key()));
        names
    }

    /// Lines written by `print`, drained
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }

    pub(crate) fn emit(&self, line: String) {
        debug!("print: {}", line);
        self.output.lock().push(line);
    }

    // ---- definition ----

    /// Define every declaration of a parsed unit.
    ///
    /// Nothing is registered unless every declaration is valid. Parents
    /// outside the unit are autoloaded first.
    pub fn define_tree(&self, tree: &SyntaxTree) -> Result<Vec<TypeHandle>, ActivationError> {
        if tree.declarations.is_empty() {
            return Err(ActivationError::InvalidSource(
                "unit declares nothing".to_string(),
            ));
        }

        let mut names = Vec::with_capacity(tree.declarations.len());
        for decl in &tree.declarations {
            let name = tree
                .qualified_name(decl.name())
                .map_err(|e| ActivationError::InvalidSource(e.to_string()))?;
            if names.contains(&name) || self.classes.contains_key(&name) {
                return Err(ActivationError::Duplicate(name.to_string()));
            }
            names.push(name);
        }

        let mut built: HashMap<ClassName, Arc<RuntimeClass>> = HashMap::new();
        for index in 0..tree.declarations.len() {
            self.build(tree, &names, index, &mut built, &mut Vec::new())?;
        }

        // Re-check under the map's own locking in case another thread won
        if let Some(taken) = names.iter().find(|name| self.classes.contains_key(*name)) {
            return Err(ActivationError::Duplicate(taken.to_string()));
        }
        let mut handles = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(class) = built.remove(name) {
                handles.push(class.handle());
                info!("Defined class {}", name);
                self.classes.insert(name.clone(), class);
            }
        }
        Ok(handles)
    }

    fn build(
        &self,
        tree: &SyntaxTree,
        names: &[ClassName],
        index: usize,
        built: &mut HashMap<ClassName, Arc<RuntimeClass>>,
        stack: &mut Vec<usize>,
    ) -> Result<Arc<RuntimeClass>, ActivationError> {
        let name = &names[index];
        if let Some(class) = built.get(name) {
            return Ok(Arc::clone(class));
        }
        if stack.contains(&index) {
            return Err(ActivationError::InvalidSource(format!(
                "inheritance cycle through '{name}'"
            )));
        }
        stack.push(index);

        let decl = &tree.declarations[index];
        let (is_trait, is_final, extends) = match decl {
            Declaration::Class(class) => (false, class.is_final, class.extends.as_deref()),
            Declaration::Trait(_) => (true, false, None),
        };

        let parent = match extends {
            None => None,
            Some(reference) => {
                let parent_name = self.parent_name(tree, name, reference)?;
                let parent = match names.iter().position(|n| *n == parent_name) {
                    Some(local) => self.build(tree, names, local, built, stack)?,
                    None => self.load(&parent_name).map_err(|failure| match failure {
                        LoadFailure::Missing(_) => ActivationError::UnresolvedParent {
                            class: name.to_string(),
                            parent: parent_name.to_string(),
                        },
                        LoadFailure::Invalid(e) => e,
                    })?,
                };
                if parent.is_trait {
                    return Err(ActivationError::InvalidSource(format!(
                        "class '{name}' cannot extend trait '{}'",
                        parent.name
                    )));
                }
                if parent.is_final {
                    return Err(ActivationError::FinalParent {
                        class: name.to_string(),
                        parent: parent.name.to_string(),
                    });
                }
                Some(parent)
            }
        };

        let mut methods = IndexMap::new();
        let mut properties: Vec<PropertyDecl> = Vec::new();
        for member in decl.members() {
            match member {
                Member::Method(method) => {
                    if let Some((owner, inherited)) =
                        parent.as_ref().and_then(|p| p.find_method(&method.name))
                    {
                        if inherited.modifiers.is_final {
                            debug!("{} overrides final {}::{}", name, owner.name, method.name);
                            return Err(ActivationError::FinalOverride {
                                class: name.to_string(),
                                method: method.name.clone(),
                            });
                        }
                    }
                    if methods
                        .insert(method.name.clone(), Arc::new(method.clone()))
                        .is_some()
                    {
                        return Err(ActivationError::InvalidSource(format!(
                            "method '{}' declared twice in '{name}'",
                            method.name
                        )));
                    }
                }
                Member::Property(property) => {
                    if properties.iter().any(|p| p.name == property.name) {
                        return Err(ActivationError::InvalidSource(format!(
                            "property '{}' declared twice in '{name}'",
                            property.name
                        )));
                    }
                    properties.push(property.clone());
                }
            }
        }

        let class = Arc::new(RuntimeClass {
            name: name.clone(),
            parent,
            is_final,
            is_trait,
            scope: SyntaxTree {
                package: tree.package.clone(),
                imports: tree.imports.clone(),
                declarations: Vec::new(),
            },
            methods,
            properties,
        });
        stack.pop();
        built.insert(name.clone(), Arc::clone(&class));
        Ok(class)
    }

    fn parent_name(
        &self,
        tree: &SyntaxTree,
        class: &ClassName,
        reference: &str,
    ) -> Result<ClassName, ActivationError> {
        if reference == SELF_CLASS {
            return Err(ActivationError::InvalidSource(format!(
                "class '{class}' cannot extend itself"
            )));
        }
        let resolved = tree.resolve_reference(reference);
        ClassName::parse(&resolved).map_err(|_| ActivationError::UnresolvedParent {
            class: class.to_string(),
            parent: resolved,
        })
    }

    /// A defined class, autoloading its unit when a loader is configured
    pub fn load_class(&self, name: &ClassName) -> Result<Arc<RuntimeClass>> {
        self.load(name).map_err(|failure| match failure {
            LoadFailure::Missing(reason) => anyhow!(EvaluatorError::ClassNotFound(name.to_string()))
                .context(reason),
            LoadFailure::Invalid(e) => e.into(),
        })
    }

    fn load(&self, name: &ClassName) -> Result<Arc<RuntimeClass>, LoadFailure> {
        if let Some(class) = self.class(name) {
            return Ok(class);
        }
        let Some(loader) = self.loader.read().clone() else {
            return Err(LoadFailure::Missing(format!("'{name}' is not defined")));
        };

        let guard = self.loading.lock();
        // another thread may have loaded it while we waited
        if let Some(class) = self.class(name) {
            return Ok(class);
        }
        if !guard.borrow_mut().insert(name.clone()) {
            return Err(LoadFailure::Invalid(ActivationError::InvalidSource(format!(
                "inheritance cycle through '{name}'"
            ))));
        }
        debug!("Autoloading {}", name);
        let defined = match loader.get_or_parse(name) {
            Ok(tree) => self.define_tree(&tree).map_err(LoadFailure::Invalid),
            Err(e) => Err(LoadFailure::Missing(e.to_string())),
        };
        guard.borrow_mut().remove(name);
        defined?;

        self.class(name).ok_or_else(|| {
            LoadFailure::Missing(format!("unit for '{name}' does not declare it"))
        })
    }

    // ---- objects and calls ----

    /// Create an instance: property defaults root first, then `init`
    pub fn instantiate(&self, class: &ClassName, args: Vec<Value>) -> Result<Value> {
        let class = self.load_class(class)?;
        self.construct(&class, args, 0)
    }

    fn construct(&self, class: &Arc<RuntimeClass>, args: Vec<Value>, depth: usize) -> Result<Value> {
        if class.is_trait {
            return Err(ActivationError::NotInstantiable(class.name.to_string()).into());
        }
        let object = ObjectRef::new(Arc::clone(class));
        for owner in class.lineage() {
            let mut frame = Frame {
                this: Some(object.clone()),
                class: Arc::clone(&owner),
                locals: HashMap::new(),
                depth,
            };
            for property in &owner.properties {
                let value = match &property.default {
                    Some(expr) => self.eval(expr, &mut frame)?,
                    None => Value::Null,
                };
                object.set(&property.name, value);
            }
        }
        match class.find_method(CONSTRUCTOR) {
            Some((owner, init)) => {
                self.invoke(&owner, &init, Some(object.clone()), args, depth)?;
            }
            None if !args.is_empty() => {
                return Err(EvaluatorError::arity(
                    &format!("{}::{}", class.name, CONSTRUCTOR),
                    0,
                    args.len(),
                )
                .into());
            }
            None => {}
        }
        Ok(Value::Object(object))
    }

    /// Call a public method from the host
    pub fn call_method(&self, target: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
        let object = target.as_object().ok_or_else(|| {
            EvaluatorError::unary_type_error("method call", "object", target.type_name())
        })?;
        let (owner, node) = object
            .class()
            .find_method(method)
            .ok_or_else(|| EvaluatorError::method_not_found(method, object.class().name.as_str()))?;
        if !RuntimeClass::is_public(&node) {
            return Err(EvaluatorError::invalid(format!(
                "method '{method}' of '{}' is not public",
                owner.name
            ))
            .into());
        }
        if node.modifiers.is_static {
            return Err(EvaluatorError::invalid(format!(
                "'{method}' is static; call it on the class"
            ))
            .into());
        }
        self.invoke(&owner, &node, Some(object.clone()), args, 0)
    }

    /// Call a public static method from the host
    pub fn call_static(&self, class: &ClassName, method: &str, args: Vec<Value>) -> Result<Value> {
        let class = self.load_class(class)?;
        let (owner, node) = class
            .find_method(method)
            .ok_or_else(|| EvaluatorError::method_not_found(method, class.name.as_str()))?;
        if !RuntimeClass::is_public(&node) || !node.modifiers.is_static {
            return Err(EvaluatorError::invalid(format!(
                "'{method}' of '{}' is not a public static method",
                owner.name
            ))
            .into());
        }
        self.invoke(&owner, &node, None, args, 0)
    }

    fn invoke(
        &self,
        class: &Arc<RuntimeClass>,
        method: &MethodNode,
        this: Option<ObjectRef>,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value> {
        let depth = depth + 1;
        if depth > self.max_depth {
            return Err(EvaluatorError::StackOverflow(self.max_depth).into());
        }

        let required = method.params.iter().filter(|p| p.default.is_none()).count();
        let total = method.params.len();
        if args.len() < required || args.len() > total {
            let expected = if required == total {
                total.to_string()
            } else {
                format!("{required} to {total}")
            };
            return Err(EvaluatorError::arity(
                &format!("{}::{}", class.name, method.name),
                expected,
                args.len(),
            )
            .into());
        }

        let mut frame = Frame {
            this,
            class: Arc::clone(class),
            locals: HashMap::with_capacity(total),
            depth,
        };
        let mut args = args.into_iter();
        for param in &method.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval(default, &mut frame)?,
                (None, None) => Value::Null,
            };
            frame.locals.insert(param.name.clone(), value);
        }

        self.exec_block(&method.body, &mut frame)?.into_value()
    }

    // ---- statements ----

    fn exec_block(&self, block: &Block, frame: &mut Frame) -> Result<ControlFlow> {
        for stmt in &block.0 {
            match self.exec_stmt(stmt, frame)? {
                ControlFlow::None => {}
                flow => return Ok(flow),
            }
        }
        Ok(ControlFlow::None)
    }

    fn exec_stmt(&self, stmt: &Stmt, frame: &mut Frame) -> Result<ControlFlow> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.eval(value, frame)?;
                frame.locals.insert(name.clone(), value);
                Ok(ControlFlow::None)
            }
            Stmt::Assign { target, value } => {
                let value = self.eval(value, frame)?;
                self.assign(target, value, frame)?;
                Ok(ControlFlow::None)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
                Ok(ControlFlow::None)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, frame)?,
                    None => Value::Null,
                };
                Ok(ControlFlow::Return(value))
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition, frame)?.is_truthy() {
                    self.exec_block(then_branch, frame)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch, frame)
                } else {
                    Ok(ControlFlow::None)
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, frame)?.is_truthy() {
                    match self.exec_block(body, frame)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::None | ControlFlow::Continue => {}
                    }
                }
                Ok(ControlFlow::None)
            }
            Stmt::For {
                variable,
                iterable,
                body,
            } => {
                let items = match self.eval(iterable, frame)? {
                    Value::List(items) => items,
                    Value::Map(map) => map.into_keys().map(Value::String).collect(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    other => {
                        return Err(EvaluatorError::unary_type_error(
                            "for",
                            "list, map or string",
                            other.type_name(),
                        )
                        .into())
                    }
                };
                for item in items {
                    frame.locals.insert(variable.clone(), item);
                    match self.exec_block(body, frame)? {
                        ControlFlow::Break => break,
                        ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                        ControlFlow::None | ControlFlow::Continue => {}
                    }
                }
                Ok(ControlFlow::None)
            }
            Stmt::Break => Ok(ControlFlow::Break),
            Stmt::Continue => Ok(ControlFlow::Continue),
        }
    }

    fn assign(&self, target: &LValue, value: Value, frame: &mut Frame) -> Result<()> {
        match target {
            LValue::Variable(name) => match frame.locals.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(EvaluatorError::variable_not_found(name).into()),
            },
            LValue::Property { object, name } => match self.eval(object, frame)? {
                Value::Object(obj) => {
                    obj.set(name, value);
                    Ok(())
                }
                Value::Map(mut map) => {
                    map.insert(name.clone(), value);
                    self.write_back(object, Value::Map(map), frame)
                }
                other => Err(EvaluatorError::unary_type_error(
                    "property assignment",
                    "object or map",
                    other.type_name(),
                )
                .into()),
            },
            LValue::Index { object, index } => {
                let index = self.eval(index, frame)?;
                let updated = match (self.eval(object, frame)?, index) {
                    (Value::List(mut items), Value::Integer(i)) => {
                        let len = items.len();
                        let slot = usize::try_from(i)
                            .ok()
                            .and_then(|i| items.get_mut(i))
                            .ok_or(EvaluatorError::IndexOutOfBounds { index: i, len })?;
                        *slot = value;
                        Value::List(items)
                    }
                    (Value::Map(mut map), Value::String(key)) => {
                        map.insert(key, value);
                        Value::Map(map)
                    }
                    (container, index) => {
                        return Err(EvaluatorError::binary_type_error(
                            "index-assign",
                            container.type_name(),
                            index.type_name(),
                        )
                        .into())
                    }
                };
                self.write_back(object, updated, frame)
            }
        }
    }

    // Collections are values; store the updated copy where it came from
    fn write_back(&self, source: &Expr, updated: Value, frame: &mut Frame) -> Result<()> {
        let target = LValue::from_expr(source.clone())
            .ok_or_else(|| EvaluatorError::invalid("cannot assign into a temporary value"))?;
        self.assign(&target, updated, frame)
    }

    // ---- expressions ----

    fn eval(&self, expr: &Expr, frame: &mut Frame) -> Result<Value> {
        match expr {
            Expr::Int(i) => Ok(Value::Integer(*i)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Boolean(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Variable(name) => frame
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluatorError::variable_not_found(name).into()),
            Expr::SelfRef => Ok(Value::Object(frame.this()?.clone())),
            Expr::List(items) => Ok(Value::List(self.eval_all(items, frame)?)),
            Expr::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval(value, frame)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, frame),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, frame)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Boolean(!value.is_truthy())),
                    (UnaryOp::Negate, Value::Integer(i)) => i
                        .checked_neg()
                        .map(Value::Integer)
                        .ok_or_else(|| EvaluatorError::Overflow("negation".to_string()).into()),
                    (UnaryOp::Negate, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Negate, other) => Err(EvaluatorError::unary_type_error(
                        "negation",
                        "number",
                        other.type_name(),
                    )
                    .into()),
                }
            }
            Expr::Property { object, name } => match self.eval(object, frame)? {
                Value::Object(obj) => obj.get(name).ok_or_else(|| {
                    EvaluatorError::property_not_found(name, obj.class().name.as_str()).into()
                }),
                Value::Map(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
                other => Err(EvaluatorError::unary_type_error(
                    "property access",
                    "object or map",
                    other.type_name(),
                )
                .into()),
            },
            Expr::Index { object, index } => {
                let container = self.eval(object, frame)?;
                let index = self.eval(index, frame)?;
                index_value(container, index)
            }
            Expr::MethodCall {
                object,
                method,
                args,
            } => {
                let target = self.eval(object, frame)?;
                let args = self.eval_all(args, frame)?;
                let object = target.as_object().ok_or_else(|| {
                    EvaluatorError::unary_type_error("method call", "object", target.type_name())
                })?;
                let (owner, node) = object.class().find_method(method).ok_or_else(|| {
                    EvaluatorError::method_not_found(method, object.class().name.as_str())
                })?;
                self.invoke(&owner, &node, Some(object.clone()), args, frame.depth)
            }
            Expr::SuperCall { method, args } => {
                let this = frame.this()?.clone();
                let parent = frame.class.parent.clone().ok_or_else(|| {
                    EvaluatorError::invalid(format!("'{}' has no parent class", frame.class.name))
                })?;
                let (owner, node) = parent
                    .find_method(method)
                    .ok_or_else(|| EvaluatorError::method_not_found(method, parent.name.as_str()))?;
                let args = self.eval_all(args, frame)?;
                self.invoke(&owner, &node, Some(this), args, frame.depth)
            }
            Expr::StaticCall {
                class,
                method,
                args,
            } => {
                let class = self.resolve_class(class, frame)?;
                let (owner, node) = class
                    .find_method(method)
                    .ok_or_else(|| EvaluatorError::method_not_found(method, class.name.as_str()))?;
                if !node.modifiers.is_static {
                    return Err(EvaluatorError::invalid(format!(
                        "'{}::{method}' is not static",
                        owner.name
                    ))
                    .into());
                }
                let args = self.eval_all(args, frame)?;
                self.invoke(&owner, &node, None, args, frame.depth)
            }
            Expr::FunctionCall { name, args } => {
                let args = self.eval_all(args, frame)?;
                builtins::call(self, name, args)
            }
            Expr::New { class, args } => {
                let class = self.resolve_class(class, frame)?;
                let args = self.eval_all(args, frame)?;
                self.construct(&class, args, frame.depth)
            }
        }
    }

    fn eval_all(&self, exprs: &[Expr], frame: &mut Frame) -> Result<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr, frame)).collect()
    }

    fn resolve_class(&self, reference: &str, frame: &Frame) -> Result<Arc<RuntimeClass>> {
        if reference == SELF_CLASS {
            return Ok(Arc::clone(&frame.class));
        }
        let resolved = frame.class.scope.resolve_reference(reference);
        let name = ClassName::parse(&resolved)
            .map_err(|_| EvaluatorError::ClassNotFound(resolved.clone()))?;
        self.load_class(&name)
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, frame: &mut Frame) -> Result<Value> {
        match op {
            BinaryOp::And => {
                let left = self.eval(left, frame)?;
                if !left.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval(right, frame)?.is_truthy()))
            }
            BinaryOp::Or => {
                let left = self.eval(left, frame)?;
                if left.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval(right, frame)?.is_truthy()))
            }
            _ => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                binary_values(op, left, right)
            }
        }
    }
}

fn index_value(container: Value, index: Value) -> Result<Value> {
    match (container, index) {
        (Value::List(items), Value::Integer(i)) => usize::try_from(i)
            .ok()
            .and_then(|idx| items.get(idx).cloned())
            .ok_or_else(|| EvaluatorError::IndexOutOfBounds { index: i, len: items.len() }.into()),
        (Value::String(s), Value::Integer(i)) => usize::try_from(i)
            .ok()
            .and_then(|idx| s.chars().nth(idx))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| {
                EvaluatorError::IndexOutOfBounds {
                    index: i,
                    len: s.chars().count(),
                }
                .into()
            }),
        (Value::Map(map), Value::String(key)) => Ok(map.get(&key).cloned().unwrap_or(Value::Null)),
        (container, index) => Err(EvaluatorError::binary_type_error(
            "index",
            container.type_name(),
            index.type_name(),
        )
        .into()),
    }
}

/// Numeric equality crosses integer and float
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Float(r)) | (Value::Float(r), Value::Integer(l)) => {
            (*l as f64) == *r
        }
        _ => left == right,
    }
}

fn numeric<I, F>(op: &str, left: &Value, right: &Value, int_op: I, float_op: F) -> Result<Value>
where
    I: Fn(i64, i64) -> Option<i64>,
    F: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => int_op(*l, *r)
            .map(Value::Integer)
            .ok_or_else(|| EvaluatorError::Overflow(op.to_string()).into()),
        (Value::Float(l), Value::Float(r)) => Ok(Value::Float(float_op(*l, *r))),
        (Value::Integer(l), Value::Float(r)) => Ok(Value::Float(float_op(*l as f64, *r))),
        (Value::Float(l), Value::Integer(r)) => Ok(Value::Float(float_op(*l, *r as f64))),
        _ => Err(EvaluatorError::binary_type_error(op, left.type_name(), right.type_name()).into()),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Float(l), Value::Float(r)) => l.partial_cmp(r),
        (Value::Integer(l), Value::Float(r)) => (*l as f64).partial_cmp(r),
        (Value::Float(l), Value::Integer(r)) => l.partial_cmp(&(*r as f64)),
        _ => {
            return Err(EvaluatorError::binary_type_error(
                "compare",
                left.type_name(),
                right.type_name(),
            )
            .into())
        }
    };
    // NaN compares false every way
    let result = ordering.is_some_and(|ordering| match op {
        BinaryOp::LessThan => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    });
    Ok(Value::Boolean(result))
}

fn binary_values(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(l), Value::String(r)) => Ok(Value::String(l + &r)),
            (Value::List(mut l), Value::List(r)) => {
                l.extend(r);
                Ok(Value::List(l))
            }
            (left, right) => numeric("add", &left, &right, i64::checked_add, |a, b| a + b),
        },
        BinaryOp::Subtract => numeric("subtract", &left, &right, i64::checked_sub, |a, b| a - b),
        BinaryOp::Multiply => numeric("multiply", &left, &right, i64::checked_mul, |a, b| a * b),
        BinaryOp::Divide | BinaryOp::Modulo => {
            let zero = matches!(right, Value::Integer(0))
                || matches!(right, Value::Float(f) if f == 0.0);
            if zero {
                return Err(EvaluatorError::DivisionByZero.into());
            }
            if op == BinaryOp::Divide {
                numeric("divide", &left, &right, i64::checked_div, |a, b| a / b)
            } else {
                numeric("modulo", &left, &right, i64::checked_rem, |a, b| a % b)
            }
        }
        BinaryOp::Equal => Ok(Value::Boolean(values_equal(&left, &right))),
        BinaryOp::NotEqual => Ok(Value::Boolean(!values_equal(&left, &right))),
        BinaryOp::LessThan | BinaryOp::LessEqual | BinaryOp::GreaterThan | BinaryOp::GreaterEqual => {
            compare(op, &left, &right)
        }
        BinaryOp::And | BinaryOp::Or => {
            Ok(Value::Boolean(if op == BinaryOp::And {
                left.is_truthy() && right.is_truthy()
            } else {
                left.is_truthy() || right.is_truthy()
            }))
        }
    }
}

impl ActivationSink for Runtime {
    fn define(&self, source: &str) -> Result<TypeHandle, ActivationError> {
        let tree = WeaveParser::new()
            .parse(source)
            .map_err(|e| ActivationError::InvalidSource(e.to_string()))?;
        let mut handles = self.define_tree(&tree)?;
        let first_class = tree
            .declarations
            .iter()
            .position(|decl| matches!(decl, Declaration::Class(_)))
            .unwrap_or(0);
        if first_class < handles.len() {
            Ok(handles.swap_remove(first_class))
        } else {
            Err(ActivationError::InvalidSource(
                "unit declares nothing".to_string(),
            ))
        }
    }

    fn is_defined(&self, class: &ClassName) -> bool {
        self.classes.contains_key(class)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("classes", &self.classes.len())
            .field("advice", &self.advice.len())
            .field("autoload", &self.loader.read().is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
