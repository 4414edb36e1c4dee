// Host-side advice, dispatched by the `advise` builtin the aspect hooks call
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::Result;
use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;

use super::{errors::EvaluatorError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceKind {
    Before,
    After,
}

impl AdviceKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "before" => Some(AdviceKind::Before),
            "after" => Some(AdviceKind::After),
            _ => None,
        }
    }
}

/// One intercepted call on a proxy
#[derive(Debug, Clone, PartialEq)]
pub struct JoinPoint {
    /// Original class, fully qualified
    pub class: String,
    pub method: String,
    pub args: Vec<Value>,
}

impl JoinPoint {
    /// Read a join point back from the context map a wrapper builds
    pub fn from_context(ctx: &Value) -> Result<Self, EvaluatorError> {
        let Value::Map(map) = ctx else {
            return Err(EvaluatorError::unary_type_error(
                "advise",
                "context map",
                ctx.type_name(),
            ));
        };
        let field = |key: &str| match map.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(EvaluatorError::invalid(format!(
                "advice context is missing string field '{key}'"
            ))),
        };
        let args = match map.get("args") {
            Some(Value::List(args)) => args.clone(),
            None => Vec::new(),
            Some(other) => {
                return Err(EvaluatorError::unary_type_error(
                    "advise",
                    "args list",
                    other.type_name(),
                ))
            }
        };
        Ok(Self {
            class: field("class")?,
            method: field("method")?,
            args,
        })
    }
}

/// Class and method glob patterns (`*` any run, `?` one character).
/// Class patterns match case-insensitively, like class names.
#[derive(Clone)]
pub struct Pointcut {
    class_pattern: String,
    method_pattern: String,
    class_regex: Regex,
    method_regex: Regex,
}

fn glob_to_regex(glob: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut pattern = String::from(if case_insensitive { "(?i)^" } else { "^" });
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

impl Pointcut {
    pub fn new(class_pattern: &str, method_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            class_pattern: class_pattern.to_string(),
            method_pattern: method_pattern.to_string(),
            class_regex: glob_to_regex(class_pattern, true)?,
            method_regex: glob_to_regex(method_pattern, false)?,
        })
    }

    /// Every join point
    pub fn any() -> Self {
        Self {
            class_pattern: "*".to_string(),
            method_pattern: "*".to_string(),
            class_regex: Regex::new(".*").unwrap_or_else(|_| unreachable!()),
            method_regex: Regex::new(".*").unwrap_or_else(|_| unreachable!()),
        }
    }

    pub fn matches(&self, join_point: &JoinPoint) -> bool {
        self.class_regex.is_match(&join_point.class) && self.method_regex.is_match(&join_point.method)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointcut({}::{})", self.class_pattern, self.method_pattern)
    }
}

/// Before advice sees the join point; an error aborts the call
pub type BeforeCallback = Arc<dyn Fn(&JoinPoint) -> Result<()> + Send + Sync>;
/// After advice sees the current result and may replace it
pub type AfterCallback = Arc<dyn Fn(&JoinPoint, &Value) -> Result<Option<Value>> + Send + Sync>;

#[derive(Clone)]
enum Callback {
    Before(BeforeCallback),
    After(AfterCallback),
}

#[derive(Clone)]
struct Advice {
    id: u64,
    pointcut: Pointcut,
    /// Higher runs earlier
    priority: i32,
    callback: Callback,
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.callback {
            Callback::Before(_) => "before",
            Callback::After(_) => "after",
        };
        f.debug_struct("Advice")
            .field("id", &self.id)
            .field("kind", &kind)
            .field("pointcut", &self.pointcut)
            .field("priority", &self.priority)
            .field("callback", &"<function>")
            .finish()
    }
}

/// Registered advice, ordered by priority then registration
#[derive(Debug, Default)]
pub struct AdviceRegistry {
    advice: RwLock<Vec<Advice>>,
    next_id: AtomicU64,
}

impl AdviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, pointcut: Pointcut, priority: i32, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut advice = self.advice.write();
        advice.push(Advice {
            id,
            pointcut,
            priority,
            callback,
        });
        // stable sort keeps registration order within a priority
        advice.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    pub fn before<F>(&self, pointcut: Pointcut, priority: i32, callback: F) -> u64
    where
        F: Fn(&JoinPoint) -> Result<()> + Send + Sync + 'static,
    {
        self.register(pointcut, priority, Callback::Before(Arc::new(callback)))
    }

    pub fn after<F>(&self, pointcut: Pointcut, priority: i32, callback: F) -> u64
    where
        F: Fn(&JoinPoint, &Value) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        self.register(pointcut, priority, Callback::After(Arc::new(callback)))
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut advice = self.advice.write();
        let before = advice.len();
        advice.retain(|a| a.id != id);
        advice.len() != before
    }

    pub fn clear(&self) {
        self.advice.write().clear();
    }

    pub fn len(&self) -> usize {
        self.advice.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.advice.read().is_empty()
    }

    // Snapshot so callbacks can register or remove advice without deadlocking
    fn matching(&self, join_point: &JoinPoint) -> Vec<Advice> {
        self.advice
            .read()
            .iter()
            .filter(|a| a.pointcut.matches(join_point))
            .cloned()
            .collect()
    }

    pub fn run_before(&self, join_point: &JoinPoint) -> Result<()> {
        for advice in self.matching(join_point) {
            if let Callback::Before(callback) = &advice.callback {
                debug!(
                    "before advice {} for {}::{}",
                    advice.id, join_point.class, join_point.method
                );
                callback(join_point)?;
            }
        }
        Ok(())
    }

    /// Thread the result through every matching after advice
    pub fn run_after(&self, join_point: &JoinPoint, result: Value) -> Result<Value> {
        let mut current = result;
        for advice in self.matching(join_point) {
            if let Callback::After(callback) = &advice.callback {
                debug!(
                    "after advice {} for {}::{}",
                    advice.id, join_point.class, join_point.method
                );
                if let Some(replacement) = callback(join_point, &current)? {
                    current = replacement;
                }
            }
        }
        Ok(current)
    }
}
