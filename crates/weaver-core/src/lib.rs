//! # Weaver Core
//!
//! Aspect-oriented proxy generation for Weave classes:
//! - Syntax tree definitions and the source printer
//! - Tokenizer and parser for Weave sources
//! - Source resolution and the parse cache
//! - The proxy rewriter and factory
//! - A runtime that activates generated classes and dispatches advice
//!
//! Given a class name, [`ProxyFactory`] parses the class source, rewrites the
//! tree into a subclass whose methods run the aspect hooks around a call to
//! the original, prints it and activates it.

#![warn(clippy::all)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod ast;
pub mod evaluator;
pub mod parser;
pub mod proxy;
pub mod source;

pub mod runtime;

// Re-export commonly used types
pub use ast::{ClassName, CodePrinter, InvalidClassName, StandardPrinter, SyntaxTree, ToSource};
pub use evaluator::{
    advice::{AdviceKind, AdviceRegistry, JoinPoint, Pointcut},
    EvaluatorError, Runtime, RuntimeClass, Value,
};
pub use parser::{create_parser, ParseError, Parser, WeaveParser};
pub use proxy::{
    ActivationError, ActivationRegistry, ActivationSink, AstParser, CollisionPolicy, IoMode,
    ProxyError, ProxyFactory, ProxyIdentity, ProxyOutput, ProxyPolicy, TypeHandle,
};
pub use runtime::Weaver;
pub use source::{
    BuiltinSourceResolver, FileSourceResolver, MemorySourceResolver, ResolverChain,
    SourceResolver, SourceUnit, ASPECT_CLASS, DEFAULT_EXTENSION,
};

/// Weaver version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "weaver_core=info";

/// Initialize tracing for Weaver components
pub fn init_tracing() {
    // RUST_LOG wins over the default directive
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    install_subscriber(filter);
}

/// Initialize tracing with an explicit filter directive, ignoring `RUST_LOG`
pub fn init_tracing_with(directive: &str) {
    install_subscriber(tracing_subscriber::EnvFilter::new(directive));
}

fn install_subscriber(filter: tracing_subscriber::EnvFilter) {
    // a subscriber installed by the host wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Weaver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaverConfig {
    /// Directories searched for `<package path>/<Short>.<ext>` files
    pub source_roots: Vec<PathBuf>,
    pub file_extension: String,
    pub io_mode: IoMode,
    /// Fully-qualified name of the aspect trait
    pub aspect_class: String,
    /// File replacing the aspect trait's source
    pub aspect_source: Option<PathBuf>,
    pub policy: ProxyPolicy,
    /// Maximum nested method calls in the runtime
    pub max_call_depth: usize,
    pub debug: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![PathBuf::from(".")],
            file_extension: DEFAULT_EXTENSION.to_string(),
            io_mode: IoMode::Blocking,
            aspect_class: ASPECT_CLASS.to_string(),
            aspect_source: None,
            policy: ProxyPolicy::default(),
            max_call_depth: evaluator::DEFAULT_MAX_DEPTH,
            debug: false,
        }
    }
}

impl WeaverConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Error types for Weaver operations
#[derive(thiserror::Error, Debug)]
pub enum WeaverError {
    /// Proxy generation failed
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    ClassName(#[from] InvalidClassName),

    /// A runtime call failed
    #[error("Evaluation error: {0:#}")]
    Evaluation(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Weaver operations
pub type Result<T> = std::result::Result<T, WeaverError>;
