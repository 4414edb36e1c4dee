use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ProxyError;
use crate::{
    ast::{ClassName, SyntaxTree},
    parser::{ParseError, Parser, WeaveParser},
    source::{BuiltinSourceResolver, FileSourceResolver, ResolverChain, SourceResolver},
};

/// How `get_or_parse_async` reads file-backed sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Read inline with `std::fs`; required inside workers that forbid nested async I/O
    #[default]
    Blocking,
    /// Locate on tokio's blocking pool and read through `tokio::fs`, so file
    /// latency overlaps other tasks
    Async,
}

/// Parses class sources and caches the trees for the life of the parser.
///
/// The cache only grows. A class that fails to resolve or parse is not cached,
/// so the same error is reported again on the next request.
pub struct AstParser {
    resolver: Arc<dyn SourceResolver>,
    parser: Box<dyn Parser>,
    cache: DashMap<ClassName, Arc<SyntaxTree>>,
    io_mode: IoMode,
}

impl AstParser {
    pub fn new(resolver: Arc<dyn SourceResolver>, io_mode: IoMode) -> Self {
        Self {
            resolver,
            parser: Box::new(WeaveParser::new()),
            cache: DashMap::new(),
            io_mode,
        }
    }

    /// Sources under the working directory plus the builtin units, blocking I/O
    pub fn with_defaults() -> Self {
        let chain = ResolverChain::new()
            .with(FileSourceResolver::new(["."]))
            .with(BuiltinSourceResolver);
        Self::new(Arc::new(chain), IoMode::Blocking)
    }

    pub fn with_parser(mut self, parser: Box<dyn Parser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn io_mode(&self) -> IoMode {
        self.io_mode
    }

    pub fn resolver(&self) -> &Arc<dyn SourceResolver> {
        &self.resolver
    }

    pub fn is_cached(&self, class: &ClassName) -> bool {
        self.cache.contains_key(class)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Parse text without touching the cache
    pub fn parse_source(&self, text: &str) -> Result<SyntaxTree, ParseError> {
        self.parser.parse(text)
    }

    fn cached(&self, class: &ClassName) -> Option<Arc<SyntaxTree>> {
        let tree = self.cache.get(class).map(|entry| Arc::clone(entry.value()));
        if tree.is_some() {
            debug!("AST cache hit for {}", class);
        }
        tree
    }

    fn parse_and_store(&self, class: &ClassName, text: &str) -> Result<Arc<SyntaxTree>, ProxyError> {
        let tree = self
            .parser
            .parse(text)
            .map_err(|e| ProxyError::parse(class, e))?;
        if tree.declarations.is_empty() {
            return Err(ProxyError::AstGenerationFailed(class.to_string()));
        }
        // First writer wins if two callers raced on the same miss
        let stored = self
            .cache
            .entry(class.clone())
            .or_insert_with(|| Arc::new(tree))
            .value()
            .clone();
        debug!(
            "Parsed {} ({} declarations, cache size {})",
            class,
            stored.declarations.len(),
            self.cache.len()
        );
        Ok(stored)
    }

    /// Return the cached tree for `class`, resolving and parsing it on a miss
    pub fn get_or_parse(&self, class: &ClassName) -> Result<Arc<SyntaxTree>, ProxyError> {
        if let Some(tree) = self.cached(class) {
            return Ok(tree);
        }
        debug!("AST cache miss for {}", class);
        let unit = self.resolver.resolve(class)?;
        self.parse_and_store(class, &unit.text)
    }

    /// Same contract as `get_or_parse`; file reads go through tokio in `Async` mode
    pub async fn get_or_parse_async(
        &self,
        class: &ClassName,
    ) -> Result<Arc<SyntaxTree>, ProxyError> {
        if let Some(tree) = self.cached(class) {
            return Ok(tree);
        }
        let path = match self.io_mode {
            IoMode::Blocking => None,
            IoMode::Async => {
                // locating scans directories, so it stays off the async worker too
                let resolver = Arc::clone(&self.resolver);
                let target = class.clone();
                tokio::task::spawn_blocking(move || resolver.locate(&target))
                    .await
                    .map_err(|e| ProxyError::resolution(class, format!("lookup task failed: {e}")))?
            }
        };
        match path {
            Some(path) => {
                debug!("AST cache miss for {}, reading {} asynchronously", class, path.display());
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| ProxyError::resolution(class, format!("{}: {e}", path.display())))?;
                self.parse_and_store(class, &text)
            }
            None => self.get_or_parse(class),
        }
    }
}

impl std::fmt::Debug for AstParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AstParser")
            .field("resolver", &self.resolver.name())
            .field("parser", &self.parser.name())
            .field("cached", &self.cache.len())
            .field("io_mode", &self.io_mode)
            .finish()
    }
}
