//! Weaver - High-level interface for proxy generation
//!
//! Wires one source resolver chain, one parse cache, one proxy factory and one
//! runtime together so that generated proxies can be instantiated and called.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    ast::ClassName,
    evaluator::{advice::AdviceRegistry, Runtime, Value},
    proxy::{AstParser, ProxyFactory, ProxyOutput},
    source::{
        BuiltinSourceResolver, FileSourceResolver, MemorySourceResolver, ResolverChain,
        SourceResolver,
    },
    Result, WeaverConfig, WeaverError,
};

/// Proxy factory and runtime sharing one parse cache
pub struct Weaver {
    config: WeaverConfig,
    memory: Arc<MemorySourceResolver>,
    parser: Arc<AstParser>,
    runtime: Arc<Runtime>,
    factory: ProxyFactory,
}

impl Weaver {
    /// Resolve sources from the configured roots
    pub fn new(config: WeaverConfig) -> Result<Self> {
        let files = FileSourceResolver::new(config.source_roots.clone())
            .with_extension(config.file_extension.clone());
        Self::with_resolver(config, Arc::new(files))
    }

    /// Resolve sources through `resolver`.
    ///
    /// Lookup order is in-memory sources, then `resolver`, then the builtin
    /// aspect, so an aspect override from the config shadows the builtin one.
    pub fn with_resolver(config: WeaverConfig, resolver: Arc<dyn SourceResolver>) -> Result<Self> {
        let aspect = ClassName::parse(&config.aspect_class)
            .map_err(|e| WeaverError::Config(e.to_string()))?;
        if config.max_call_depth == 0 {
            return Err(WeaverError::Config(
                "max_call_depth must be at least 1".to_string(),
            ));
        }

        let memory = Arc::new(MemorySourceResolver::new());
        if let Some(path) = &config.aspect_source {
            let text = std::fs::read_to_string(path)
                .map_err(|e| WeaverError::Config(format!("aspect source {}: {e}", path.display())))?;
            memory.add(aspect.as_str(), text)?;
            info!("Aspect {} loaded from {}", aspect, path.display());
        }

        let mut chain = ResolverChain::new();
        chain.push(memory.clone());
        chain.push(resolver);
        chain.push(Arc::new(BuiltinSourceResolver));

        let parser = Arc::new(AstParser::new(Arc::new(chain), config.io_mode));
        let runtime = Arc::new(
            Runtime::new()
                .with_loader(Arc::clone(&parser))
                .with_max_depth(config.max_call_depth),
        );
        let factory = ProxyFactory::new(runtime.clone())
            .with_parser(Arc::clone(&parser))
            .with_policy(config.policy)
            .with_aspect(aspect);

        debug!(
            "Weaver ready: io={:?}, policy={:?}",
            config.io_mode, config.policy
        );
        Ok(Self {
            config,
            memory,
            parser,
            runtime,
            factory,
        })
    }

    /// Register source text for a class, shadowing files of the same name
    pub fn add_source(&self, class: &str, text: impl Into<String>) -> Result<()> {
        Ok(self.memory.add(class, text)?)
    }

    /// Generate and activate a proxy for `class`
    pub fn proxy(&self, class: &str) -> Result<ClassName> {
        let class = ClassName::parse(class)?;
        let lock = self.factory.single_flight(&class);
        let _guard = lock.lock();
        Ok(self.factory.new_proxy_class(&class)?)
    }

    /// Like `proxy`, reading the class source with the configured I/O mode
    pub async fn proxy_async(&self, class: &str) -> Result<ClassName> {
        let class = ClassName::parse(class)?;
        // warm the cache first so no lock is held across the await
        self.parser.get_or_parse_async(&class).await?;
        let lock = self.factory.single_flight(&class);
        let _guard = lock.lock();
        Ok(self.factory.new_proxy_class(&class)?)
    }

    /// Generate and activate a proxy, returning its tree and source too
    pub fn generate(&self, class: &str) -> Result<ProxyOutput> {
        let class = ClassName::parse(class)?;
        let lock = self.factory.single_flight(&class);
        let _guard = lock.lock();
        Ok(self.factory.generate(&class)?)
    }

    pub fn instantiate(&self, class: &ClassName, args: Vec<Value>) -> Result<Value> {
        Ok(self.runtime.instantiate(class, args)?)
    }

    pub fn call(&self, target: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.runtime.call_method(target, method, args)?)
    }

    pub fn call_static(&self, class: &ClassName, method: &str, args: Vec<Value>) -> Result<Value> {
        Ok(self.runtime.call_static(class, method, args)?)
    }

    pub fn advice(&self) -> &Arc<AdviceRegistry> {
        self.runtime.advice()
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    pub fn parser(&self) -> &Arc<AstParser> {
        &self.parser
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn factory(&self) -> &ProxyFactory {
        &self.factory
    }
}

impl std::fmt::Debug for Weaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Weaver")
            .field("config", &self.config)
            .field("factory", &self.factory)
            .field("runtime", &self.runtime)
            .finish()
    }
}
