// Proxy generation pipeline
//
// resolve -> parse (cached) -> rewrite -> verify -> print -> activate

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    ast::{ClassName, CodePrinter, InvalidClassName, StandardPrinter, SyntaxTree},
    source::ASPECT_CLASS,
};

pub mod activation;
pub mod ast_parser;
pub mod enhancement;
pub mod errors;
pub mod rewriter;

#[cfg(test)]
mod tests;

pub use activation::{ActivationError, ActivationRecord, ActivationRegistry, ActivationSink, TypeHandle};
pub use ast_parser::{AstParser, IoMode};
pub use enhancement::{EnhancementExtractor, EnhancementSet};
pub use errors::ProxyError;
pub use rewriter::{AncestorWalk, CollisionPolicy, InheritedMethod, ProxyPolicy, ProxyRewriter};

/// Stages of one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationStage {
    Requested,
    Parsed,
    Rewritten,
    Printed,
    Activated,
    Done,
    Failed,
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationStage::Requested => "requested",
            GenerationStage::Parsed => "parsed",
            GenerationStage::Rewritten => "rewritten",
            GenerationStage::Printed => "printed",
            GenerationStage::Activated => "activated",
            GenerationStage::Done => "done",
            GenerationStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Names of one generated proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyIdentity {
    pub proxy_name: ClassName,
    pub original_name: ClassName,
    pub suffix: String,
}

impl ProxyIdentity {
    /// Fresh identity with a random suffix
    pub fn generate(original: &ClassName) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        // a valid short name plus `_` and hex digits is always a valid name
        let proxy_name = ClassName::new_unchecked(&Self::proxy_display(original, &suffix));
        Self {
            proxy_name,
            original_name: original.clone(),
            suffix,
        }
    }

    /// Identity with a caller-chosen suffix
    pub fn with_suffix(original: &ClassName, suffix: &str) -> Result<Self, InvalidClassName> {
        Ok(Self {
            proxy_name: ClassName::parse(&Self::proxy_display(original, suffix))?,
            original_name: original.clone(),
            suffix: suffix.to_string(),
        })
    }

    fn proxy_display(original: &ClassName, suffix: &str) -> String {
        match original.package() {
            Some(pkg) => format!("{pkg}.{}_{suffix}", original.short_name()),
            None => format!("{}_{suffix}", original.short_name()),
        }
    }
}

/// Result of a successful generation
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyOutput {
    pub identity: ProxyIdentity,
    pub tree: SyntaxTree,
    pub source: String,
    pub handle: TypeHandle,
}

/// Generates, prints and activates proxy classes.
///
/// Parser and printer are replaceable and created lazily when first needed.
/// Parse results and the hook set are cached across requests; a failed
/// request leaves both caches as they were and records nothing.
pub struct ProxyFactory {
    parser: RwLock<Option<Arc<AstParser>>>,
    printer: RwLock<Option<Arc<dyn CodePrinter>>>,
    extractor: EnhancementExtractor,
    rewriter: ProxyRewriter,
    sink: Arc<dyn ActivationSink>,
    registry: Arc<ActivationRegistry>,
    in_flight: DashMap<ClassName, Arc<Mutex<()>>>,
}

impl ProxyFactory {
    pub fn new(sink: Arc<dyn ActivationSink>) -> Self {
        let aspect = ClassName::new_unchecked(ASPECT_CLASS);
        Self {
            parser: RwLock::new(None),
            printer: RwLock::new(None),
            extractor: EnhancementExtractor::new(aspect),
            rewriter: ProxyRewriter::default(),
            sink,
            registry: Arc::new(ActivationRegistry::new()),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: ProxyPolicy) -> Self {
        self.rewriter = ProxyRewriter::new(policy);
        self
    }

    pub fn with_aspect(mut self, aspect: ClassName) -> Self {
        self.extractor = EnhancementExtractor::new(aspect);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ActivationRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_parser(self, parser: Arc<AstParser>) -> Self {
        self.set_parser(parser);
        self
    }

    pub fn set_parser(&self, parser: Arc<AstParser>) {
        *self.parser.write() = Some(parser);
    }

    /// The configured parser, creating the default one on first use
    pub fn parser(&self) -> Arc<AstParser> {
        if let Some(parser) = self.parser.read().as_ref() {
            return Arc::clone(parser);
        }
        let mut slot = self.parser.write();
        Arc::clone(slot.get_or_insert_with(|| {
            debug!("No parser configured, using defaults");
            Arc::new(AstParser::with_defaults())
        }))
    }

    pub fn set_printer(&self, printer: Arc<dyn CodePrinter>) {
        *self.printer.write() = Some(printer);
    }

    /// The configured printer, `StandardPrinter` unless replaced
    pub fn printer(&self) -> Arc<dyn CodePrinter> {
        if let Some(printer) = self.printer.read().as_ref() {
            return Arc::clone(printer);
        }
        let mut slot = self.printer.write();
        Arc::clone(slot.get_or_insert_with(|| Arc::new(StandardPrinter::new())))
    }

    pub fn registry(&self) -> &Arc<ActivationRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn ActivationSink> {
        &self.sink
    }

    pub fn policy(&self) -> ProxyPolicy {
        self.rewriter.policy()
    }

    /// The hook set, extracted on first use
    pub fn enhancement_methods(&self) -> Result<Arc<EnhancementSet>, ProxyError> {
        self.extractor.enhancement_methods(&self.parser())
    }

    /// Per-class lock for callers that may request the same class concurrently.
    ///
    /// ```ignore
    /// let lock = factory.single_flight(&name);
    /// let _guard = lock.lock();
    /// factory.new_proxy_class(&name)?;
    /// ```
    pub fn single_flight(&self, class: &ClassName) -> Arc<Mutex<()>> {
        Arc::clone(self.in_flight.entry(class.clone()).or_default().value())
    }

    /// Generate and activate a proxy for `class`, returning the proxy's name
    pub fn new_proxy_class(&self, class: &ClassName) -> Result<ClassName, ProxyError> {
        self.generate(class).map(|output| output.identity.proxy_name)
    }

    pub async fn new_proxy_class_async(&self, class: &ClassName) -> Result<ClassName, ProxyError> {
        self.generate_async(class)
            .await
            .map(|output| output.identity.proxy_name)
    }

    /// Full pipeline, returning the generated tree and source as well
    pub fn generate(&self, class: &ClassName) -> Result<ProxyOutput, ProxyError> {
        debug!("Proxy request for {} [{}]", class, GenerationStage::Requested);
        let parser = self.parser();
        let tree = parser
            .get_or_parse(class)
            .map_err(|e| Self::failed(class, e))?;
        let inherited = Self::ancestry(&parser, class, &tree).map_err(|e| Self::failed(class, e))?;
        self.finish(class, &parser, &tree, &inherited)
            .map_err(|e| Self::failed(class, e))
    }

    pub async fn generate_async(&self, class: &ClassName) -> Result<ProxyOutput, ProxyError> {
        debug!("Proxy request for {} [{}]", class, GenerationStage::Requested);
        let parser = self.parser();
        let tree = parser
            .get_or_parse_async(class)
            .await
            .map_err(|e| Self::failed(class, e))?;
        let inherited = Self::ancestry_async(&parser, class, &tree)
            .await
            .map_err(|e| Self::failed(class, e))?;
        self.finish(class, &parser, &tree, &inherited)
            .map_err(|e| Self::failed(class, e))
    }

    /// Methods of every ancestor of `class`, nearest first, parsed through
    /// the shared cache
    fn ancestry(
        parser: &AstParser,
        class: &ClassName,
        tree: &SyntaxTree,
    ) -> Result<Vec<InheritedMethod>, ProxyError> {
        let mut walk = AncestorWalk::start(tree, class)?;
        while let Some(parent) = walk.next_parent() {
            let parent_tree = parser.get_or_parse(&parent)?;
            walk.visit(&parent, &parent_tree)?;
        }
        Ok(walk.finish())
    }

    async fn ancestry_async(
        parser: &AstParser,
        class: &ClassName,
        tree: &SyntaxTree,
    ) -> Result<Vec<InheritedMethod>, ProxyError> {
        let mut walk = AncestorWalk::start(tree, class)?;
        while let Some(parent) = walk.next_parent() {
            let parent_tree = parser.get_or_parse_async(&parent).await?;
            walk.visit(&parent, &parent_tree)?;
        }
        Ok(walk.finish())
    }

    fn failed(class: &ClassName, error: ProxyError) -> ProxyError {
        debug!(
            "Proxy request for {} [{}] while entering {}: {}",
            class,
            GenerationStage::Failed,
            error.failed_stage(),
            error
        );
        error
    }

    fn finish(
        &self,
        class: &ClassName,
        parser: &AstParser,
        tree: &SyntaxTree,
        inherited: &[InheritedMethod],
    ) -> Result<ProxyOutput, ProxyError> {
        debug!("Proxy request for {} [{}]", class, GenerationStage::Parsed);

        let identity = ProxyIdentity::generate(class);
        let enhancements = self.extractor.enhancement_methods(parser)?;
        let proxy_tree = self
            .rewriter
            .rewrite_with_ancestry(tree, &identity, &enhancements, inherited)?;
        self.rewriter
            .verify(&proxy_tree, tree, &identity, &enhancements)?;
        debug!("Proxy request for {} [{}]", class, GenerationStage::Rewritten);

        let printer = self.printer();
        let source = printer.print(&proxy_tree);
        debug!(
            "Proxy request for {} [{}] by {} printer, {} bytes",
            class,
            GenerationStage::Printed,
            printer.name(),
            source.len()
        );

        let proxy = &identity.proxy_name;
        if self.registry.is_activated(proxy) {
            return Err(ProxyError::activation(
                proxy,
                ActivationError::Duplicate(proxy.to_string()),
            ));
        }
        let handle = self
            .sink
            .define(&source)
            .map_err(|e| ProxyError::activation(proxy, e))?;
        if handle.name != *proxy {
            return Err(ProxyError::activation(
                proxy,
                ActivationError::InvalidSource(format!("source defined '{}'", handle.name)),
            ));
        }
        self.registry
            .record(identity.clone(), handle.clone())
            .map_err(|e| ProxyError::activation(proxy, e))?;
        debug!("Proxy request for {} [{}]", class, GenerationStage::Activated);

        info!("Generated proxy {} for {}", proxy, class);
        debug!("Proxy request for {} [{}]", class, GenerationStage::Done);
        Ok(ProxyOutput {
            identity,
            tree: proxy_tree,
            source,
            handle,
        })
    }
}

impl fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("aspect", self.extractor.aspect())
            .field("policy", &self.rewriter.policy())
            .field("activated", &self.registry.len())
            .finish()
    }
}
