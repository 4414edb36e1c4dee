use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{AstParser, ProxyError};
use crate::ast::{
    visit::{self, NameRefKind, Node},
    ClassName, Declaration, MethodNode, SyntaxTree, PRIMITIVE_TYPES, SELF_CLASS,
};

/// Hook called before delegating to the original method
pub const BEFORE_HOOK: &str = "__before";
/// Hook called with the original result; its return value is the call's result
pub const AFTER_HOOK: &str = "__after";
/// Instance factory helper
pub const INSTANCE_HOOK: &str = "__instance";

/// Hook methods taken from the aspect trait, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementSet {
    aspect: ClassName,
    methods: IndexMap<String, MethodNode>,
}

impl EnhancementSet {
    /// Build a set from already-extracted methods; names must be unique and
    /// both required hooks present
    pub fn new(aspect: ClassName, methods: Vec<MethodNode>) -> Result<Self, ProxyError> {
        if methods.is_empty() {
            return Err(ProxyError::enhancement_missing(
                &aspect,
                "declares no methods",
            ));
        }
        let mut by_name = IndexMap::with_capacity(methods.len());
        for method in methods {
            let name = method.name.clone();
            if by_name.insert(name.clone(), method).is_some() {
                return Err(ProxyError::enhancement_missing(
                    &aspect,
                    format!("method '{name}' is declared more than once"),
                ));
            }
        }
        for required in [BEFORE_HOOK, AFTER_HOOK] {
            if !by_name.contains_key(required) {
                return Err(ProxyError::enhancement_missing(
                    &aspect,
                    format!("required hook '{required}' is missing"),
                ));
            }
        }
        Ok(Self {
            aspect,
            methods: by_name,
        })
    }

    pub fn aspect(&self) -> &ClassName {
        &self.aspect
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodNode> {
        self.methods.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&MethodNode> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Qualify the relative class references in a hook against the unit it was
/// declared in, so the hook means the same thing after being spliced into a
/// class in another package
pub fn retarget(method: &MethodNode, unit: &SyntaxTree) -> MethodNode {
    let mut method = method.clone();
    visit::rewrite_name_refs(&mut method, &mut |kind, name| {
        if name == SELF_CLASS {
            return None;
        }
        if kind == NameRefKind::TypeAnnotation && PRIMITIVE_TYPES.contains(&name) {
            return None;
        }
        let resolved = unit.resolve_reference(name);
        (resolved != name).then_some(resolved)
    });
    method
}

/// Extracts the hook methods from the aspect trait, once
#[derive(Debug)]
pub struct EnhancementExtractor {
    aspect: ClassName,
    cached: RwLock<Option<Arc<EnhancementSet>>>,
}

impl EnhancementExtractor {
    pub fn new(aspect: ClassName) -> Self {
        Self {
            aspect,
            cached: RwLock::new(None),
        }
    }

    pub fn aspect(&self) -> &ClassName {
        &self.aspect
    }

    pub fn is_loaded(&self) -> bool {
        self.cached.read().is_some()
    }

    /// The cached hook set, extracting it through `parser` on first use.
    /// Failures are not cached.
    pub fn enhancement_methods(&self, parser: &AstParser) -> Result<Arc<EnhancementSet>, ProxyError> {
        if let Some(set) = self.cached.read().as_ref() {
            return Ok(Arc::clone(set));
        }

        let extracted = Arc::new(self.extract(parser)?);
        let mut slot = self.cached.write();
        let set = slot.get_or_insert(extracted);
        Ok(Arc::clone(set))
    }

    fn extract(&self, parser: &AstParser) -> Result<EnhancementSet, ProxyError> {
        let tree = parser.get_or_parse(&self.aspect).map_err(|e| match e {
            ProxyError::Resolution { message, .. } => {
                ProxyError::enhancement_missing(&self.aspect, message)
            }
            other => ProxyError::enhancement_missing(&self.aspect, other),
        })?;

        let decl = tree.declaration(self.aspect.short_name()).ok_or_else(|| {
            ProxyError::enhancement_missing(
                &self.aspect,
                format!("no declaration named '{}'", self.aspect.short_name()),
            )
        })?;

        let mut methods = Vec::new();
        visit::walk_declaration(decl, &mut |node| match node {
            Node::Method(method) => methods.push(retarget(method, &tree)),
            Node::Class(_) | Node::Trait(_) | Node::Params(_) | Node::Block(_) | Node::NameRef(_) => {}
        });

        let set = EnhancementSet::new(self.aspect.clone(), methods)?;
        let kind = match decl {
            Declaration::Class(_) => "class",
            Declaration::Trait(_) => "trait",
        };
        info!(
            "Loaded {} enhancement hooks from {} {}",
            set.len(),
            kind,
            self.aspect
        );
        debug!("Enhancement hooks: {:?}", set.names().collect::<Vec<_>>());
        Ok(set)
    }
}
