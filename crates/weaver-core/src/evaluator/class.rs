use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    ast::{ClassName, MethodNode, PropertyDecl, SyntaxTree, Visibility},
    proxy::TypeHandle,
};

/// An activated class or trait
pub struct RuntimeClass {
    pub name: ClassName,
    pub parent: Option<Arc<RuntimeClass>>,
    pub is_final: bool,
    pub is_trait: bool,
    /// Package and imports of the defining unit, for name resolution
    pub(super) scope: SyntaxTree,
    pub(super) methods: IndexMap<String, Arc<MethodNode>>,
    pub(super) properties: Vec<PropertyDecl>,
}

impl RuntimeClass {
    /// Methods declared by this class itself, in source order
    pub fn declared_methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn declared_method(&self, name: &str) -> Option<&Arc<MethodNode>> {
        self.methods.get(name)
    }

    /// Look a method up through the parent chain, returning its owner too
    pub fn find_method(self: &Arc<Self>, name: &str) -> Option<(Arc<RuntimeClass>, Arc<MethodNode>)> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(method) = class.methods.get(name) {
                return Some((Arc::clone(class), Arc::clone(method)));
            }
            current = class.parent.as_ref();
        }
        None
    }

    /// Whether `self` is `other` or one of its descendants
    pub fn is_subclass_of(&self, other: &ClassName) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class.name == *other {
                return true;
            }
            current = class.parent.as_deref();
        }
        false
    }

    /// Root first, ending with this class
    pub fn lineage(self: &Arc<Self>) -> Vec<Arc<RuntimeClass>> {
        let mut chain = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            chain.push(Arc::clone(class));
            current = class.parent.as_ref();
        }
        chain.reverse();
        chain
    }

    pub fn is_public(method: &MethodNode) -> bool {
        method.modifiers.visibility == Visibility::Public
    }

    pub fn handle(&self) -> TypeHandle {
        TypeHandle {
            name: self.name.clone(),
            methods: self.methods.keys().cloned().collect(),
        }
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.to_string()))
            .field("is_final", &self.is_final)
            .field("is_trait", &self.is_trait)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
