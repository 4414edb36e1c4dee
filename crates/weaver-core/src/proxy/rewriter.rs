use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    enhancement::{AFTER_HOOK, BEFORE_HOOK},
    EnhancementSet, ProxyError, ProxyIdentity,
};
use crate::ast::{
    Block, ClassDecl, ClassName, Declaration, Expr, Member, MethodNode, Param, Stmt, SyntaxTree,
    Visibility,
};

/// What to do when an original method shares a name with a hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// Fail the rewrite, naming the method
    #[default]
    Reject,
    /// Keep the hook, drop the wrapper for the original method
    HookWins,
}

/// Which methods get wrapped, and how hook collisions are settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyPolicy {
    pub wrap_private: bool,
    pub on_hook_collision: CollisionPolicy,
}

/// A method the original class inherits, with the ancestor declaring it
#[derive(Debug, Clone, PartialEq)]
pub struct InheritedMethod {
    pub owner: ClassName,
    pub method: MethodNode,
}

/// Collects the methods of a class's ancestors, one parsed unit at a time.
///
/// The caller feeds each parent tree it loads back into [`visit`](Self::visit)
/// until [`next_parent`](Self::next_parent) runs dry.
#[derive(Debug)]
pub struct AncestorWalk {
    origin: ClassName,
    next: Option<ClassName>,
    seen: HashSet<ClassName>,
    inherited: Vec<InheritedMethod>,
}

impl AncestorWalk {
    pub fn start(original: &SyntaxTree, class: &ClassName) -> Result<Self, ProxyError> {
        let decl = ProxyRewriter::proxyable(original, class)?;
        Ok(Self {
            origin: class.clone(),
            next: parent_of(original, decl, class)?,
            seen: HashSet::from([class.clone()]),
            inherited: Vec::new(),
        })
    }

    pub fn next_parent(&mut self) -> Option<ClassName> {
        self.next.take()
    }

    pub fn visit(&mut self, parent: &ClassName, tree: &SyntaxTree) -> Result<(), ProxyError> {
        if !self.seen.insert(parent.clone()) {
            return Err(ProxyError::rewrite(
                &self.origin,
                format!("inheritance cycle through {parent}"),
            ));
        }
        let Some(Declaration::Class(decl)) = tree.declaration(parent.short_name()) else {
            return Err(ProxyError::rewrite(
                &self.origin,
                format!("superclass {parent} is not a class"),
            ));
        };
        self.inherited.extend(decl.methods().map(|method| InheritedMethod {
            owner: parent.clone(),
            method: method.clone(),
        }));
        self.next = parent_of(tree, decl, &self.origin)?;
        Ok(())
    }

    pub fn finish(self) -> Vec<InheritedMethod> {
        self.inherited
    }
}

fn parent_of(
    tree: &SyntaxTree,
    decl: &ClassDecl,
    origin: &ClassName,
) -> Result<Option<ClassName>, ProxyError> {
    decl.extends
        .as_deref()
        .map(|reference| {
            ClassName::parse(&tree.resolve_reference(reference))
                .map_err(|e| ProxyError::rewrite(origin, e))
        })
        .transpose()
}

/// Turns an original class tree into its proxy tree
#[derive(Debug, Clone, Default)]
pub struct ProxyRewriter {
    policy: ProxyPolicy,
}

impl ProxyRewriter {
    pub fn new(policy: ProxyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ProxyPolicy {
        self.policy
    }

    /// Static, final and constructor methods are always inherited as-is
    pub fn should_wrap(&self, method: &MethodNode) -> bool {
        if method.modifiers.is_static || method.modifiers.is_final || method.is_constructor() {
            return false;
        }
        self.policy.wrap_private || method.modifiers.visibility != Visibility::Private
    }

    fn locate<'t>(original: &'t SyntaxTree, class: &ClassName) -> Result<&'t ClassDecl, ProxyError> {
        match original.declaration(class.short_name()) {
            Some(Declaration::Class(decl)) => Ok(decl),
            Some(Declaration::Trait(_)) | None => Err(ProxyError::NotAClass(class.to_string())),
        }
    }

    /// The class to proxy, if it can be subclassed under its requested name
    fn proxyable<'t>(original: &'t SyntaxTree, class: &ClassName) -> Result<&'t ClassDecl, ProxyError> {
        let decl = Self::locate(original, class)?;
        if decl.is_final {
            return Err(ProxyError::rewrite(class, "class is declared final"));
        }
        let declared_package = original.package.as_deref().unwrap_or_default();
        if !declared_package.eq_ignore_ascii_case(class.package().unwrap_or_default()) {
            return Err(ProxyError::rewrite(
                class,
                format!("source declares package '{declared_package}'"),
            ));
        }
        Ok(decl)
    }

    /// Settle a method that a hook of the same name would override.
    /// `Ok` means the hook takes the name.
    fn settle_collision(
        &self,
        original: &ClassName,
        method: &MethodNode,
        owner: Option<&ClassName>,
        hook: &MethodNode,
    ) -> Result<(), ProxyError> {
        if hook == method {
            // already the expected hook, e.g. when proxying a proxy
            return Ok(());
        }
        let described = match owner {
            Some(owner) => format!("method '{}' inherited from {}", method.name, owner),
            None => format!("method '{}'", method.name),
        };
        if method.modifiers.is_final {
            return Err(ProxyError::rewrite(
                original,
                format!("final {described} cannot be replaced by a hook"),
            ));
        }
        match self.policy.on_hook_collision {
            CollisionPolicy::Reject => Err(ProxyError::rewrite(
                original,
                format!("{described} collides with the enhancement hook of the same name"),
            )),
            CollisionPolicy::HookWins => {
                warn!("{}: {} is shadowed by the enhancement hook", original, described);
                Ok(())
            }
        }
    }

    /// Original methods that get a wrapper, after collision handling
    fn wrapped_methods<'t>(
        &self,
        class: &'t ClassDecl,
        original: &ClassName,
        enhancements: &EnhancementSet,
    ) -> Result<Vec<&'t MethodNode>, ProxyError> {
        let mut wrapped = Vec::new();
        for method in class.methods() {
            if let Some(hook) = enhancements.get(&method.name) {
                self.settle_collision(original, method, None, hook)?;
                continue;
            }
            if self.should_wrap(method) {
                wrapped.push(method);
            } else {
                debug!("{}::{} is inherited unwrapped", original, method.name);
            }
        }
        Ok(wrapped)
    }

    /// Hooks also override whatever the original inherits under their names
    fn check_inherited(
        &self,
        class: &ClassDecl,
        original: &ClassName,
        enhancements: &EnhancementSet,
        inherited: &[InheritedMethod],
    ) -> Result<(), ProxyError> {
        let mut seen = HashSet::new();
        for InheritedMethod { owner, method } in inherited {
            // nearest declaration wins; the class's own methods are settled already
            if !seen.insert(method.name.as_str()) || class.method(&method.name).is_some() {
                continue;
            }
            if let Some(hook) = enhancements.get(&method.name) {
                self.settle_collision(original, method, Some(owner), hook)?;
            }
        }
        Ok(())
    }

    /// Build the proxy tree, settling collisions with the class's own methods
    /// only. The input tree is never modified.
    pub fn rewrite(
        &self,
        original: &SyntaxTree,
        identity: &ProxyIdentity,
        enhancements: &EnhancementSet,
    ) -> Result<SyntaxTree, ProxyError> {
        self.rewrite_with_ancestry(original, identity, enhancements, &[])
    }

    /// Build the proxy tree, settling hook collisions against `inherited`,
    /// the methods of the original's ancestors ordered nearest first
    pub fn rewrite_with_ancestry(
        &self,
        original: &SyntaxTree,
        identity: &ProxyIdentity,
        enhancements: &EnhancementSet,
        inherited: &[InheritedMethod],
    ) -> Result<SyntaxTree, ProxyError> {
        let class_name = &identity.original_name;
        let class = Self::proxyable(original, class_name)?;

        let mut members: Vec<Member> = self
            .wrapped_methods(class, class_name, enhancements)?
            .into_iter()
            .map(|method| Member::Method(wrap_method(method, class_name)))
            .collect();
        self.check_inherited(class, class_name, enhancements, inherited)?;
        members.extend(enhancements.methods().cloned().map(Member::Method));

        debug!(
            "Rewrote {} into {} ({} members)",
            class_name,
            identity.proxy_name,
            members.len()
        );

        Ok(SyntaxTree {
            package: original.package.clone(),
            imports: original.imports.clone(),
            declarations: vec![Declaration::Class(ClassDecl {
                name: identity.proxy_name.short_name().to_string(),
                is_final: false,
                extends: Some(class_name.to_string()),
                members,
            })],
        })
    }

    /// Check the proxy invariant on a rewritten tree: a single class extending
    /// the original, one wrapper per wrappable method, every hook present
    pub fn verify(
        &self,
        proxy: &SyntaxTree,
        original: &SyntaxTree,
        identity: &ProxyIdentity,
        enhancements: &EnhancementSet,
    ) -> Result<(), ProxyError> {
        let fail = |reason: String| -> Result<(), ProxyError> {
            Err(ProxyError::verification(&identity.original_name, reason))
        };

        let [Declaration::Class(decl)] = proxy.declarations.as_slice() else {
            return fail("expected exactly one class declaration".to_string());
        };
        if !decl.name.eq_ignore_ascii_case(identity.proxy_name.short_name()) {
            return fail(format!("proxy class is named '{}'", decl.name));
        }
        let extends_original = decl
            .extends
            .as_deref()
            .and_then(|parent| ClassName::parse(parent).ok())
            .is_some_and(|parent| parent == identity.original_name);
        if !extends_original {
            return fail(format!("superclass is {:?}", decl.extends));
        }

        let class = Self::locate(original, &identity.original_name)?;
        for method in self.wrapped_methods(class, &identity.original_name, enhancements)? {
            if decl.method(&method.name).is_none() {
                return fail(format!("missing wrapper for '{}'", method.name));
            }
        }
        for hook in enhancements.names() {
            if decl.method(hook).is_none() {
                return fail(format!("missing enhancement hook '{hook}'"));
            }
        }
        Ok(())
    }
}

/// A local name that does not clash with any parameter
fn fresh_local(base: &str, params: &[Param]) -> String {
    let mut name = base.to_string();
    while params.iter().any(|p| p.name == name) {
        name.push('_');
    }
    name
}

/// Wrapper that runs the hooks around `super.m(args)`
fn wrap_method(method: &MethodNode, original: &ClassName) -> MethodNode {
    let ctx = fresh_local("__ctx", &method.params);
    let result = fresh_local("__result", &method.params);
    let args: Vec<Expr> = method.params.iter().map(|p| Expr::var(&p.name)).collect();

    let body = vec![
        Stmt::Let {
            name: ctx.clone(),
            type_annotation: None,
            value: Expr::Map(vec![
                ("class".to_string(), Expr::string(original.as_str())),
                ("method".to_string(), Expr::string(&method.name)),
                ("args".to_string(), Expr::List(args.clone())),
            ]),
        },
        Stmt::Expr(Expr::MethodCall {
            object: Box::new(Expr::SelfRef),
            method: BEFORE_HOOK.to_string(),
            args: vec![Expr::var(&ctx)],
        }),
        Stmt::Let {
            name: result.clone(),
            type_annotation: None,
            value: Expr::SuperCall {
                method: method.name.clone(),
                args,
            },
        },
        Stmt::Return(Some(Expr::MethodCall {
            object: Box::new(Expr::SelfRef),
            method: AFTER_HOOK.to_string(),
            args: vec![Expr::var(ctx), Expr::var(result)],
        })),
    ];

    MethodNode {
        modifiers: method.modifiers,
        name: method.name.clone(),
        params: method.params.clone(),
        return_type: method.return_type.clone(),
        body: Block(body),
    }
}
