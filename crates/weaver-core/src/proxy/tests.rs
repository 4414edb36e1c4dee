use std::sync::Arc;

use dashmap::DashMap;
use pretty_assertions::assert_eq;

use super::*;
use crate::{
    ast::{Declaration, MethodNode, StandardPrinter, TypeRef},
    parser::{Parser, WeaveParser},
    source::{BuiltinSourceResolver, MemorySourceResolver, ResolverChain},
};

const WIDGET: &str = r#"
package app;

class Widget {
    let factor: int = 2;

    fn init(factor) {
        self.factor = factor;
    }

    fn compute(x: int) -> int {
        return x * 2;
    }

    protected fn scale(x, by = 3) {
        return x * by;
    }

    private fn secret() {
        return 1;
    }

    static fn make() {
        return new Widget(2);
    }

    final fn locked() {
        return 0;
    }
}
"#;

/// Sink that parses what it is given and remembers it
#[derive(Default)]
struct CollectingSink {
    defined: DashMap<ClassName, String>,
    reject: bool,
}

impl ActivationSink for CollectingSink {
    fn define(&self, source: &str) -> Result<TypeHandle, ActivationError> {
        if self.reject {
            return Err(ActivationError::InvalidSource("rejected".to_string()));
        }
        let tree = WeaveParser::new()
            .parse(source)
            .map_err(|e| ActivationError::InvalidSource(e.to_string()))?;
        let decl = tree
            .classes()
            .next()
            .ok_or_else(|| ActivationError::InvalidSource("no class".to_string()))?;
        let name = tree.qualified_name(&decl.name).unwrap();
        if self.defined.contains_key(&name) {
            return Err(ActivationError::Duplicate(name.to_string()));
        }
        self.defined.insert(name.clone(), source.to_string());
        Ok(TypeHandle {
            name,
            methods: decl.methods().map(|m| m.name.clone()).collect(),
        })
    }

    fn is_defined(&self, class: &ClassName) -> bool {
        self.defined.contains_key(class)
    }
}

fn name(s: &str) -> ClassName {
    ClassName::parse(s).unwrap()
}

fn parser_with(sources: &[(&str, &str)]) -> Arc<AstParser> {
    let memory = MemorySourceResolver::new();
    for (class, text) in sources {
        memory.add(class, *text).unwrap();
    }
    let chain = ResolverChain::new().with(memory).with(BuiltinSourceResolver);
    Arc::new(AstParser::new(Arc::new(chain), IoMode::Blocking))
}

fn factory_with(sources: &[(&str, &str)]) -> (ProxyFactory, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::default());
    let factory = ProxyFactory::new(sink.clone()).with_parser(parser_with(sources));
    (factory, sink)
}

fn builtin_hooks() -> Arc<EnhancementSet> {
    let parser = parser_with(&[]);
    EnhancementExtractor::new(name(crate::source::ASPECT_CLASS))
        .enhancement_methods(&parser)
        .unwrap()
}

fn proxy_class(tree: &SyntaxTree) -> &crate::ast::ClassDecl {
    match &tree.declarations[0] {
        Declaration::Class(class) => class,
        Declaration::Trait(_) => panic!("proxy should be a class"),
    }
}

fn parse_method(source: &str) -> MethodNode {
    let tree = WeaveParser::new()
        .parse(&format!("class Holder {{ {source} }}"))
        .unwrap();
    let method = proxy_class(&tree).methods().next().unwrap().clone();
    method
}

fn rewrite_widget(rewriter: &ProxyRewriter, suffix: &str) -> Result<SyntaxTree, ProxyError> {
    let tree = WeaveParser::new().parse(WIDGET).unwrap();
    let identity = ProxyIdentity::with_suffix(&name("app.Widget"), suffix).unwrap();
    rewriter.rewrite(&tree, &identity, &builtin_hooks())
}

#[test]
fn test_identity_naming() {
    let original = name("app.model.Widget");
    let a = ProxyIdentity::generate(&original);
    let b = ProxyIdentity::generate(&original);

    assert_ne!(a.proxy_name, b.proxy_name);
    assert_eq!(a.proxy_name.package(), Some("app.model"));
    assert!(a.proxy_name.short_name().starts_with("Widget_"));
    assert_eq!(a.suffix.len(), 32);
    assert!(a.suffix.chars().all(|c| c.is_ascii_hexdigit()));

    let fixed = ProxyIdentity::with_suffix(&name("Top"), "x1").unwrap();
    assert_eq!(fixed.proxy_name.as_str(), "Top_x1");
    assert!(ProxyIdentity::with_suffix(&original, "not valid").is_err());
}

#[test]
fn test_builtin_enhancements() {
    let parser = parser_with(&[]);
    let extractor = EnhancementExtractor::new(name(crate::source::ASPECT_CLASS));
    assert!(!extractor.is_loaded());

    let first = extractor.enhancement_methods(&parser).unwrap();
    assert_eq!(
        first.names().collect::<Vec<_>>(),
        vec!["__before", "__after", "__instance"]
    );
    assert!(extractor.is_loaded());

    let second = extractor.enhancement_methods(&parser).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_enhancement_missing() {
    let cases = [
        ("x.Empty", "package x; trait Empty {}", "no methods"),
        (
            "x.Twice",
            "package x; trait Twice { fn __before(c) {} fn __after(c, r) {} fn __before(d) {} }",
            "more than once",
        ),
        ("x.Half", "package x; trait Half { fn __before(c) {} }", "__after"),
        ("x.Broken", "package x; trait Broken { fn }", "Syntax error"),
        ("x.Other", "package x; trait Unrelated { fn a() {} }", "no declaration"),
    ];
    for (class, source, expected) in cases {
        let parser = parser_with(&[(class, source)]);
        let err = EnhancementExtractor::new(name(class))
            .enhancement_methods(&parser)
            .unwrap_err();
        let ProxyError::EnhancementMissing { reason, .. } = &err else {
            panic!("{class}: unexpected error {err:?}");
        };
        assert!(reason.contains(expected), "{class}: {reason}");
    }

    let parser = parser_with(&[]);
    let err = EnhancementExtractor::new(name("x.Nowhere"))
        .enhancement_methods(&parser)
        .unwrap_err();
    assert!(matches!(err, ProxyError::EnhancementMissing { .. }));
}

#[test]
fn test_hooks_are_retargeted() {
    let aspect = r#"
        package lib.aop;
        import lib.time.Clock;

        trait Timing {
            fn __before(ctx: map) {
                let started: Clock = Clock::now();
                let audit = new Audit(started);
                let again = Self::__instance();
            }
            fn __after(ctx: map, result) -> Outcome {
                return result;
            }
        }
    "#;
    let parser = parser_with(&[("lib.aop.Timing", aspect)]);
    let set = EnhancementExtractor::new(name("lib.aop.Timing"))
        .enhancement_methods(&parser)
        .unwrap();

    let expected = parse_method(
        r#"fn __before(ctx: map) {
            let started: lib.time.Clock = lib.time.Clock::now();
            let audit = new lib.aop.Audit(started);
            let again = Self::__instance();
        }"#,
    );
    assert_eq!(set.get("__before"), Some(&expected));
    assert_eq!(
        set.get("__after").unwrap().return_type,
        Some(TypeRef::named("lib.aop.Outcome"))
    );
}

#[test]
fn test_rewrite_widget() {
    let proxy = rewrite_widget(&ProxyRewriter::default(), "s1").unwrap();

    assert_eq!(proxy.package.as_deref(), Some("app"));
    let class = proxy_class(&proxy);
    assert_eq!(class.name, "Widget_s1");
    assert!(!class.is_final);
    assert_eq!(class.extends.as_deref(), Some("app.Widget"));

    let names: Vec<_> = class.methods().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["compute", "scale", "__before", "__after", "__instance"]
    );
    // properties are inherited, not copied
    assert_eq!(class.members.len(), names.len());

    let expected = parse_method(
        r#"fn compute(x: int) -> int {
            let __ctx = {"class": "app.Widget", "method": "compute", "args": [x]};
            self.__before(__ctx);
            let __result = super.compute(x);
            return self.__after(__ctx, __result);
        }"#,
    );
    assert_eq!(class.method("compute"), Some(&expected));

    // visibility and defaults survive on the wrapper
    let scale = class.method("scale").unwrap();
    assert_eq!(scale.modifiers.visibility, crate::ast::Visibility::Protected);
    assert_eq!(scale.params[1].default, Some(crate::ast::Expr::Int(3)));
}

#[test]
fn test_rewrite_policy_private() {
    let rewriter = ProxyRewriter::new(ProxyPolicy {
        wrap_private: true,
        ..ProxyPolicy::default()
    });
    let proxy = rewrite_widget(&rewriter, "p").unwrap();
    let class = proxy_class(&proxy);
    assert!(class.method("secret").is_some());
    assert!(class.method("make").is_none());
    assert!(class.method("locked").is_none());
    assert!(class.method("init").is_none());
}

#[test]
fn test_generated_locals_avoid_parameters() {
    let source = "class Clash { fn m(__ctx, __result, __ctx_) { return __ctx; } }";
    let tree = WeaveParser::new().parse(source).unwrap();
    let identity = ProxyIdentity::with_suffix(&name("Clash"), "c").unwrap();
    let proxy = ProxyRewriter::default()
        .rewrite(&tree, &identity, &builtin_hooks())
        .unwrap();

    let wrapper = proxy_class(&proxy).method("m").unwrap();
    let locals: Vec<_> = wrapper
        .body
        .0
        .iter()
        .filter_map(|stmt| match stmt {
            crate::ast::Stmt::Let { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(locals, vec!["__ctx__", "__result_"]);
}

#[test]
fn test_rewrite_rejections() {
    let hooks = builtin_hooks();
    let rewriter = ProxyRewriter::default();
    let parser = WeaveParser::new();

    let cases: [(&str, &str, fn(&ProxyError) -> bool); 4] = [
        ("app.Sealed", "package app; final class Sealed {}", |e| {
            matches!(e, ProxyError::Rewrite { reason, .. } if reason.contains("final"))
        }),
        ("app.Shape", "package app; trait Shape { fn area() {} }", |e| {
            matches!(e, ProxyError::NotAClass(_))
        }),
        ("app.Ghost", "package app; class Other {}", |e| {
            matches!(e, ProxyError::NotAClass(_))
        }),
        ("app.Moved", "package elsewhere; class Moved {}", |e| {
            matches!(e, ProxyError::Rewrite { reason, .. } if reason.contains("elsewhere"))
        }),
    ];
    for (class, source, check) in cases {
        let tree = parser.parse(source).unwrap();
        let identity = ProxyIdentity::with_suffix(&name(class), "r").unwrap();
        let err = rewriter.rewrite(&tree, &identity, &hooks).unwrap_err();
        assert!(check(&err), "{class}: {err:?}");
    }
}

#[test]
fn test_hook_collisions() {
    let source = "package app; class Noisy { fn __before(x) { return x; } fn run() {} }";
    let tree = WeaveParser::new().parse(source).unwrap();
    let identity = ProxyIdentity::with_suffix(&name("app.Noisy"), "h").unwrap();
    let hooks = builtin_hooks();

    let err = ProxyRewriter::default()
        .rewrite(&tree, &identity, &hooks)
        .unwrap_err();
    assert!(matches!(&err, ProxyError::Rewrite { reason, .. } if reason.contains("__before")));

    let lenient = ProxyRewriter::new(ProxyPolicy {
        on_hook_collision: CollisionPolicy::HookWins,
        ..ProxyPolicy::default()
    });
    let proxy = lenient.rewrite(&tree, &identity, &hooks).unwrap();
    let class = proxy_class(&proxy);
    assert_eq!(class.method("__before"), hooks.get("__before"));
    assert!(class.method("run").is_some());

    // a final method cannot be replaced even when hooks win
    let sealed = WeaveParser::new()
        .parse("package app; class Noisy { final fn __after(c, r) {} }")
        .unwrap();
    assert!(lenient.rewrite(&sealed, &identity, &hooks).is_err());
}

const BASE: &str = r#"
package app;

class Base {
    fn __before(x) {
        return "base-" + str(x);
    }

    fn greet() {
        return self.__before(1);
    }
}
"#;

const DERIVED: &str = r#"
package app;

class Derived extends Base {
    fn compute(x) {
        return x * 2;
    }
}
"#;

#[test]
fn test_inherited_hook_collisions() {
    let (factory, sink) = factory_with(&[("app.Base", BASE), ("app.Derived", DERIVED)]);
    let err = factory.generate(&name("app.Derived")).unwrap_err();
    assert!(
        matches!(&err, ProxyError::Rewrite { reason, .. }
            if reason.contains("__before") && reason.contains("app.Base")),
        "{err:?}"
    );
    assert_eq!(err.failed_stage(), GenerationStage::Rewritten);
    assert!(factory.registry().is_empty());
    assert!(sink.defined.is_empty());
    // the ancestor went through the shared cache
    assert!(factory.parser().is_cached(&name("app.Base")));

    let lenient = ProxyPolicy {
        on_hook_collision: CollisionPolicy::HookWins,
        ..ProxyPolicy::default()
    };
    let (factory, _) = factory_with(&[("app.Base", BASE), ("app.Derived", DERIVED)]);
    let factory = factory.with_policy(lenient);
    let output = factory.generate(&name("app.Derived")).unwrap();
    let class = proxy_class(&output.tree);
    assert_eq!(class.method("__before"), builtin_hooks().get("__before"));
    assert!(class.method("compute").is_some());
    assert!(class.method("greet").is_none());
}

#[test]
fn test_inherited_collisions_follow_the_whole_chain() {
    let sources = [
        ("lib.Root", "package lib; class Root { final fn __after(c, r) { return r; } }"),
        ("app.Mid", "package app; import lib.Root; class Mid extends Root { }"),
        ("app.Leaf", "package app; class Leaf extends Mid { fn run() {} }"),
    ];
    let lenient = ProxyPolicy {
        on_hook_collision: CollisionPolicy::HookWins,
        ..ProxyPolicy::default()
    };
    let (factory, _) = factory_with(&sources);
    let factory = factory.with_policy(lenient);
    // a final ancestor method is never replaced, whatever the policy
    let err = factory.new_proxy_class(&name("app.Leaf")).unwrap_err();
    assert!(
        matches!(&err, ProxyError::Rewrite { reason, .. }
            if reason.contains("final") && reason.contains("lib.Root")),
        "{err:?}"
    );

    // a declaration in the class itself settles the name before any ancestor
    let rewriter = ProxyRewriter::new(lenient);
    let tree = WeaveParser::new()
        .parse("package app; class Leaf extends Mid { fn __after(c, r) { return r; } }")
        .unwrap();
    let identity = ProxyIdentity::with_suffix(&name("app.Leaf"), "c").unwrap();
    let inherited = [InheritedMethod {
        owner: name("lib.Root"),
        method: parse_method("fn __after(c, r) { return c; }"),
    }];
    assert!(rewriter
        .rewrite_with_ancestry(&tree, &identity, &builtin_hooks(), &inherited)
        .is_ok());
}

#[test]
fn test_ancestry_failures() {
    let (factory, _) = factory_with(&[
        ("app.Orphan", "package app; class Orphan extends Gone { }"),
        ("app.A", "package app; class A extends B { }"),
        ("app.B", "package app; class B extends A { }"),
        ("app.Impl", "package app; class Impl extends Shape { }"),
        ("app.Shape", "package app; trait Shape { }"),
    ]);

    let err = factory.new_proxy_class(&name("app.Orphan")).unwrap_err();
    assert!(matches!(&err, ProxyError::Resolution { class, .. } if class == "app.Gone"));

    let err = factory.new_proxy_class(&name("app.A")).unwrap_err();
    assert!(matches!(&err, ProxyError::Rewrite { reason, .. } if reason.contains("cycle")));

    let err = factory.new_proxy_class(&name("app.Impl")).unwrap_err();
    assert!(matches!(&err, ProxyError::Rewrite { reason, .. } if reason.contains("not a class")));
    assert!(factory.registry().is_empty());
}

#[test]
fn test_subclass_of_a_proxy_keeps_identical_hooks() {
    let (factory, _) = factory_with(&[("app.Widget", WIDGET)]);
    let first = factory.generate(&name("app.Widget")).unwrap();
    let proxy = first.identity.proxy_name.clone();

    let sub = format!("package app; class Sub extends {} {{ fn extra() {{ return 1; }} }}", proxy.short_name());
    let (factory, _) = factory_with(&[
        ("app.Widget", WIDGET),
        (proxy.as_str(), first.source.as_str()),
        ("app.Sub", sub.as_str()),
    ]);
    let output = factory.generate(&name("app.Sub")).unwrap();
    assert!(proxy_class(&output.tree).method("extra").is_some());
}

#[test]
fn test_rewrite_is_deterministic() {
    let rewriter = ProxyRewriter::default();
    let mut first = rewrite_widget(&rewriter, "one").unwrap();
    let second = rewrite_widget(&rewriter, "two").unwrap();
    assert_ne!(first, second);

    if let Declaration::Class(class) = &mut first.declarations[0] {
        class.name = "Widget_two".to_string();
    }
    assert_eq!(first, second);
}

#[test]
fn test_verify_catches_broken_trees() {
    let rewriter = ProxyRewriter::default();
    let original = WeaveParser::new().parse(WIDGET).unwrap();
    let identity = ProxyIdentity::with_suffix(&name("app.Widget"), "v").unwrap();
    let hooks = builtin_hooks();
    let proxy = rewriter.rewrite(&original, &identity, &hooks).unwrap();
    assert!(rewriter.verify(&proxy, &original, &identity, &hooks).is_ok());

    let mut missing_wrapper = proxy.clone();
    if let Declaration::Class(class) = &mut missing_wrapper.declarations[0] {
        class.members.remove(0);
    }
    let err = rewriter
        .verify(&missing_wrapper, &original, &identity, &hooks)
        .unwrap_err();
    assert!(matches!(&err, ProxyError::AstOptimizationFailed { reason, .. } if reason.contains("compute")));
    assert_eq!(err.failed_stage(), GenerationStage::Rewritten);

    let mut wrong_parent = proxy;
    if let Declaration::Class(class) = &mut wrong_parent.declarations[0] {
        class.extends = Some("app.Other".to_string());
    }
    assert!(rewriter
        .verify(&wrong_parent, &original, &identity, &hooks)
        .is_err());
}

#[test]
fn test_factory_generates_and_records() {
    let (factory, sink) = factory_with(&[("app.Widget", WIDGET)]);
    let output = factory.generate(&name("app.Widget")).unwrap();
    let proxy = &output.identity.proxy_name;

    assert!(sink.is_defined(proxy));
    assert_eq!(output.handle.name, *proxy);
    assert!(output.source.contains("extends app.Widget"));
    assert_eq!(WeaveParser::new().parse(&output.source).unwrap(), output.tree);

    let registry = factory.registry();
    assert!(registry.is_activated(proxy));
    assert_eq!(registry.origin_of(proxy), Some(name("app.Widget")));
    assert_eq!(registry.get(proxy).unwrap().identity, output.identity);

    // second request: new name, cached tree
    let again = factory.new_proxy_class(&name("App.widget")).unwrap();
    assert_ne!(&again, proxy);
    assert_eq!(factory.parser().cached_len(), 2); // widget + aspect
    assert_eq!(registry.proxies_of(&name("app.Widget")).len(), 2);
    assert_eq!(registry.records().len(), 2);
}

#[test]
fn test_factory_failures_leave_no_record() {
    let (factory, sink) = factory_with(&[
        ("app.Broken", "package app; class Broken { fn m( }"),
        ("app.Blank", "package app; // nothing here"),
    ]);

    let err = factory.new_proxy_class(&name("app.Broken")).unwrap_err();
    assert!(matches!(err, ProxyError::Parse { .. }));
    assert_eq!(err.failed_stage(), GenerationStage::Parsed);

    let err = factory.new_proxy_class(&name("app.Blank")).unwrap_err();
    assert_eq!(err, ProxyError::AstGenerationFailed("app.Blank".to_string()));

    let err = factory.new_proxy_class(&name("app.Missing")).unwrap_err();
    assert!(matches!(err, ProxyError::Resolution { .. }));

    assert!(factory.registry().is_empty());
    assert!(sink.defined.is_empty());
    assert!(!factory.parser().is_cached(&name("app.Broken")));
}

#[test]
fn test_factory_activation_failure() {
    let sink = Arc::new(CollectingSink {
        reject: true,
        ..CollectingSink::default()
    });
    let factory = ProxyFactory::new(sink).with_parser(parser_with(&[("app.Widget", WIDGET)]));

    let err = factory.generate(&name("app.Widget")).unwrap_err();
    assert!(matches!(err, ProxyError::ActivationFailed { .. }));
    assert_eq!(err.failed_stage(), GenerationStage::Activated);
    assert!(factory.registry().is_empty());
    // caches survive the failure
    assert!(factory.parser().is_cached(&name("app.Widget")));
}

#[test]
fn test_factory_proxies_a_proxy() {
    let (factory, _) = factory_with(&[("app.Widget", WIDGET)]);
    let first = factory.generate(&name("app.Widget")).unwrap();

    // make the generated source resolvable and proxy it again
    let (second_factory, _) = factory_with(&[
        ("app.Widget", WIDGET),
        (first.identity.proxy_name.as_str(), first.source.as_str()),
    ]);
    let second = second_factory
        .generate(&first.identity.proxy_name)
        .unwrap();
    let class = proxy_class(&second.tree);
    assert_eq!(class.extends.as_deref(), Some(first.identity.proxy_name.as_str()));
    assert_eq!(
        class.methods().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        vec!["compute", "scale", "__before", "__after", "__instance"]
    );
}

#[test]
fn test_replaceable_printer_and_parser() {
    let (factory, _) = factory_with(&[("app.Widget", WIDGET)]);
    assert_eq!(factory.printer().name(), "standard");

    factory.set_printer(Arc::new(StandardPrinter::with_indent(2)));
    let output = factory.generate(&name("app.Widget")).unwrap();
    assert!(output.source.contains("\n  public fn compute("));

    let replacement = parser_with(&[]);
    factory.set_parser(replacement.clone());
    assert!(Arc::ptr_eq(&factory.parser(), &replacement));
    assert!(factory.new_proxy_class(&name("app.Widget")).is_err());
}

#[test]
fn test_single_flight_lock_is_shared_per_class() {
    let (factory, _) = factory_with(&[]);
    let a = factory.single_flight(&name("app.Widget"));
    let b = factory.single_flight(&name("APP.WIDGET"));
    let c = factory.single_flight(&name("app.Other"));
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));

    let _guard = a.lock();
    assert!(b.try_lock().is_none());
    assert!(c.try_lock().is_some());
}

#[test]
fn test_registry_rejects_duplicates() {
    let registry = ActivationRegistry::new();
    let identity = ProxyIdentity::with_suffix(&name("a.B"), "d").unwrap();
    let handle = TypeHandle {
        name: identity.proxy_name.clone(),
        methods: vec![],
    };
    registry.record(identity.clone(), handle.clone()).unwrap();
    assert_eq!(
        registry.record(identity, handle),
        Err(ActivationError::Duplicate("a.B_d".to_string()))
    );
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_factory_async_matches_sync() {
    let (factory, _) = factory_with(&[("app.Widget", WIDGET)]);
    let output = factory.generate_async(&name("app.Widget")).await.unwrap();
    let sync = factory.generate(&name("app.Widget")).unwrap();

    let mut renamed = output.tree.clone();
    if let Declaration::Class(class) = &mut renamed.declarations[0] {
        class.name = sync.identity.proxy_name.short_name().to_string();
    }
    assert_eq!(renamed, sync.tree);
}

#[tokio::test(flavor = "current_thread")]
async fn test_async_mode_reads_files_off_the_worker() {
    let root = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("app")).unwrap();
    std::fs::write(root.path().join("app/Widget.wv"), WIDGET).unwrap();
    let chain = ResolverChain::new()
        .with(crate::source::FileSourceResolver::new([root.path()]))
        .with(BuiltinSourceResolver);
    let parser = AstParser::new(Arc::new(chain), IoMode::Async);

    let tree = parser.get_or_parse_async(&name("app.Widget")).await.unwrap();
    assert_eq!(*tree, WeaveParser::new().parse(WIDGET).unwrap());
    // builtin units have no path and resolve inline
    assert!(parser
        .get_or_parse_async(&name(crate::source::ASPECT_CLASS))
        .await
        .is_ok());
    let err = parser
        .get_or_parse_async(&name("app.Missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProxyError::Resolution { .. }));
}
