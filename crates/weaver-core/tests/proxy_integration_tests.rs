/*!
# Proxy Integration Tests

End-to-end proxy generation from on-disk source roots through activation
and invocation on the runtime.
*/

use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use tempfile::TempDir;
use weaver_core::{
    ClassName, CollisionPolicy, IoMode, Parser, Pointcut, ProxyError, ProxyPolicy, Value,
    WeaveParser, Weaver, WeaverConfig, WeaverError,
};

const WIDGET: &str = r#"
package app;

import app.util.Math;

class Widget {
    let factor = 2;

    fn compute(x: int) -> int {
        return Math::times(x, self.factor);
    }

    fn describe(label = "widget") {
        return label + ":" + str(self.factor);
    }
}
"#;

const MATH: &str = r#"
package app.util;

class Math {
    static fn times(a, b) {
        return a * b;
    }
}
"#;

fn write_source(root: &Path, relative: &str, text: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn source_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_source(dir.path(), "app/Widget.wv", WIDGET);
    write_source(dir.path(), "app/util/Math.wv", MATH);
    dir
}

fn weaver_for(root: &TempDir) -> Weaver {
    Weaver::new(WeaverConfig {
        source_roots: vec![root.path().to_path_buf()],
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_widget_proxy_computes_like_the_original() -> anyhow::Result<()> {
    let root = source_root();
    let weaver = weaver_for(&root);

    let proxy = weaver.proxy("app.Widget")?;
    assert_eq!(proxy.package(), Some("app"));
    assert!(proxy.short_name().starts_with("Widget_"));

    let widget = weaver.instantiate(&proxy, vec![])?;
    assert_eq!(
        weaver.call(&widget, "compute", vec![Value::Integer(5)])?,
        Value::Integer(10)
    );
    assert_eq!(
        weaver.call(&widget, "describe", vec![])?,
        Value::String("widget:2".to_string())
    );

    let record = weaver.factory().registry().get(&proxy).unwrap();
    assert_eq!(record.identity.original_name, ClassName::parse("app.Widget")?);
    Ok(())
}

#[test]
fn test_advice_wraps_proxied_calls() -> anyhow::Result<()> {
    let root = source_root();
    let weaver = weaver_for(&root);
    let proxy = weaver.proxy("app.Widget")?;

    let calls = Arc::new(Mutex::new(Vec::new()));
    let log = calls.clone();
    weaver.advice().before(Pointcut::new("app.Widget", "*")?, 0, move |jp| {
        log.lock().unwrap().push((jp.method.clone(), jp.args.clone()));
        Ok(())
    });
    weaver
        .advice()
        .after(Pointcut::new("app.Widget", "compute")?, 0, |_, result| {
            Ok(match result {
                Value::Integer(n) => Some(Value::Integer(n * 100)),
                _ => None,
            })
        });

    let widget = weaver.instantiate(&proxy, vec![])?;
    assert_eq!(
        weaver.call(&widget, "compute", vec![Value::Integer(5)])?,
        Value::Integer(1000)
    );
    weaver.call(&widget, "describe", vec![Value::from("w")])?;

    let calls = calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![
            ("compute".to_string(), vec![Value::Integer(5)]),
            ("describe".to_string(), vec![Value::from("w")]),
        ]
    );
    Ok(())
}

#[test]
fn test_every_request_gets_a_fresh_proxy() -> anyhow::Result<()> {
    let root = source_root();
    let weaver = weaver_for(&root);

    let first = weaver.generate("app.Widget")?;
    let second = weaver.generate("app.Widget")?;
    assert_ne!(first.identity.proxy_name, second.identity.proxy_name);
    // same input, same shape: only the generated name differs
    let normalize = |source: &str, suffix: &str| source.replace(suffix, "SUFFIX");
    assert_eq!(
        normalize(&first.source, &first.identity.suffix),
        normalize(&second.source, &second.identity.suffix)
    );
    // the original was parsed once
    assert!(weaver.parser().is_cached(&ClassName::parse("app.Widget")?));
    assert_eq!(
        weaver
            .factory()
            .registry()
            .proxies_of(&ClassName::parse("app.widget")?)
            .len(),
        2
    );
    Ok(())
}

#[test]
fn test_printed_source_reparses_to_the_generated_tree() -> anyhow::Result<()> {
    let root = source_root();
    let weaver = weaver_for(&root);
    let output = weaver.generate("app.Widget")?;
    let reparsed = WeaveParser::new().parse(&output.source)?;
    assert_eq!(reparsed, output.tree);
    Ok(())
}

#[test]
fn test_failures_propagate_and_leave_no_record() {
    let root = source_root();
    write_source(root.path(), "app/Broken.wv", "package app; class Broken { fn x( }");
    write_source(root.path(), "app/Sealed.wv", "package app; final class Sealed { }");
    write_source(root.path(), "app/Shape.wv", "package app; trait Shape { }");
    let weaver = weaver_for(&root);

    let cases = [
        ("app.Missing", "resolution"),
        ("app.Broken", "parse"),
        ("app.Sealed", "rewrite"),
        ("app.Shape", "not a class"),
    ];
    for (class, kind) in cases {
        let err = weaver.proxy(class).unwrap_err();
        let WeaverError::Proxy(proxy_err) = &err else {
            panic!("{class}: expected a proxy error, got {err}");
        };
        let matched = match kind {
            "resolution" => matches!(proxy_err, ProxyError::Resolution { .. }),
            "parse" => matches!(proxy_err, ProxyError::Parse { .. }),
            "rewrite" => matches!(proxy_err, ProxyError::Rewrite { .. }),
            _ => matches!(proxy_err, ProxyError::NotAClass(_)),
        };
        assert!(matched, "{class}: expected {kind} error, got {proxy_err}");
    }
    assert!(weaver.factory().registry().is_empty());
    assert!(matches!(
        weaver.proxy("not a name"),
        Err(WeaverError::ClassName(_))
    ));
}

#[test]
fn test_aspect_override_from_config() -> anyhow::Result<()> {
    let root = source_root();
    let aspect_dir = TempDir::new()?;
    let aspect_path = aspect_dir.path().join("Tracing.wv");
    fs::write(
        &aspect_path,
        r#"
        package weaver.aop;
        trait Aspect {
            protected fn __before(ctx: map) { print("enter", ctx.method); }
            protected fn __after(ctx: map, result) { print("leave", ctx.method); return result; }
            static fn __instance() { return new Self(); }
        }
        "#,
    )?;
    let weaver = Weaver::new(WeaverConfig {
        source_roots: vec![root.path().to_path_buf()],
        aspect_source: Some(aspect_path),
        ..Default::default()
    })?;

    let proxy = weaver.proxy("app.Widget")?;
    let widget = weaver.instantiate(&proxy, vec![])?;
    weaver.call(&widget, "compute", vec![Value::Integer(1)])?;
    assert_eq!(
        weaver.runtime().take_output(),
        vec!["enter compute".to_string(), "leave compute".to_string()]
    );
    Ok(())
}

#[test]
fn test_config_from_json_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("weaver.json");
    fs::write(
        &path,
        r#"{
            "source_roots": ["src/weave"],
            "io_mode": "async",
            "policy": { "wrap_private": true, "on_hook_collision": "hook_wins" }
        }"#,
    )?;
    let config = WeaverConfig::from_json_file(&path)?;
    assert_eq!(config.source_roots, vec![Path::new("src/weave").to_path_buf()]);
    assert_eq!(config.io_mode, IoMode::Async);
    assert_eq!(
        config.policy,
        ProxyPolicy {
            wrap_private: true,
            on_hook_collision: CollisionPolicy::HookWins,
        }
    );
    assert_eq!(config.file_extension, "wv");
    assert_eq!(config.max_call_depth, WeaverConfig::default().max_call_depth);

    assert!(matches!(
        WeaverConfig::from_json_file(dir.path().join("missing.json")),
        Err(WeaverError::Io(_))
    ));
    fs::write(&path, "{ not json")?;
    assert!(matches!(
        WeaverConfig::from_json_file(&path),
        Err(WeaverError::Json(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_async_io_matches_blocking() -> anyhow::Result<()> {
    let root = source_root();
    let blocking = weaver_for(&root);
    let asynchronous = Weaver::new(WeaverConfig {
        source_roots: vec![root.path().to_path_buf()],
        io_mode: IoMode::Async,
        ..Default::default()
    })?;

    let class = ClassName::parse("app.Widget")?;
    let sync_tree = blocking.parser().get_or_parse(&class)?;
    let async_tree = asynchronous.parser().get_or_parse_async(&class).await?;
    assert_eq!(*sync_tree, *async_tree);

    let proxy = asynchronous.proxy_async("app.Widget").await?;
    let widget = asynchronous.instantiate(&proxy, vec![])?;
    assert_eq!(
        asynchronous.call(&widget, "compute", vec![Value::Integer(21)])?,
        Value::Integer(42)
    );
    Ok(())
}

#[test]
fn test_concurrent_requests_for_one_class() -> anyhow::Result<()> {
    let root = source_root();
    let weaver = Arc::new(weaver_for(&root));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let weaver = Arc::clone(&weaver);
            std::thread::spawn(move || weaver.proxy("app.Widget"))
        })
        .collect();
    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.join().unwrap()?);
    }
    names.sort_by(|a, b| a.key().cmp(b.key()));
    names.dedup();
    assert_eq!(names.len(), 4);
    assert_eq!(weaver.factory().registry().len(), 4);
    Ok(())
}

#[test]
fn test_tracing_init_is_idempotent() {
    // an explicit directive needs no environment changes, and later calls are no-ops
    weaver_core::init_tracing_with("weaver_core=debug");
    weaver_core::init_tracing();
    weaver_core::init_tracing_with(weaver_core::DEFAULT_LOG_DIRECTIVE);
}

#[test]
fn test_inherited_hook_name_blocks_the_proxy() -> anyhow::Result<()> {
    let root = source_root();
    write_source(
        root.path(),
        "app/Base.wv",
        r#"package app; class Base {
            fn __before(x) { return "base-" + str(x); }
            fn greet() { return self.__before(1); }
        }"#,
    );
    write_source(
        root.path(),
        "app/Gadget.wv",
        "package app; class Gadget extends Base { fn compute(x) { return x * 2; } }",
    );
    let weaver = weaver_for(&root);

    let err = weaver.proxy("app.Gadget").unwrap_err();
    assert!(
        matches!(&err, WeaverError::Proxy(ProxyError::Rewrite { reason, .. }) if reason.contains("__before")),
        "{err}"
    );
    assert!(weaver.factory().registry().is_empty());

    // the original keeps its behaviour
    let gadget = weaver.instantiate(&ClassName::parse("app.Gadget")?, vec![])?;
    assert_eq!(
        weaver.call(&gadget, "greet", vec![])?,
        Value::String("base-1".to_string())
    );
    Ok(())
}
