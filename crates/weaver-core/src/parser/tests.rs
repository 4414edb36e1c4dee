use super::*;
use crate::ast::*;

fn parse(source: &str) -> SyntaxTree {
    WeaveParser::new().parse(source).expect("source should parse")
}

fn parse_expr(source: &str) -> Expr {
    let tree = parse(&format!("class T {{ fn m() {{ return {source}; }} }}"));
    let Declaration::Class(class) = &tree.declarations[0] else {
        panic!("expected class");
    };
    match &class.method("m").unwrap().body.0[0] {
        Stmt::Return(Some(expr)) => expr.clone(),
        other => panic!("unexpected statement {other:?}"),
    }
}

#[test]
fn test_create_parser() {
    let parser = create_parser("weave").unwrap();
    assert_eq!(parser.name(), "weave");
    assert!(create_parser("cobol").is_err());
}

#[test]
fn test_package_imports_and_class() {
    let tree = parse(
        r#"
        package app.model;

        import lib.util.Clock;
        import lib.util.Random as Rng;

        final class Widget extends app.base.Component {
            private let factor: int = 2;

            public fn compute(x: int) -> int {
                return x * self.factor;
            }
        }
        "#,
    );

    assert_eq!(tree.package.as_deref(), Some("app.model"));
    assert_eq!(tree.imports.len(), 2);
    assert_eq!(tree.imports[1].visible_name(), "Rng");

    let Declaration::Class(class) = &tree.declarations[0] else {
        panic!("expected class");
    };
    assert_eq!(class.name, "Widget");
    assert!(class.is_final);
    assert_eq!(class.extends.as_deref(), Some("app.base.Component"));
    assert_eq!(class.members.len(), 2);

    let Member::Property(prop) = &class.members[0] else {
        panic!("expected property");
    };
    assert_eq!(prop.modifiers.visibility, Visibility::Private);
    assert_eq!(prop.default, Some(Expr::Int(2)));

    let method = class.method("compute").unwrap();
    assert_eq!(method.params.len(), 1);
    assert_eq!(method.return_type, Some(TypeRef::named("int")));
}

#[test]
fn test_trait_and_modifiers() {
    let tree = parse(
        r#"
        trait Hooks {
            protected static final fn helper(a, b = 3) {}
        }
        "#,
    );
    let Declaration::Trait(tr) = &tree.declarations[0] else {
        panic!("expected trait");
    };
    let Member::Method(method) = &tr.members[0] else {
        panic!("expected method");
    };
    assert_eq!(method.modifiers.visibility, Visibility::Protected);
    assert!(method.modifiers.is_static);
    assert!(method.modifiers.is_final);
    assert_eq!(method.params[1].default, Some(Expr::Int(3)));
}

#[test]
fn test_precedence() {
    assert_eq!(
        parse_expr("1 + 2 * 3"),
        Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Int(1)),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Multiply,
                left: Box::new(Expr::Int(2)),
                right: Box::new(Expr::Int(3)),
            }),
        }
    );

    // left associativity
    assert_eq!(
        parse_expr("a - b - c"),
        Expr::Binary {
            op: BinaryOp::Subtract,
            left: Box::new(Expr::Binary {
                op: BinaryOp::Subtract,
                left: Box::new(Expr::var("a")),
                right: Box::new(Expr::var("b")),
            }),
            right: Box::new(Expr::var("c")),
        }
    );

    assert!(matches!(
        parse_expr("a || b && c"),
        Expr::Binary {
            op: BinaryOp::Or,
            ..
        }
    ));
}

#[test]
fn test_negative_literals_fold() {
    assert_eq!(parse_expr("-5"), Expr::Int(-5));
    assert_eq!(parse_expr("-2.5"), Expr::Float(-2.5));
    assert_eq!(
        parse_expr("-x"),
        Expr::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(Expr::var("x")),
        }
    );
}

#[test]
fn test_calls() {
    assert_eq!(
        parse_expr("super.compute(x, 1)"),
        Expr::SuperCall {
            method: "compute".to_string(),
            args: vec![Expr::var("x"), Expr::Int(1)],
        }
    );
    assert_eq!(
        parse_expr("lib.Factory::make()"),
        Expr::StaticCall {
            class: "lib.Factory".to_string(),
            method: "make".to_string(),
            args: vec![],
        }
    );
    assert_eq!(
        parse_expr("Self::__instance()"),
        Expr::StaticCall {
            class: "Self".to_string(),
            method: "__instance".to_string(),
            args: vec![],
        }
    );
    assert_eq!(
        parse_expr("new Gadget(1)"),
        Expr::New {
            class: "Gadget".to_string(),
            args: vec![Expr::Int(1)],
        }
    );
    assert_eq!(
        parse_expr("len(items)"),
        Expr::FunctionCall {
            name: "len".to_string(),
            args: vec![Expr::var("items")],
        }
    );
    // a dotted path without `::` is property access on a variable
    assert_eq!(
        parse_expr("a.b.c(1)"),
        Expr::MethodCall {
            object: Box::new(Expr::Property {
                object: Box::new(Expr::var("a")),
                name: "b".to_string(),
            }),
            method: "c".to_string(),
            args: vec![Expr::Int(1)],
        }
    );
}

#[test]
fn test_collections() {
    assert_eq!(
        parse_expr("[1, 2,]"),
        Expr::List(vec![Expr::Int(1), Expr::Int(2)])
    );
    assert_eq!(
        parse_expr(r#"{"k": 1, "v": [x]}"#),
        Expr::Map(vec![
            ("k".to_string(), Expr::Int(1)),
            ("v".to_string(), Expr::List(vec![Expr::var("x")])),
        ])
    );
    assert_eq!(
        parse_expr("xs[0]"),
        Expr::Index {
            object: Box::new(Expr::var("xs")),
            index: Box::new(Expr::Int(0)),
        }
    );
}

#[test]
fn test_statements() {
    let tree = parse(
        r#"
        class Loop {
            fn run(items) {
                let total: int = 0;
                for (item in items) {
                    if (item == 3) {
                        continue;
                    } else if (item > 10) {
                        break;
                    } else {
                        total = total + item;
                    }
                }
                while (total > 100) {
                    total = total - 1;
                }
                self.last = total;
                return;
            }
        }
        "#,
    );
    let Declaration::Class(class) = &tree.declarations[0] else {
        panic!("expected class");
    };
    let body = &class.method("run").unwrap().body.0;
    assert_eq!(body.len(), 5);
    assert!(matches!(body[1], Stmt::For { .. }));
    assert!(matches!(body[2], Stmt::While { .. }));
    assert!(matches!(
        &body[3],
        Stmt::Assign {
            target: LValue::Property { .. },
            ..
        }
    ));
    assert_eq!(body[4], Stmt::Return(None));

    let Stmt::For { body: loop_body, .. } = &body[1] else {
        unreachable!()
    };
    let Stmt::If { else_branch, .. } = &loop_body.0[0] else {
        panic!("expected if");
    };
    let chained = else_branch.as_ref().unwrap();
    assert!(matches!(chained.0.as_slice(), [Stmt::If { .. }]));
}

#[test]
fn test_syntax_errors_carry_position() {
    let parser = WeaveParser::new();

    let err = parser.parse("class A {\n  fn m( {}\n}").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(err.message.contains("identifier"), "{}", err.message);

    let err = parser.parse("class A { fn m() { 1 + ; } }").unwrap_err();
    assert!(err.message.contains("expected expression"), "{}", err.message);

    let err = parser.parse("class A { fn m() { 1 = 2; } }").unwrap_err();
    assert!(err.message.contains("invalid assignment target"));

    let err = parser.parse("class A {").unwrap_err();
    assert!(err.message.contains("end of input"));

    let err = parser.parse("final trait T {}").unwrap_err();
    assert!(err.message.contains("'class'"));

    let err = parser.parse("class A { fn m(a, a) {} }").unwrap_err();
    assert!(err.message.contains("duplicate parameter"));

    let err = parser.parse("class if {}").unwrap_err();
    assert!(err.message.contains("identifier"));
}

#[test]
fn test_parse_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Empty.wv");
    std::fs::write(&path, "package p; class Empty {}").unwrap();

    let tree = WeaveParser::new().parse_file(&path).unwrap();
    assert_eq!(tree.classes().count(), 1);
    assert!(WeaveParser::new()
        .parse_file(&dir.path().join("Missing.wv"))
        .is_err());
}
