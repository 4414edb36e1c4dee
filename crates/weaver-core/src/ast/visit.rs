// Structural traversal over syntax trees
//
// `Node` is the closed set of node kinds a structural search can stop at.
// Expressions and statements are not nodes of their own; the walker descends
// through them and only surfaces the class references they contain.

use super::*;

/// Where a class reference was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRefKind {
    Extends,
    New,
    StaticCall,
    TypeAnnotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameRef<'a> {
    pub kind: NameRefKind,
    pub name: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Class(&'a ClassDecl),
    Trait(&'a TraitDecl),
    Method(&'a MethodNode),
    Params(&'a [Param]),
    Block(&'a Block),
    NameRef(NameRef<'a>),
}

/// Walk every node of a tree in source order, parents before children
pub fn walk<'a>(tree: &'a SyntaxTree, visitor: &mut impl FnMut(Node<'a>)) {
    for decl in &tree.declarations {
        walk_declaration(decl, visitor);
    }
}

pub fn walk_declaration<'a>(decl: &'a Declaration, visitor: &mut impl FnMut(Node<'a>)) {
    match decl {
        Declaration::Class(class) => {
            visitor(Node::Class(class));
            if let Some(parent) = &class.extends {
                visitor(Node::NameRef(NameRef {
                    kind: NameRefKind::Extends,
                    name: parent,
                }));
            }
            walk_members(&class.members, visitor);
        }
        Declaration::Trait(tr) => {
            visitor(Node::Trait(tr));
            walk_members(&tr.members, visitor);
        }
    }
}

fn walk_members<'a>(members: &'a [Member], visitor: &mut impl FnMut(Node<'a>)) {
    for member in members {
        match member {
            Member::Property(prop) => {
                if let Some(ty) = &prop.type_annotation {
                    visit_type(ty, visitor);
                }
                if let Some(default) = &prop.default {
                    walk_expr(default, visitor);
                }
            }
            Member::Method(method) => walk_method(method, visitor),
        }
    }
}

pub fn walk_method<'a>(method: &'a MethodNode, visitor: &mut impl FnMut(Node<'a>)) {
    visitor(Node::Method(method));
    visitor(Node::Params(&method.params));
    for param in &method.params {
        if let Some(ty) = &param.type_annotation {
            visit_type(ty, visitor);
        }
        if let Some(default) = &param.default {
            walk_expr(default, visitor);
        }
    }
    if let Some(ty) = &method.return_type {
        visit_type(ty, visitor);
    }
    walk_block(&method.body, visitor);
}

fn visit_type<'a>(ty: &'a TypeRef, visitor: &mut impl FnMut(Node<'a>)) {
    visitor(Node::NameRef(NameRef {
        kind: NameRefKind::TypeAnnotation,
        name: &ty.name,
    }));
}

fn walk_block<'a>(block: &'a Block, visitor: &mut impl FnMut(Node<'a>)) {
    visitor(Node::Block(block));
    for stmt in &block.0 {
        match stmt {
            Stmt::Let {
                type_annotation,
                value,
                ..
            } => {
                if let Some(ty) = type_annotation {
                    visit_type(ty, visitor);
                }
                walk_expr(value, visitor);
            }
            Stmt::Assign { target, value } => {
                match target {
                    LValue::Variable(_) => {}
                    LValue::Property { object, .. } => walk_expr(object, visitor),
                    LValue::Index { object, index } => {
                        walk_expr(object, visitor);
                        walk_expr(index, visitor);
                    }
                }
                walk_expr(value, visitor);
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => walk_expr(expr, visitor),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                walk_expr(condition, visitor);
                walk_block(then_branch, visitor);
                if let Some(else_block) = else_branch {
                    walk_block(else_block, visitor);
                }
            }
            Stmt::While { condition, body } => {
                walk_expr(condition, visitor);
                walk_block(body, visitor);
            }
            Stmt::For { iterable, body, .. } => {
                walk_expr(iterable, visitor);
                walk_block(body, visitor);
            }
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

fn walk_expr<'a>(expr: &'a Expr, visitor: &mut impl FnMut(Node<'a>)) {
    match expr {
        Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Variable(_)
        | Expr::SelfRef => {}
        Expr::List(items) => items.iter().for_each(|e| walk_expr(e, visitor)),
        Expr::Map(entries) => entries.iter().for_each(|(_, e)| walk_expr(e, visitor)),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, visitor);
            walk_expr(right, visitor);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visitor),
        Expr::Property { object, .. } => walk_expr(object, visitor),
        Expr::Index { object, index } => {
            walk_expr(object, visitor);
            walk_expr(index, visitor);
        }
        Expr::MethodCall { object, args, .. } => {
            walk_expr(object, visitor);
            args.iter().for_each(|e| walk_expr(e, visitor));
        }
        Expr::SuperCall { args, .. } | Expr::FunctionCall { args, .. } => {
            args.iter().for_each(|e| walk_expr(e, visitor))
        }
        Expr::StaticCall { class, args, .. } => {
            visitor(Node::NameRef(NameRef {
                kind: NameRefKind::StaticCall,
                name: class,
            }));
            args.iter().for_each(|e| walk_expr(e, visitor));
        }
        Expr::New { class, args } => {
            visitor(Node::NameRef(NameRef {
                kind: NameRefKind::New,
                name: class,
            }));
            args.iter().for_each(|e| walk_expr(e, visitor));
        }
    }
}

/// Every method declared anywhere in the tree, classes and traits alike
pub fn find_methods(tree: &SyntaxTree) -> Vec<&MethodNode> {
    let mut methods = Vec::new();
    walk(tree, &mut |node| {
        if let Node::Method(method) = node {
            methods.push(method);
        }
    });
    methods
}

/// Every class reference in the tree
pub fn find_name_refs(tree: &SyntaxTree) -> Vec<NameRef<'_>> {
    let mut refs = Vec::new();
    walk(tree, &mut |node| {
        if let Node::NameRef(name_ref) = node {
            refs.push(name_ref);
        }
    });
    refs
}

/// Rewrite class references inside one method in place.
///
/// `rename` receives each reference (`new X`, `X::m()`, and every type
/// annotation) and returns the replacement, or `None` to leave it alone.
pub fn rewrite_name_refs(
    method: &mut MethodNode,
    rename: &mut impl FnMut(NameRefKind, &str) -> Option<String>,
) {
    for param in &mut method.params {
        if let Some(ty) = &mut param.type_annotation {
            rewrite_type(ty, rename);
        }
        if let Some(default) = &mut param.default {
            rewrite_expr(default, rename);
        }
    }
    if let Some(ty) = &mut method.return_type {
        rewrite_type(ty, rename);
    }
    rewrite_block(&mut method.body, rename);
}

fn rewrite_type(ty: &mut TypeRef, rename: &mut impl FnMut(NameRefKind, &str) -> Option<String>) {
    if let Some(new_name) = rename(NameRefKind::TypeAnnotation, &ty.name) {
        ty.name = new_name;
    }
}

fn rewrite_block(block: &mut Block, rename: &mut impl FnMut(NameRefKind, &str) -> Option<String>) {
    for stmt in &mut block.0 {
        match stmt {
            Stmt::Let {
                type_annotation,
                value,
                ..
            } => {
                if let Some(ty) = type_annotation {
                    rewrite_type(ty, rename);
                }
                rewrite_expr(value, rename);
            }
            Stmt::Assign { target, value } => {
                match target {
                    LValue::Variable(_) => {}
                    LValue::Property { object, .. } => rewrite_expr(object, rename),
                    LValue::Index { object, index } => {
                        rewrite_expr(object, rename);
                        rewrite_expr(index, rename);
                    }
                }
                rewrite_expr(value, rename);
            }
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => rewrite_expr(expr, rename),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                rewrite_expr(condition, rename);
                rewrite_block(then_branch, rename);
                if let Some(else_block) = else_branch {
                    rewrite_block(else_block, rename);
                }
            }
            Stmt::While { condition, body } => {
                rewrite_expr(condition, rename);
                rewrite_block(body, rename);
            }
            Stmt::For { iterable, body, .. } => {
                rewrite_expr(iterable, rename);
                rewrite_block(body, rename);
            }
            Stmt::Return(None) | Stmt::Break | Stmt::Continue => {}
        }
    }
}

fn rewrite_expr(expr: &mut Expr, rename: &mut impl FnMut(NameRefKind, &str) -> Option<String>) {
    match expr {
        Expr::Int(_)
        | Expr::Float(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Null
        | Expr::Variable(_)
        | Expr::SelfRef => {}
        Expr::List(items) => items.iter_mut().for_each(|e| rewrite_expr(e, rename)),
        Expr::Map(entries) => entries
            .iter_mut()
            .for_each(|(_, e)| rewrite_expr(e, rename)),
        Expr::Binary { left, right, .. } => {
            rewrite_expr(left, rename);
            rewrite_expr(right, rename);
        }
        Expr::Unary { operand, .. } => rewrite_expr(operand, rename),
        Expr::Property { object, .. } => rewrite_expr(object, rename),
        Expr::Index { object, index } => {
            rewrite_expr(object, rename);
            rewrite_expr(index, rename);
        }
        Expr::MethodCall { object, args, .. } => {
            rewrite_expr(object, rename);
            args.iter_mut().for_each(|e| rewrite_expr(e, rename));
        }
        Expr::SuperCall { args, .. } | Expr::FunctionCall { args, .. } => {
            args.iter_mut().for_each(|e| rewrite_expr(e, rename))
        }
        Expr::StaticCall { class, args, .. } => {
            if let Some(new_name) = rename(NameRefKind::StaticCall, class) {
                *class = new_name;
            }
            args.iter_mut().for_each(|e| rewrite_expr(e, rename));
        }
        Expr::New { class, args } => {
            if let Some(new_name) = rename(NameRefKind::New, class) {
                *class = new_name;
            }
            args.iter_mut().for_each(|e| rewrite_expr(e, rename));
        }
    }
}
