// Source code generation from the syntax tree
// Output of the standard printer parses back to an equal tree

use super::*;

/// Trait for nodes that can generate their source code representation
pub trait ToSource {
    fn to_source(&self) -> String;
}

/// Serializes a whole syntax tree back into source text.
///
/// Implementations must be pure: the same tree always prints the same text,
/// and that text must parse back into an equivalent tree.
pub trait CodePrinter: Send + Sync {
    fn print(&self, tree: &SyntaxTree) -> String;

    /// Printer name for logging
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Default pretty printer: one member per block, four-space indentation
#[derive(Debug, Clone)]
pub struct StandardPrinter {
    indent: String,
}

impl Default for StandardPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardPrinter {
    pub fn new() -> Self {
        Self::with_indent(4)
    }

    pub fn with_indent(width: usize) -> Self {
        Self {
            indent: " ".repeat(width),
        }
    }

    fn pad(&self, level: usize) -> String {
        self.indent.repeat(level)
    }

    fn write_declaration(&self, out: &mut String, decl: &Declaration, level: usize) {
        let pad = self.pad(level);
        let members = match decl {
            Declaration::Class(class) => {
                out.push_str(&pad);
                if class.is_final {
                    out.push_str("final ");
                }
                out.push_str(&format!("class {}", class.name));
                if let Some(parent) = &class.extends {
                    out.push_str(&format!(" extends {parent}"));
                }
                &class.members
            }
            Declaration::Trait(tr) => {
                out.push_str(&format!("{pad}trait {}", tr.name));
                &tr.members
            }
        };
        out.push_str(" {\n");
        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.write_member(out, member, level + 1);
        }
        out.push_str(&pad);
        out.push_str("}\n");
    }

    fn write_member(&self, out: &mut String, member: &Member, level: usize) {
        match member {
            Member::Property(prop) => {
                out.push_str(&self.pad(level));
                out.push_str(&prop.modifiers.to_source());
                out.push_str(&format!("let {}", prop.name));
                if let Some(ty) = &prop.type_annotation {
                    out.push_str(&format!(": {}", ty.to_source()));
                }
                if let Some(default) = &prop.default {
                    out.push_str(&format!(" = {}", default.to_source()));
                }
                out.push_str(";\n");
            }
            Member::Method(method) => self.write_method(out, method, level),
        }
    }

    fn write_method(&self, out: &mut String, method: &MethodNode, level: usize) {
        let params = method
            .params
            .iter()
            .map(|p| p.to_source())
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&self.pad(level));
        out.push_str(&method.modifiers.to_source());
        out.push_str(&format!("fn {}({params})", method.name));
        if let Some(ret) = &method.return_type {
            out.push_str(&format!(" -> {}", ret.to_source()));
        }
        out.push(' ');
        self.write_block(out, &method.body, level);
        out.push('\n');
    }

    /// Writes `{ ... }` starting at the current column; the closing brace is
    /// indented to `level` and not followed by a newline
    fn write_block(&self, out: &mut String, block: &Block, level: usize) {
        out.push_str("{\n");
        for stmt in &block.0 {
            self.write_stmt(out, stmt, level + 1);
        }
        out.push_str(&self.pad(level));
        out.push('}');
    }

    fn write_stmt(&self, out: &mut String, stmt: &Stmt, level: usize) {
        out.push_str(&self.pad(level));
        match stmt {
            Stmt::Let {
                name,
                type_annotation,
                value,
            } => {
                out.push_str(&format!("let {name}"));
                if let Some(ty) = type_annotation {
                    out.push_str(&format!(": {}", ty.to_source()));
                }
                out.push_str(&format!(" = {};", value.to_source()));
            }
            Stmt::Assign { target, value } => {
                out.push_str(&format!("{} = {};", target.to_source(), value.to_source()));
            }
            Stmt::Expr(expr) => {
                out.push_str(&expr.to_source());
                out.push(';');
            }
            Stmt::Return(value) => match value {
                Some(v) => out.push_str(&format!("return {};", v.to_source())),
                None => out.push_str("return;"),
            },
            Stmt::If { .. } => self.write_if(out, stmt, level),
            Stmt::While { condition, body } => {
                out.push_str(&format!("while ({}) ", condition.to_source()));
                self.write_block(out, body, level);
            }
            Stmt::For {
                variable,
                iterable,
                body,
            } => {
                out.push_str(&format!("for ({variable} in {}) ", iterable.to_source()));
                self.write_block(out, body, level);
            }
            Stmt::Break => out.push_str("break;"),
            Stmt::Continue => out.push_str("continue;"),
        }
        out.push('\n');
    }

    // `else if` chains stay flat: an else block holding a single `if` prints inline
    fn write_if(&self, out: &mut String, stmt: &Stmt, level: usize) {
        let Stmt::If {
            condition,
            then_branch,
            else_branch,
        } = stmt
        else {
            return;
        };
        out.push_str(&format!("if ({}) ", condition.to_source()));
        self.write_block(out, then_branch, level);
        if let Some(else_block) = else_branch {
            out.push_str(" else ");
            match else_block.0.as_slice() {
                [nested @ Stmt::If { .. }] => self.write_if(out, nested, level),
                _ => self.write_block(out, else_block, level),
            }
        }
    }
}

impl CodePrinter for StandardPrinter {
    fn print(&self, tree: &SyntaxTree) -> String {
        let mut out = String::new();
        if let Some(pkg) = &tree.package {
            out.push_str(&format!("package {pkg};\n\n"));
        }
        for import in &tree.imports {
            out.push_str(&import.to_source());
            out.push('\n');
        }
        if !tree.imports.is_empty() {
            out.push('\n');
        }
        for (i, decl) in tree.declarations.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            self.write_declaration(&mut out, decl, 0);
        }
        out
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

impl ToSource for SyntaxTree {
    fn to_source(&self) -> String {
        StandardPrinter::new().print(self)
    }
}

impl ToSource for MethodNode {
    fn to_source(&self) -> String {
        let mut out = String::new();
        StandardPrinter::new().write_method(&mut out, self, 0);
        out
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        let mut out = String::new();
        StandardPrinter::new().write_stmt(&mut out, self, 0);
        out.trim_end().to_string()
    }
}

impl ToSource for Import {
    fn to_source(&self) -> String {
        match &self.alias {
            Some(alias) => format!("import {} as {alias};", self.path),
            None => format!("import {};", self.path),
        }
    }
}

impl ToSource for Modifiers {
    /// Keyword prefix including a trailing space
    fn to_source(&self) -> String {
        let mut result = format!("{} ", self.visibility.keyword());
        if self.is_static {
            result.push_str("static ");
        }
        if self.is_final {
            result.push_str("final ");
        }
        result
    }
}

impl ToSource for Param {
    fn to_source(&self) -> String {
        let mut result = self.name.clone();
        if let Some(ty) = &self.type_annotation {
            result.push_str(&format!(": {}", ty.to_source()));
        }
        if let Some(default) = &self.default {
            result.push_str(&format!(" = {}", default.to_source()));
        }
        result
    }
}

impl ToSource for TypeRef {
    fn to_source(&self) -> String {
        if self.nullable {
            format!("{}?", self.name)
        } else {
            self.name.clone()
        }
    }
}

impl ToSource for LValue {
    fn to_source(&self) -> String {
        match self {
            LValue::Variable(name) => name.clone(),
            LValue::Property { object, name } => {
                format!("{}.{name}", expr_source(object, POSTFIX_PRECEDENCE))
            }
            LValue::Index { object, index } => format!(
                "{}[{}]",
                expr_source(object, POSTFIX_PRECEDENCE),
                index.to_source()
            ),
        }
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        expr_source(self, 0)
    }
}

const UNARY_PRECEDENCE: u8 = 7;
const POSTFIX_PRECEDENCE: u8 = 8;

fn precedence_of(expr: &Expr) -> u8 {
    match expr {
        Expr::Binary { op, .. } => op.precedence(),
        Expr::Unary { .. } => UNARY_PRECEDENCE,
        // negative literals re-parse as a folded unary minus
        Expr::Int(n) if *n < 0 => UNARY_PRECEDENCE,
        Expr::Float(f) if f.is_sign_negative() => UNARY_PRECEDENCE,
        _ => POSTFIX_PRECEDENCE,
    }
}

fn join_args(args: &[Expr]) -> String {
    args.iter()
        .map(|arg| arg.to_source())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print an expression, parenthesizing it when it binds looser than `min`
fn expr_source(expr: &Expr, min: u8) -> String {
    let text = match expr {
        Expr::Int(n) => n.to_string(),
        Expr::Float(f) => format!("{f:?}"),
        Expr::Str(s) => format!("\"{}\"", escape_string(s)),
        Expr::Bool(b) => b.to_string(),
        Expr::Null => "null".to_string(),
        Expr::Variable(name) => name.clone(),
        Expr::SelfRef => "self".to_string(),
        Expr::List(elements) => format!("[{}]", join_args(elements)),
        Expr::Map(entries) => {
            let entries_str = entries
                .iter()
                .map(|(k, v)| format!("\"{}\": {}", escape_string(k), v.to_source()))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{entries_str}}}")
        }
        Expr::Binary { op, left, right } => {
            let prec = op.precedence();
            format!(
                "{} {} {}",
                expr_source(left, prec),
                op.symbol(),
                expr_source(right, prec + 1)
            )
        }
        Expr::Unary { op, operand } => {
            format!("{}{}", op.symbol(), expr_source(operand, UNARY_PRECEDENCE))
        }
        Expr::Property { object, name } => {
            format!("{}.{name}", expr_source(object, POSTFIX_PRECEDENCE))
        }
        Expr::Index { object, index } => format!(
            "{}[{}]",
            expr_source(object, POSTFIX_PRECEDENCE),
            index.to_source()
        ),
        Expr::MethodCall {
            object,
            method,
            args,
        } => format!(
            "{}.{method}({})",
            expr_source(object, POSTFIX_PRECEDENCE),
            join_args(args)
        ),
        Expr::SuperCall { method, args } => format!("super.{method}({})", join_args(args)),
        Expr::StaticCall {
            class,
            method,
            args,
        } => format!("{class}::{method}({})", join_args(args)),
        Expr::FunctionCall { name, args } => format!("{name}({})", join_args(args)),
        Expr::New { class, args } => format!("new {class}({})", join_args(args)),
    };

    if precedence_of(expr) < min {
        format!("({text})")
    } else {
        text
    }
}

// Helper function to escape string characters
pub(crate) fn escape_string(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '"' => r#"\""#.to_string(),
            '\\' => r"\\".to_string(),
            '\n' => r"\n".to_string(),
            '\r' => r"\r".to_string(),
            '\t' => r"\t".to_string(),
            c => c.to_string(),
        })
        .collect()
}
