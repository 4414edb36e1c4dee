// Syntax tree for Weave class sources
// Produced by the parser, rewritten by the proxy generator, printed back by source_gen

pub mod source_gen;
pub mod visit;
pub use source_gen::{CodePrinter, StandardPrinter, ToSource};


use std::{
    fmt,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// Name of the constructor method
pub const CONSTRUCTOR: &str = "init";

/// Type names that never refer to a class
pub const PRIMITIVE_TYPES: &[&str] = &[
    "int", "float", "string", "bool", "list", "map", "any", "void", "null",
];

/// Fully-qualified, case-normalized class identifier.
///
/// Keeps the spelling it was created with for display and file lookup, but
/// compares and hashes on a lowercase key so `app.Widget` and `App.widget`
/// name the same class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassName {
    display: String,
    key: String,
}

impl ClassName {
    /// Parse a dotted class name, validating every segment
    pub fn parse(name: &str) -> Result<Self, InvalidClassName> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(InvalidClassName(name.to_string()));
        }
        if !trimmed.split('.').all(is_identifier) {
            return Err(InvalidClassName(name.to_string()));
        }
        Ok(Self {
            display: trimmed.to_string(),
            key: trimmed.to_lowercase(),
        })
    }

    /// Build from a name already known to be valid
    pub(crate) fn new_unchecked(name: &str) -> Self {
        Self {
            display: name.to_string(),
            key: name.to_lowercase(),
        }
    }

    /// Join an optional package and a short name
    pub fn qualify(package: Option<&str>, short_name: &str) -> Result<Self, InvalidClassName> {
        match package {
            Some(pkg) if !pkg.is_empty() => Self::parse(&format!("{pkg}.{short_name}")),
            _ => Self::parse(short_name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Lowercase key used for every lookup
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last path segment
    pub fn short_name(&self) -> &str {
        self.display
            .rsplit_once('.')
            .map_or(self.display.as_str(), |(_, short)| short)
    }

    /// Everything before the last segment, if any
    pub fn package(&self) -> Option<&str> {
        self.display.rsplit_once('.').map(|(pkg, _)| pkg)
    }

    /// Path segments, in order
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.display.split('.')
    }
}

impl PartialEq for ClassName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ClassName {}

impl Hash for ClassName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl std::str::FromStr for ClassName {
    type Err = InvalidClassName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Invalid class name: '{0}'")]
pub struct InvalidClassName(pub String);

/// Check that a string is a valid Weave identifier
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Root of one parsed compilation unit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
}

impl Import {
    /// Name the import is visible under
    pub fn visible_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.path.rsplit('.').next().unwrap_or(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    Class(ClassDecl),
    Trait(TraitDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Class(class) => &class.name,
            Declaration::Trait(tr) => &tr.name,
        }
    }

    pub fn members(&self) -> &[Member] {
        match self {
            Declaration::Class(class) => &class.members,
            Declaration::Trait(tr) => &tr.members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub is_final: bool,
    pub extends: Option<String>,
    pub members: Vec<Member>,
}

impl ClassDecl {
    pub fn methods(&self) -> impl Iterator<Item = &MethodNode> {
        self.members.iter().filter_map(|member| match member {
            Member::Method(method) => Some(method),
            Member::Property(_) => None,
        })
    }

    pub fn method(&self, name: &str) -> Option<&MethodNode> {
        self.methods().find(|method| method.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitDecl {
    pub name: String,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Member {
    Property(PropertyDecl),
    Method(MethodNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn keyword(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub modifiers: Modifiers,
    pub name: String,
    pub type_annotation: Option<TypeRef>,
    pub default: Option<Expr>,
}

/// One method declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodNode {
    pub modifiers: Modifiers,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeRef>,
    pub body: Block,
}

impl MethodNode {
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub type_annotation: Option<TypeRef>,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub nullable: bool,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        PRIMITIVE_TYPES.contains(&self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block(pub Vec<Stmt>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Let {
        name: String,
        type_annotation: Option<TypeRef>,
        value: Expr,
    },
    Assign {
        target: LValue,
        value: Expr,
    },
    Expr(Expr),
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    While {
        condition: Expr,
        body: Block,
    },
    For {
        variable: String,
        iterable: Expr,
        body: Block,
    },
    Break,
    Continue,
}

/// Left side of an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LValue {
    Variable(String),
    Property { object: Box<Expr>, name: String },
    Index { object: Box<Expr>, index: Box<Expr> },
}

impl LValue {
    /// Reinterpret an already-parsed expression as an assignment target
    pub fn from_expr(expr: Expr) -> Option<Self> {
        match expr {
            Expr::Variable(name) => Some(LValue::Variable(name)),
            Expr::Property { object, name } => Some(LValue::Property { object, name }),
            Expr::Index { object, index } => Some(LValue::Index { object, index }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength, higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Equal | BinaryOp::NotEqual => 3,
            BinaryOp::LessThan
            | BinaryOp::LessEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterEqual => 4,
            BinaryOp::Add | BinaryOp::Subtract => 5,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Negate => "-",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,

    // References
    Variable(String),
    SelfRef,

    // Collections
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),

    // Operators
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    // Access
    Property {
        object: Box<Expr>,
        name: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },

    // Calls
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    SuperCall {
        method: String,
        args: Vec<Expr>,
    },
    StaticCall {
        class: String,
        method: String,
        args: Vec<Expr>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
    New {
        class: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Str(s.into())
    }
}

/// Keyword naming the lexically enclosing class in class references
pub const SELF_CLASS: &str = "Self";

// Lookup helpers
impl SyntaxTree {
    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.declarations.iter().filter_map(|decl| match decl {
            Declaration::Class(class) => Some(class),
            Declaration::Trait(_) => None,
        })
    }

    /// Find a declaration by short name, case-insensitively
    pub fn declaration(&self, short_name: &str) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|decl| decl.name().eq_ignore_ascii_case(short_name))
    }

    /// Fully-qualified name of a declaration in this unit
    pub fn qualified_name(&self, short_name: &str) -> Result<ClassName, InvalidClassName> {
        ClassName::qualify(self.package.as_deref(), short_name)
    }

    /// Resolve a class reference written in this unit to a fully-qualified name
    ///
    /// `Self` is not handled here; it depends on the enclosing declaration.
    pub fn resolve_reference(&self, reference: &str) -> String {
        if reference.contains('.') {
            return reference.to_string();
        }
        if let Some(import) = self
            .imports
            .iter()
            .find(|import| import.visible_name() == reference)
        {
            return import.path.clone();
        }
        match &self.package {
            Some(pkg) => format!("{pkg}.{reference}"),
            None => reference.to_string(),
        }
    }
}

impl fmt::Display for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&StandardPrinter::new().print(self))
    }
}
