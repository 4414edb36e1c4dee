// Recursive-descent grammar over the token stream
//
// One token of lookahead everywhere except static calls, which scan ahead
// over `Ident ("." Ident)* "::"` before committing.

use super::{
    lexer::{tokenize, Spanned, Token},
    ParseError, Parser,
};
use crate::ast::*;

const RESERVED: &[&str] = &[
    "package", "import", "as", "class", "trait", "extends", "public", "protected", "private",
    "static", "final", "let", "fn", "return", "if", "else", "while", "for", "in", "break",
    "continue", "true", "false", "null", "self", "super", "new",
];

/// Parser for the Weave class language
#[derive(Debug, Default, Clone, Copy)]
pub struct WeaveParser;

impl WeaveParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for WeaveParser {
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        let tokens = tokenize(source)?;
        TokenStream::new(&tokens).unit()
    }

    fn name(&self) -> &'static str {
        "weave"
    }
}

type PResult<T> = Result<T, ParseError>;

struct TokenStream<'t> {
    tokens: &'t [Spanned],
    pos: usize,
}

impl<'t> TokenStream<'t> {
    fn new(tokens: &'t [Spanned]) -> Self {
        Self { tokens, pos: 0 }
    }

    // Token helpers

    fn current(&self) -> &'t Spanned {
        // tokenize always ends with Eof, and advance never moves past it
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &'t Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &'t Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    fn advance(&mut self) {
        if !matches!(self.peek(), Token::Eof) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let here = self.current();
        ParseError::new(here.line, here.column, message)
    }

    fn describe(token: &Token) -> String {
        match token {
            Token::Ident(name) => format!("'{name}'"),
            Token::Int(n) => format!("'{n}'"),
            Token::Float(f) => format!("'{f}'"),
            Token::Str(_) => "string literal".to_string(),
            Token::Symbol(sym) => format!("'{sym}'"),
            Token::Eof => "end of input".to_string(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!(
            "expected {expected}, found {}",
            Self::describe(self.peek())
        ))
    }

    fn check_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Token::Symbol(sym) if *sym == symbol)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.check_symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> PResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{symbol}'")))
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(name) if name == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.check_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> PResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{keyword}'")))
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek() {
            Token::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn qname(&mut self) -> PResult<String> {
        let mut name = self.ident()?;
        while self.check_symbol(".") {
            self.advance();
            name.push('.');
            name.push_str(&self.ident()?);
        }
        Ok(name)
    }

    fn type_ref(&mut self) -> PResult<TypeRef> {
        let name = self.qname()?;
        let nullable = self.eat_symbol("?");
        Ok(TypeRef { name, nullable })
    }

    // Declarations

    fn unit(&mut self) -> PResult<SyntaxTree> {
        let mut tree = SyntaxTree::default();

        if self.eat_keyword("package") {
            tree.package = Some(self.qname()?);
            self.expect_symbol(";")?;
        }

        while self.eat_keyword("import") {
            let path = self.qname()?;
            let alias = if self.eat_keyword("as") {
                Some(self.ident()?)
            } else {
                None
            };
            self.expect_symbol(";")?;
            tree.imports.push(Import { path, alias });
        }

        while !matches!(self.peek(), Token::Eof) {
            tree.declarations.push(self.declaration()?);
        }
        Ok(tree)
    }

    fn declaration(&mut self) -> PResult<Declaration> {
        let is_final = self.eat_keyword("final");
        if self.eat_keyword("class") {
            let name = self.ident()?;
            let extends = if self.eat_keyword("extends") {
                Some(self.qname()?)
            } else {
                None
            };
            let members = self.members()?;
            Ok(Declaration::Class(ClassDecl {
                name,
                is_final,
                extends,
                members,
            }))
        } else if !is_final && self.eat_keyword("trait") {
            let name = self.ident()?;
            let members = self.members()?;
            Ok(Declaration::Trait(TraitDecl { name, members }))
        } else if is_final {
            Err(self.unexpected("'class'"))
        } else {
            Err(self.unexpected("class or trait declaration"))
        }
    }

    fn members(&mut self) -> PResult<Vec<Member>> {
        self.expect_symbol("{")?;
        let mut members = Vec::new();
        while !self.eat_symbol("}") {
            if matches!(self.peek(), Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            members.push(self.member()?);
        }
        Ok(members)
    }

    fn modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            if self.eat_keyword("public") {
                modifiers.visibility = Visibility::Public;
            } else if self.eat_keyword("protected") {
                modifiers.visibility = Visibility::Protected;
            } else if self.eat_keyword("private") {
                modifiers.visibility = Visibility::Private;
            } else if self.eat_keyword("static") {
                modifiers.is_static = true;
            } else if self.eat_keyword("final") {
                modifiers.is_final = true;
            } else {
                return modifiers;
            }
        }
    }

    fn member(&mut self) -> PResult<Member> {
        let modifiers = self.modifiers();
        if self.eat_keyword("let") {
            let name = self.ident()?;
            let type_annotation = if self.eat_symbol(":") {
                Some(self.type_ref()?)
            } else {
                None
            };
            let default = if self.eat_symbol("=") {
                Some(self.expression()?)
            } else {
                None
            };
            self.expect_symbol(";")?;
            Ok(Member::Property(PropertyDecl {
                modifiers,
                name,
                type_annotation,
                default,
            }))
        } else if self.eat_keyword("fn") {
            Ok(Member::Method(self.method(modifiers)?))
        } else {
            Err(self.unexpected("'let' or 'fn'"))
        }
    }

    fn method(&mut self, modifiers: Modifiers) -> PResult<MethodNode> {
        let name = self.ident()?;
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        if !self.eat_symbol(")") {
            loop {
                let param_name = self.ident()?;
                if params.iter().any(|p: &Param| p.name == param_name) {
                    return Err(self.error(format!("duplicate parameter '{param_name}'")));
                }
                let type_annotation = if self.eat_symbol(":") {
                    Some(self.type_ref()?)
                } else {
                    None
                };
                let default = if self.eat_symbol("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                params.push(Param {
                    name: param_name,
                    type_annotation,
                    default,
                });
                if self.eat_symbol(")") {
                    break;
                }
                self.expect_symbol(",")?;
            }
        }
        let return_type = if self.eat_symbol("->") {
            Some(self.type_ref()?)
        } else {
            None
        };
        let body = self.block()?;
        Ok(MethodNode {
            modifiers,
            name,
            params,
            return_type,
            body,
        })
    }

    // Statements

    fn block(&mut self) -> PResult<Block> {
        self.expect_symbol("{")?;
        let mut stmts = Vec::new();
        while !self.eat_symbol("}") {
            if matches!(self.peek(), Token::Eof) {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.statement()?);
        }
        Ok(Block(stmts))
    }

    fn statement(&mut self) -> PResult<Stmt> {
        if self.eat_keyword("let") {
            let name = self.ident()?;
            let type_annotation = if self.eat_symbol(":") {
                Some(self.type_ref()?)
            } else {
                None
            };
            self.expect_symbol("=")?;
            let value = self.expression()?;
            self.expect_symbol(";")?;
            return Ok(Stmt::Let {
                name,
                type_annotation,
                value,
            });
        }
        if self.eat_keyword("return") {
            let value = if self.check_symbol(";") {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect_symbol(";")?;
            return Ok(Stmt::Return(value));
        }
        if self.check_keyword("if") {
            return self.if_statement();
        }
        if self.eat_keyword("while") {
            self.expect_symbol("(")?;
            let condition = self.expression()?;
            self.expect_symbol(")")?;
            let body = self.block()?;
            return Ok(Stmt::While { condition, body });
        }
        if self.eat_keyword("for") {
            self.expect_symbol("(")?;
            let variable = self.ident()?;
            self.expect_keyword("in")?;
            let iterable = self.expression()?;
            self.expect_symbol(")")?;
            let body = self.block()?;
            return Ok(Stmt::For {
                variable,
                iterable,
                body,
            });
        }
        if self.eat_keyword("break") {
            self.expect_symbol(";")?;
            return Ok(Stmt::Break);
        }
        if self.eat_keyword("continue") {
            self.expect_symbol(";")?;
            return Ok(Stmt::Continue);
        }

        let start = self.current();
        let expr = self.expression()?;
        if self.eat_symbol("=") {
            let target = LValue::from_expr(expr).ok_or_else(|| {
                ParseError::new(start.line, start.column, "invalid assignment target")
            })?;
            let value = self.expression()?;
            self.expect_symbol(";")?;
            return Ok(Stmt::Assign { target, value });
        }
        self.expect_symbol(";")?;
        Ok(Stmt::Expr(expr))
    }

    fn if_statement(&mut self) -> PResult<Stmt> {
        self.expect_keyword("if")?;
        self.expect_symbol("(")?;
        let condition = self.expression()?;
        self.expect_symbol(")")?;
        let then_branch = self.block()?;
        let else_branch = if self.eat_keyword("else") {
            if self.check_keyword("if") {
                Some(Block(vec![self.if_statement()?]))
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    // Expressions

    fn expression(&mut self) -> PResult<Expr> {
        self.binary(1)
    }

    fn binary_op(&self) -> Option<BinaryOp> {
        let Token::Symbol(sym) = self.peek() else {
            return None;
        };
        let op = match *sym {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            "%" => BinaryOp::Modulo,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "<" => BinaryOp::LessThan,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::GreaterThan,
            ">=" => BinaryOp::GreaterEqual,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing; every binary operator is left-associative
    fn binary(&mut self, min_precedence: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let right = self.binary(precedence + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.eat_symbol("!") {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        if self.eat_symbol("-") {
            // negative literals fold into the literal itself
            return Ok(match self.unary()? {
                Expr::Int(n) => Expr::Int(n.wrapping_neg()),
                Expr::Float(f) => Expr::Float(-f),
                operand => Expr::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                },
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_symbol(".") {
                let name = self.ident()?;
                if self.check_symbol("(") {
                    let args = self.arguments()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        method: name,
                        args,
                    };
                } else {
                    expr = Expr::Property {
                        object: Box::new(expr),
                        name,
                    };
                }
            } else if self.eat_symbol("[") {
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<Expr>> {
        self.expect_symbol("(")?;
        self.expression_list(")")
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed
    fn expression_list(&mut self, close: &str) -> PResult<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.eat_symbol(close) {
            items.push(self.expression()?);
            if !self.eat_symbol(",") {
                self.expect_symbol(close)?;
                break;
            }
        }
        Ok(items)
    }

    /// Is the cursor at `Ident ("." Ident)* "::"`?
    fn at_static_call(&self) -> bool {
        let mut offset = 0;
        loop {
            if !matches!(self.peek_at(offset), Token::Ident(_)) {
                return false;
            }
            match self.peek_at(offset + 1) {
                Token::Symbol("::") => return true,
                Token::Symbol(".") => offset += 2,
                _ => return false,
            }
        }
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.peek() {
            Token::Int(n) => {
                let n = *n;
                self.advance();
                return Ok(Expr::Int(n));
            }
            Token::Float(f) => {
                let f = *f;
                self.advance();
                return Ok(Expr::Float(f));
            }
            Token::Str(s) => {
                let s = s.clone();
                self.advance();
                return Ok(Expr::Str(s));
            }
            _ => {}
        }

        if self.eat_keyword("true") {
            return Ok(Expr::Bool(true));
        }
        if self.eat_keyword("false") {
            return Ok(Expr::Bool(false));
        }
        if self.eat_keyword("null") {
            return Ok(Expr::Null);
        }
        if self.eat_keyword("self") {
            return Ok(Expr::SelfRef);
        }
        if self.eat_keyword("super") {
            self.expect_symbol(".")?;
            let method = self.ident()?;
            let args = self.arguments()?;
            return Ok(Expr::SuperCall { method, args });
        }
        if self.eat_keyword("new") {
            let class = self.qname()?;
            let args = self.arguments()?;
            return Ok(Expr::New { class, args });
        }
        if self.eat_symbol("[") {
            return Ok(Expr::List(self.expression_list("]")?));
        }
        if self.eat_symbol("{") {
            let mut entries = Vec::new();
            while !self.eat_symbol("}") {
                let key = match self.peek() {
                    Token::Str(key) => key.clone(),
                    _ => return Err(self.unexpected("string map key")),
                };
                self.advance();
                self.expect_symbol(":")?;
                entries.push((key, self.expression()?));
                if !self.eat_symbol(",") {
                    self.expect_symbol("}")?;
                    break;
                }
            }
            return Ok(Expr::Map(entries));
        }
        if self.eat_symbol("(") {
            let expr = self.expression()?;
            self.expect_symbol(")")?;
            return Ok(expr);
        }

        if self.at_static_call() {
            let class = self.qname()?;
            self.expect_symbol("::")?;
            let method = self.ident()?;
            let args = self.arguments()?;
            return Ok(Expr::StaticCall {
                class,
                method,
                args,
            });
        }

        let name = self.ident().map_err(|_| self.unexpected("expression"))?;
        if self.check_symbol("(") {
            let args = self.arguments()?;
            return Ok(Expr::FunctionCall { name, args });
        }
        Ok(Expr::Variable(name))
    }
}
