//! Recursive-descent parser
//!
//! Grammar sketch:
//! ```text
//! program    := { directive | io_decl | var_decl | structure | event | function }
//! io_decl    := IO_TYPE name [ '[' n ']' [ '[' n ']' ] ] { ',' ... } ';'
//! event      := [THREADSAFE] TRIGGER signal { ',' signal } block
//! function   := FUNCTION_KIND name '(' params ')' block
//! ```
//!
//! The parser never aborts. Statement- and block-level failures are recorded
//! and the cursor skips to the next `;` or block boundary; unrecognized
//! top-level tokens advance by one. The result is always a best-effort
//! program plus the collected errors.

use crate::ast::{
    BinaryOp, ConstantDef, Directive, EventHandler, Expr, FunctionDef, IoDecl, IoName, IoType,
    Literal, Param, Position, Program, ReturnKind, Stmt, StmtKind, StructDef, SwitchCase, Trigger,
    UnaryOp, VarDecl, VarType,
};
use crate::lexer::{Token, TokenKind, decode_string, parse_number, tokenize};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}: {}", self.line, self.col, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

type ParseResult<T> = Result<T, ParseError>;

/// Binary operator levels, lowest precedence first
const PRECEDENCE: &[&[(&str, BinaryOp)]] = &[
    &[("||", BinaryOp::Or)],
    &[("&&", BinaryOp::And)],
    &[("|", BinaryOp::BitOr)],
    &[("^", BinaryOp::BitXor)],
    &[("&", BinaryOp::BitAnd)],
    &[
        ("=", BinaryOp::Eq),
        ("==", BinaryOp::Eq),
        ("!=", BinaryOp::Ne),
        ("<>", BinaryOp::Ne),
        ("<", BinaryOp::Lt),
        (">", BinaryOp::Gt),
        ("<=", BinaryOp::Le),
        (">=", BinaryOp::Ge),
    ],
    &[("<<", BinaryOp::Shl), (">>", BinaryOp::Shr)],
    &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
    &[
        ("*", BinaryOp::Mul),
        ("/", BinaryOp::Div),
        ("%", BinaryOp::Mod),
        ("MOD", BinaryOp::Mod),
    ],
];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    /// Uppercase names of structures declared so far
    struct_names: HashSet<String>,
    /// Numeric constants seen so far, usable as array dimensions
    constants: HashMap<String, i64>,
    /// Locals hoisted out of the function or handler being parsed
    locals: Vec<VarDecl>,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser::from_tokens(tokenize(source))
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_trivia()).collect();
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, col) = tokens.last().map(|t| (t.line, t.col)).unwrap_or((1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                col,
            });
        }
        Parser {
            tokens,
            pos: 0,
            errors: Vec::new(),
            struct_names: HashSet::new(),
            constants: HashMap::new(),
            locals: Vec::new(),
        }
    }

    pub fn parse(mut self) -> ParseOutput {
        let mut program = Program::new();

        while !self.is_at_end() {
            let start = self.pos;
            if let Err(err) = self.parse_top_level(&mut program) {
                self.errors.push(err);
                self.synchronize();
            }
            // Forward-progress guarantee
            if self.pos == start {
                self.advance();
            }
        }

        ParseOutput {
            program,
            errors: self.errors,
        }
    }

    fn parse_top_level(&mut self, program: &mut Program) -> ParseResult<()> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Directive => self.parse_directive(program),
            TokenKind::IoType => {
                let decl = self.parse_io_decl()?;
                program.io.push(decl);
                Ok(())
            }
            TokenKind::VarType => {
                let decls = self.parse_var_decls()?;
                program.globals.extend(decls);
                Ok(())
            }
            TokenKind::Keyword => match token.upper().as_str() {
                "STRUCTURE" => {
                    let def = self.parse_structure()?;
                    program.structs.push(def);
                    Ok(())
                }
                "PUSH" | "RELEASE" | "CHANGE" | "SOCKETCONNECT" | "SOCKETDISCONNECT"
                | "SOCKETRECEIVE" | "THREADSAFE" => {
                    let handlers = self.parse_event()?;
                    program.events.extend(handlers);
                    Ok(())
                }
                "FUNCTION"
                | "INTEGER_FUNCTION"
                | "LONG_INTEGER_FUNCTION"
                | "SIGNED_INTEGER_FUNCTION"
                | "SIGNED_LONG_INTEGER_FUNCTION"
                | "STRING_FUNCTION" => {
                    let function = self.parse_function()?;
                    if function.is_main() {
                        program.main = Some(function);
                    } else {
                        program.functions.push(function);
                    }
                    Ok(())
                }
                "VOLATILE" | "NONVOLATILE" => {
                    self.advance();
                    Ok(())
                }
                _ => Err(self.error_here(&format!("Unexpected '{}' at top level", token.text))),
            },
            TokenKind::Identifier if self.starts_struct_instance() => {
                let decls = self.parse_var_decls()?;
                program.globals.extend(decls);
                Ok(())
            }
            _ => Err(self.error_here(&format!("Unexpected '{}' at top level", token.text))),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_directive(&mut self, program: &mut Program) -> ParseResult<()> {
        let token = self.advance().clone();
        let name = token.text.trim_start_matches('#').to_ascii_uppercase();
        let pos = Position::new(token.line, token.col);

        // Arguments are whatever follows on the same source line
        let mut args: Vec<Token> = Vec::new();
        while !self.is_at_end() && self.current().line == token.line {
            args.push(self.advance().clone());
        }
        let joined = args
            .iter()
            .map(|t| t.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        match name.as_str() {
            "SYMBOL_NAME" => {
                if let Some(arg) = args.first() {
                    program.symbol_name = Some(if arg.kind == TokenKind::Str {
                        decode_string(&arg.text)
                    } else {
                        arg.text.clone()
                    });
                }
            }
            "DEFINE_CONSTANT" => {
                let constant = self.constant_from_args(&args, pos)?;
                if let Literal::Number(n) = constant.value {
                    self.constants.insert(constant.name.to_ascii_uppercase(), n);
                }
                program.constants.push(constant);
            }
            _ => {}
        }

        program.directives.push(Directive {
            name,
            args: joined,
            pos,
        });
        Ok(())
    }

    fn constant_from_args(&self, args: &[Token], pos: Position) -> ParseResult<ConstantDef> {
        let name = args.first().ok_or_else(|| ParseError {
            message: "#DEFINE_CONSTANT needs a name".to_string(),
            line: pos.line,
            col: pos.col,
        })?;
        let value_tokens = &args[1..];
        let value = match value_tokens {
            [t] if t.kind == TokenKind::Str => Some(Literal::Text(decode_string(&t.text))),
            [t] if t.kind == TokenKind::Number => parse_number(&t.text).map(Literal::Number),
            [sign, t] if sign.text == "-" && t.kind == TokenKind::Number => {
                parse_number(&t.text).map(|n| Literal::Number(-n))
            }
            [t] if t.kind == TokenKind::Identifier => self
                .constants
                .get(&t.upper())
                .map(|n| Literal::Number(*n)),
            _ => None,
        };
        let value = value.ok_or_else(|| ParseError {
            message: format!("#DEFINE_CONSTANT {} has no usable value", name.text),
            line: name.line,
            col: name.col,
        })?;
        Ok(ConstantDef {
            name: name.text.clone(),
            value,
            pos,
        })
    }

    /// `[ n ]` where n is a literal or a numeric constant
    fn parse_dimension(&mut self) -> ParseResult<usize> {
        self.expect("[")?;
        let token = self.advance().clone();
        let value = match token.kind {
            TokenKind::Number => parse_number(&token.text),
            TokenKind::Identifier => self.constants.get(&token.upper()).copied(),
            _ => None,
        };
        let value = value.ok_or_else(|| ParseError {
            message: format!("Expected array size, got '{}'", token.text),
            line: token.line,
            col: token.col,
        })?;
        self.expect("]")?;
        usize::try_from(value).map_err(|_| ParseError {
            message: format!("Array size must not be negative ({})", value),
            line: token.line,
            col: token.col,
        })
    }

    fn parse_dimensions(&mut self) -> ParseResult<(Option<usize>, Option<usize>)> {
        let mut first = None;
        let mut second = None;
        if self.check("[") {
            first = Some(self.parse_dimension()?);
            if self.check("[") {
                second = Some(self.parse_dimension()?);
            }
        }
        Ok((first, second))
    }

    fn parse_io_decl(&mut self) -> ParseResult<IoDecl> {
        let token = self.advance().clone();
        let io_type = IoType::from_keyword(&token.text)
            .ok_or_else(|| self.error_at(&token, "Unknown I/O type"))?;
        let mut names = Vec::new();

        loop {
            // `_SKIP_` placeholders are plain identifiers here
            let name = self.expect_name()?;
            let (first, second) = self.parse_dimensions()?;
            let entry = if io_type.is_serial() {
                match (first, second) {
                    (Some(n), Some(cap)) => IoName {
                        name,
                        array_size: Some(n),
                        capacity: Some(cap),
                    },
                    (cap, _) => IoName {
                        name,
                        array_size: None,
                        capacity: cap,
                    },
                }
            } else {
                IoName {
                    name,
                    array_size: first,
                    capacity: None,
                }
            };
            names.push(entry);
            if !self.consume(",") {
                break;
            }
        }
        self.expect(";")?;

        Ok(IoDecl {
            io_type,
            names,
            pos: Position::new(token.line, token.col),
        })
    }

    /// Identifier followed by identifier where the first names a structure
    fn starts_struct_instance(&self) -> bool {
        let token = self.current();
        token.kind == TokenKind::Identifier
            && self.struct_names.contains(&token.upper())
            && self.peek(1).kind == TokenKind::Identifier
    }

    fn starts_var_decl(&self) -> bool {
        let token = self.current();
        token.kind == TokenKind::VarType
            || token.is("VOLATILE")
            || token.is("NONVOLATILE")
            || self.starts_struct_instance()
    }

    fn parse_var_decls(&mut self) -> ParseResult<Vec<VarDecl>> {
        while self.current().is("VOLATILE") || self.current().is("NONVOLATILE") {
            self.advance();
        }
        let type_token = self.advance().clone();
        let ty = match type_token.kind {
            TokenKind::VarType => VarType::from_keyword(&type_token.text)
                .ok_or_else(|| self.error_at(&type_token, "Unknown variable type"))?,
            TokenKind::Identifier => VarType::Struct(type_token.text.clone()),
            _ => {
                return Err(self.error_at(
                    &type_token,
                    &format!("Expected a type, got '{}'", type_token.text),
                ));
            }
        };

        let mut decls = Vec::new();
        loop {
            let name_token = self.current().clone();
            let name = self.expect_name()?;
            let (array_size, initial_size) = self.parse_dimensions()?;
            decls.push(VarDecl {
                ty: ty.clone(),
                name,
                array_size,
                initial_size,
                pos: Position::new(name_token.line, name_token.col),
            });
            if !self.consume(",") {
                break;
            }
        }
        self.expect(";")?;
        Ok(decls)
    }

    fn parse_structure(&mut self) -> ParseResult<StructDef> {
        let keyword = self.advance().clone();
        let name = self.expect_name()?;
        self.struct_names.insert(name.to_ascii_uppercase());
        self.expect("{")?;

        let mut fields = Vec::new();
        while !self.check("}") && !self.is_at_end() {
            if self.starts_var_decl() {
                match self.parse_var_decls() {
                    Ok(decls) => fields.extend(decls),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                }
            } else {
                let err = self.error_here(&format!(
                    "Expected a field declaration in structure {}, got '{}'",
                    name,
                    self.current().text
                ));
                self.errors.push(err);
                self.synchronize();
            }
        }
        self.expect("}")?;
        self.consume(";");

        Ok(StructDef {
            name,
            fields,
            pos: Position::new(keyword.line, keyword.col),
        })
    }

    fn parse_event(&mut self) -> ParseResult<Vec<EventHandler>> {
        if self.current().is("THREADSAFE") {
            self.advance();
        }
        let token = self.advance().clone();
        let trigger = Trigger::from_keyword(&token.text)
            .ok_or_else(|| self.error_at(&token, "Expected an event trigger"))?;

        let mut signals = vec![self.expect_name()?];
        while self.consume(",") {
            signals.push(self.expect_name()?);
        }

        self.locals.clear();
        let body = self.parse_block()?;
        let locals = std::mem::take(&mut self.locals);

        let pos = Position::new(token.line, token.col);
        Ok(signals
            .into_iter()
            .map(|signal| EventHandler {
                trigger,
                signal,
                locals: locals.clone(),
                body: body.clone(),
                pos,
            })
            .collect())
    }

    fn parse_function(&mut self) -> ParseResult<FunctionDef> {
        let token = self.advance().clone();
        let (return_kind, return_type) = match token.upper().as_str() {
            "FUNCTION" => (ReturnKind::Void, None),
            "INTEGER_FUNCTION" => (ReturnKind::Integer, Some(VarType::Integer)),
            "LONG_INTEGER_FUNCTION" => (ReturnKind::Integer, Some(VarType::LongInteger)),
            "SIGNED_INTEGER_FUNCTION" => (ReturnKind::Integer, Some(VarType::SignedInteger)),
            "SIGNED_LONG_INTEGER_FUNCTION" => {
                (ReturnKind::Integer, Some(VarType::SignedLongInteger))
            }
            _ => (ReturnKind::String, Some(VarType::String)),
        };
        let name = self.expect_name()?;

        self.expect("(")?;
        let mut params = Vec::new();
        if !self.check(")") {
            loop {
                params.push(self.parse_param()?);
                if !self.consume(",") {
                    break;
                }
            }
        }
        self.expect(")")?;

        self.locals.clear();
        let body = self.parse_block()?;
        let locals = std::mem::take(&mut self.locals);

        Ok(FunctionDef {
            name,
            return_kind,
            return_type,
            params,
            locals,
            body,
            pos: Position::new(token.line, token.col),
        })
    }

    fn parse_param(&mut self) -> ParseResult<Param> {
        let mut by_ref = false;
        if self.current().is("BYREF") {
            by_ref = true;
            self.advance();
        } else if self.current().is("BYVAL") {
            self.advance();
        }
        let type_token = self.advance().clone();
        let ty = match type_token.kind {
            TokenKind::VarType => VarType::from_keyword(&type_token.text)
                .ok_or_else(|| self.error_at(&type_token, "Unknown parameter type"))?,
            TokenKind::Identifier if self.struct_names.contains(&type_token.upper()) => {
                VarType::Struct(type_token.text.clone())
            }
            _ => {
                return Err(self.error_at(
                    &type_token,
                    &format!("Expected a parameter type, got '{}'", type_token.text),
                ));
            }
        };
        let name = self.expect_name()?;
        let mut is_array = false;
        while self.consume("[") {
            // `values[]` or `values[10]`; the size is not enforced
            if !self.check("]") {
                self.advance();
            }
            self.expect("]")?;
            is_array = true;
        }
        Ok(Param {
            ty,
            name,
            by_ref,
            is_array,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect("{")?;
        let mut stmts = Vec::new();
        while !self.check("}") && !self.is_at_end() {
            let start = self.pos;
            if self.starts_var_decl() {
                match self.parse_var_decls() {
                    Ok(decls) => self.locals.extend(decls),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                }
            } else {
                match self.parse_statement() {
                    Ok(stmt) => stmts.push(stmt),
                    Err(err) => {
                        self.errors.push(err);
                        self.synchronize();
                    }
                }
            }
            if self.pos == start {
                self.advance();
            }
        }
        self.expect("}")?;
        Ok(stmts)
    }

    /// A braced block or a single statement
    fn parse_body(&mut self) -> ParseResult<Vec<Stmt>> {
        if self.check("{") {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let token = self.current().clone();
        let pos = Position::new(token.line, token.col);

        let kind = if token.kind == TokenKind::Keyword {
            match token.upper().as_str() {
                "IF" => self.parse_if()?,
                "FOR" => self.parse_for()?,
                "WHILE" => {
                    self.advance();
                    self.expect("(")?;
                    let cond = self.parse_expr()?;
                    self.expect(")")?;
                    let body = self.parse_body()?;
                    StmtKind::While { cond, body }
                }
                "DO" => {
                    self.advance();
                    let body = self.parse_body()?;
                    self.expect_keyword("UNTIL")?;
                    self.expect("(")?;
                    let cond = self.parse_expr()?;
                    self.expect(")")?;
                    self.consume(";");
                    StmtKind::DoUntil { body, cond }
                }
                "SWITCH" | "CSWITCH" => self.parse_switch()?,
                "WAIT" => self.parse_wait()?,
                "RETURN" => {
                    self.advance();
                    let value = if self.check(";") {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect(";")?;
                    StmtKind::Return(value)
                }
                "BREAK" => {
                    self.advance();
                    self.expect(";")?;
                    StmtKind::Break
                }
                "TERMINATEEVENT" => {
                    self.advance();
                    self.expect(";")?;
                    StmtKind::TerminateEvent
                }
                _ => {
                    return Err(self.error_here(&format!("Unexpected keyword '{}'", token.text)));
                }
            }
        } else if token.is("{") {
            StmtKind::Block(self.parse_block()?)
        } else if token.is(";") {
            self.advance();
            StmtKind::Block(Vec::new())
        } else if matches!(token.kind, TokenKind::Identifier | TokenKind::Builtin) {
            if self.peek(1).is("(") {
                let call = self.parse_expr()?;
                self.expect(";")?;
                StmtKind::Call(call)
            } else {
                let target = self.parse_place()?;
                self.expect("=")?;
                let value = self.parse_expr()?;
                self.expect(";")?;
                StmtKind::Assign { target, value }
            }
        } else {
            return Err(self.error_here(&format!("Unexpected '{}'", token.text)));
        };

        Ok(Stmt { kind, pos })
    }

    fn parse_if(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        let then_body = self.parse_body()?;
        let else_body = if self.current().is("ELSE") {
            self.advance();
            if self.current().is("IF") {
                Some(vec![self.parse_statement()?])
            } else {
                Some(self.parse_body()?)
            }
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_for(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        self.expect("(")?;
        let var = self.parse_place()?;
        self.expect("=")?;
        let start = self.parse_expr()?;
        self.expect_keyword("TO")?;
        let end = self.parse_expr()?;
        let step = if self.current().is("STEP") {
            self.advance();
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(")")?;
        let body = self.parse_body()?;
        Ok(StmtKind::For {
            var,
            start,
            end,
            step,
            body,
        })
    }

    fn parse_switch(&mut self) -> ParseResult<StmtKind> {
        let fallthrough = self.advance().is("CSWITCH");
        self.expect("(")?;
        let subject = self.parse_expr()?;
        self.expect(")")?;
        self.expect("{")?;

        let mut cases = Vec::new();
        while !self.check("}") && !self.is_at_end() {
            let value = if self.current().is("CASE") {
                self.advance();
                Some(self.parse_expr()?)
            } else if self.current().is("DEFAULT") {
                self.advance();
                None
            } else {
                return Err(self.error_here(&format!(
                    "Expected CASE or DEFAULT, got '{}'",
                    self.current().text
                )));
            };
            self.expect(":")?;
            let body = if self.check("{") {
                self.parse_block()?
            } else {
                // Unbraced case body runs up to the next label
                let mut body = Vec::new();
                while !self.check("}")
                    && !self.current().is("CASE")
                    && !self.current().is("DEFAULT")
                    && !self.is_at_end()
                {
                    body.push(self.parse_statement()?);
                }
                body
            };
            cases.push(SwitchCase { value, body });
        }
        self.expect("}")?;

        Ok(StmtKind::Switch {
            subject,
            cases,
            fallthrough,
        })
    }

    fn parse_wait(&mut self) -> ParseResult<StmtKind> {
        self.advance();
        self.expect("(")?;
        let duration = self.parse_expr()?;
        let label = if self.consume(",") {
            Some(self.expect_name()?)
        } else {
            None
        };
        self.expect(")")?;
        let body = if self.check("{") {
            Some(self.parse_block()?)
        } else {
            self.expect(";")?;
            None
        };
        Ok(StmtKind::Wait {
            duration,
            label,
            body,
        })
    }

    /// Assignable location: `x`, `x[i]`, `x[i][j]`, `s.f`, `s.f[i]`
    fn parse_place(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        if !matches!(token.kind, TokenKind::Identifier | TokenKind::Builtin) {
            return Err(self.error_here(&format!(
                "Expected a variable name, got '{}'",
                token.text
            )));
        }
        let expr = self.parse_postfix(token.text.clone())?;
        if !expr.is_place() {
            return Err(self.error_at(&token, "Cannot assign to a function call"));
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Expr> {
        if level >= PRECEDENCE.len() {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1)?;
        loop {
            let token = self.current();
            let is_operator = token.kind == TokenKind::Operator
                || (token.kind == TokenKind::Keyword && token.is("MOD"));
            if !is_operator {
                break;
            }
            let Some(op) = PRECEDENCE[level]
                .iter()
                .find(|(sym, _)| token.is(sym))
                .map(|(_, op)| *op)
            else {
                break;
            };
            self.advance();
            let right = self.parse_binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let token = self.current();
        let op = if token.kind == TokenKind::Operator && token.is("-") {
            Some(UnaryOp::Neg)
        } else if (token.kind == TokenKind::Operator && token.is("!"))
            || (token.kind == TokenKind::Keyword && token.is("NOT"))
        {
            Some(UnaryOp::Not)
        } else if token.kind == TokenKind::Operator && token.is("~") {
            Some(UnaryOp::BitNot)
        } else {
            None
        };

        match op {
            Some(op) => {
                self.advance();
                let operand = self.parse_unary()?;
                // Fold negative literals
                if let (UnaryOp::Neg, Expr::Number(n)) = (op, &operand) {
                    return Ok(Expr::Number(-n));
                }
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            None => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Number => {
                self.advance();
                parse_number(&token.text)
                    .map(Expr::Number)
                    .ok_or_else(|| self.error_at(&token, "Invalid number"))
            }
            TokenKind::Str => {
                self.advance();
                Ok(Expr::Str(decode_string(&token.text)))
            }
            TokenKind::Punct if token.is("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(")")?;
                Ok(inner)
            }
            TokenKind::Identifier | TokenKind::Builtin => self.parse_postfix(token.text),
            _ => Err(self.error_here(&format!(
                "Expected an expression, got '{}'",
                if token.kind == TokenKind::Eof {
                    "end of input"
                } else {
                    token.text.as_str()
                }
            ))),
        }
    }

    /// Name followed by an optional call, index or field suffix
    fn parse_postfix(&mut self, name: String) -> ParseResult<Expr> {
        self.advance();

        if self.check("(") {
            self.advance();
            let mut args = Vec::new();
            if !self.check(")") {
                loop {
                    args.push(self.parse_expr()?);
                    if !self.consume(",") {
                        break;
                    }
                }
            }
            self.expect(")")?;
            return Ok(Expr::Call { name, args });
        }

        if self.check("[") {
            let index = self.parse_index()?;
            return Ok(Expr::Index {
                name,
                index: Box::new(index),
            });
        }

        if self.check(".") {
            self.advance();
            let field = self.expect_name()?;
            let index = if self.check("[") {
                self.advance();
                let i = self.parse_expr()?;
                self.expect("]")?;
                Some(Box::new(i))
            } else {
                None
            };
            return Ok(Expr::Field {
                object: name,
                field,
                index,
            });
        }

        Ok(Expr::Ident(name))
    }

    /// `[i]` or `[i][j]`; the two-index form is packed into a `MultiDim` node
    fn parse_index(&mut self) -> ParseResult<Expr> {
        self.expect("[")?;
        let first = self.parse_expr()?;
        self.expect("]")?;
        if self.check("[") {
            self.advance();
            let second = self.parse_expr()?;
            self.expect("]")?;
            return Ok(Expr::Binary {
                op: BinaryOp::MultiDim,
                left: Box::new(first),
                right: Box::new(second),
            });
        }
        Ok(first)
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if !self.is_at_end() {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn is_at_end(&self) -> bool {
        self.current().kind == TokenKind::Eof
    }

    /// Punctuation/operator check (keywords use `current().is`)
    fn check(&self, text: &str) -> bool {
        let token = self.current();
        matches!(token.kind, TokenKind::Punct | TokenKind::Operator) && token.text == text
    }

    fn consume(&mut self, text: &str) -> bool {
        if self.check(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> ParseResult<()> {
        if self.consume(text) {
            Ok(())
        } else {
            Err(self.error_here(&format!(
                "Expected '{}', got '{}'",
                text,
                self.describe_current()
            )))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> ParseResult<()> {
        if self.current().kind == TokenKind::Keyword && self.current().is(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(&format!(
                "Expected '{}', got '{}'",
                word,
                self.describe_current()
            )))
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Identifier | TokenKind::Builtin => {
                self.advance();
                Ok(token.text)
            }
            _ => Err(self.error_here(&format!(
                "Expected a name, got '{}'",
                self.describe_current()
            ))),
        }
    }

    fn describe_current(&self) -> String {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            token.text.clone()
        }
    }

    fn error_here(&self, message: &str) -> ParseError {
        self.error_at(self.current(), message)
    }

    fn error_at(&self, token: &Token, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            line: token.line,
            col: token.col,
        }
    }

    /// Skip to just past the next `;`, or up to (not past) a block boundary
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.check(";") {
                self.advance();
                return;
            }
            if self.check("}") || self.check("{") {
                return;
            }
            self.advance();
        }
    }
}

/// Parse source text that has already been preprocessed
pub fn parse(source: &str) -> ParseOutput {
    Parser::new(source).parse()
}
