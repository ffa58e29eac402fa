//! Abstract Syntax Tree for SIMPL+ style programs
//!
//! The tree is produced once per load by the parser and then owned by the
//! interpreter. Nodes are immutable after parsing; the interpreter walks them
//! by recursive dispatch on the tag.

use serde::Serialize;
use std::fmt;

/// Source position for diagnostics (1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Position { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A literal value as written in source (constants, case labels)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Number(i64),
    Text(String),
}

// ============================================================================
//                              DECLARATIONS
// ============================================================================

/// A `#NAME args` directive the parser observed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    /// Uppercase directive name without the leading `#`
    pub name: String,
    /// Remaining tokens on the directive line, joined by single spaces
    pub args: String,
    pub pos: Position,
}

/// `#DEFINE_CONSTANT NAME value`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantDef {
    pub name: String,
    pub value: Literal,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IoType {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    AnalogOutput,
    StringInput,
    StringOutput,
    BufferInput,
}

impl IoType {
    pub fn from_keyword(word: &str) -> Option<IoType> {
        match word.to_ascii_uppercase().as_str() {
            "DIGITAL_INPUT" => Some(IoType::DigitalInput),
            "DIGITAL_OUTPUT" => Some(IoType::DigitalOutput),
            "ANALOG_INPUT" => Some(IoType::AnalogInput),
            "ANALOG_OUTPUT" => Some(IoType::AnalogOutput),
            "STRING_INPUT" => Some(IoType::StringInput),
            "STRING_OUTPUT" => Some(IoType::StringOutput),
            "BUFFER_INPUT" => Some(IoType::BufferInput),
            _ => None,
        }
    }

    /// String and buffer signals use their first bracket as a capacity
    pub fn is_serial(self) -> bool {
        matches!(
            self,
            IoType::StringInput | IoType::StringOutput | IoType::BufferInput
        )
    }

    pub fn is_input(self) -> bool {
        matches!(
            self,
            IoType::DigitalInput | IoType::AnalogInput | IoType::StringInput | IoType::BufferInput
        )
    }
}

/// One name inside an I/O declaration list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoName {
    pub name: String,
    /// Number of signals when declared as an array (`name[1..N]`)
    pub array_size: Option<usize>,
    /// Maximum string length for serial signals
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IoDecl {
    pub io_type: IoType,
    pub names: Vec<IoName>,
    pub pos: Position,
}

impl IoDecl {
    /// Expanded signal names (`levels[1]`, `levels[2]`, ...) in declaration order
    pub fn signal_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for entry in &self.names {
            match entry.array_size {
                Some(n) => {
                    for i in 1..=n {
                        out.push(format!("{}[{}]", entry.name, i));
                    }
                }
                None => out.push(entry.name.clone()),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum VarType {
    /// 16-bit unsigned
    Integer,
    /// 32-bit unsigned
    LongInteger,
    /// 16-bit signed
    SignedInteger,
    /// 32-bit signed
    SignedLongInteger,
    String,
    TcpClient,
    TcpServer,
    UdpSocket,
    /// Instance of a user `STRUCTURE`
    Struct(String),
}

impl VarType {
    pub fn from_keyword(word: &str) -> Option<VarType> {
        match word.to_ascii_uppercase().as_str() {
            "INTEGER" => Some(VarType::Integer),
            "LONG_INTEGER" => Some(VarType::LongInteger),
            "SIGNED_INTEGER" => Some(VarType::SignedInteger),
            "SIGNED_LONG_INTEGER" => Some(VarType::SignedLongInteger),
            "STRING" => Some(VarType::String),
            "TCP_CLIENT" => Some(VarType::TcpClient),
            "TCP_SERVER" => Some(VarType::TcpServer),
            "UDP_SOCKET" => Some(VarType::UdpSocket),
            _ => None,
        }
    }

    pub fn is_socket(&self) -> bool {
        matches!(
            self,
            VarType::TcpClient | VarType::TcpServer | VarType::UdpSocket
        )
    }
}

/// Variable or structure-field declaration
///
/// `array_size` is the first bracket and `initial_size` the second. How the
/// two are interpreted depends on the type: for strings a lone bracket is the
/// capacity, for integers a second bracket adds a second dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarDecl {
    pub ty: VarType,
    pub name: String,
    pub array_size: Option<usize>,
    pub initial_size: Option<usize>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<VarDecl>,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Trigger {
    Push,
    Release,
    Change,
    SocketConnect,
    SocketDisconnect,
    SocketReceive,
}

impl Trigger {
    pub fn from_keyword(word: &str) -> Option<Trigger> {
        match word.to_ascii_uppercase().as_str() {
            "PUSH" => Some(Trigger::Push),
            "RELEASE" => Some(Trigger::Release),
            "CHANGE" => Some(Trigger::Change),
            "SOCKETCONNECT" => Some(Trigger::SocketConnect),
            "SOCKETDISCONNECT" => Some(Trigger::SocketDisconnect),
            "SOCKETRECEIVE" => Some(Trigger::SocketReceive),
            _ => None,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trigger::Push => "PUSH",
            Trigger::Release => "RELEASE",
            Trigger::Change => "CHANGE",
            Trigger::SocketConnect => "SOCKETCONNECT",
            Trigger::SocketDisconnect => "SOCKETDISCONNECT",
            Trigger::SocketReceive => "SOCKETRECEIVE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHandler {
    pub trigger: Trigger,
    pub signal: String,
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReturnKind {
    Void,
    Integer,
    String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub ty: VarType,
    pub name: String,
    pub by_ref: bool,
    /// `INTEGER values[]` style array parameter
    pub is_array: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub return_kind: ReturnKind,
    /// Declared return type for integer functions (drives width wrapping)
    pub return_type: Option<VarType>,
    pub params: Vec<Param>,
    pub locals: Vec<VarDecl>,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

impl FunctionDef {
    pub fn is_main(&self) -> bool {
        self.name.eq_ignore_ascii_case("main")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub symbol_name: Option<String>,
    pub help_text: String,
    pub directives: Vec<Directive>,
    pub constants: Vec<ConstantDef>,
    pub io: Vec<IoDecl>,
    pub globals: Vec<VarDecl>,
    pub structs: Vec<StructDef>,
    pub events: Vec<EventHandler>,
    pub functions: Vec<FunctionDef>,
    pub main: Option<FunctionDef>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn find_struct(&self, name: &str) -> Option<&StructDef> {
        self.structs
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn has_directive(&self, name: &str) -> bool {
        self.directives
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(name))
    }
}

// ============================================================================
//                          STATEMENTS & EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCase {
    /// `None` for the `DEFAULT` case
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StmtKind {
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    For {
        var: Expr,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoUntil {
        body: Vec<Stmt>,
        cond: Expr,
    },
    /// `fallthrough` is set for `CSWITCH`
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        fallthrough: bool,
    },
    /// Inline form (`body == None`) blocks Main for the duration; the
    /// labelled form schedules `body` for later.
    Wait {
        duration: Expr,
        label: Option<String>,
        body: Option<Vec<Stmt>>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Call(Expr),
    Return(Option<Expr>),
    Break,
    TerminateEvent,
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Synthetic node: `grid[i][j]` is parsed as `Index(grid, MultiDim(i, j))`
    MultiDim,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::MultiDim => "][",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Number(i64),
    Str(String),
    Ident(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `name[index]`; for two dimensions `index` is a `MultiDim` binary node
    Index {
        name: String,
        index: Box<Expr>,
    },
    /// `object.field` or `object.field[index]`
    Field {
        object: String,
        field: String,
        index: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Whether the expression can appear on the left of an assignment
    pub fn is_place(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Index { .. } | Expr::Field { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_decl_expands_arrays_one_based() {
        let decl = IoDecl {
            io_type: IoType::AnalogInput,
            names: vec![
                IoName {
                    name: "level".to_string(),
                    array_size: None,
                    capacity: None,
                },
                IoName {
                    name: "zones".to_string(),
                    array_size: Some(3),
                    capacity: None,
                },
            ],
            pos: Position::new(1, 1),
        };
        assert_eq!(
            decl.signal_names(),
            vec!["level", "zones[1]", "zones[2]", "zones[3]"]
        );
    }

    #[test]
    fn test_keyword_lookups_are_case_insensitive() {
        assert_eq!(
            IoType::from_keyword("digital_input"),
            Some(IoType::DigitalInput)
        );
        assert_eq!(VarType::from_keyword("Long_Integer"), Some(VarType::LongInteger));
        assert_eq!(Trigger::from_keyword("SocketReceive"), Some(Trigger::SocketReceive));
        assert_eq!(Trigger::from_keyword("HOLD"), None);
    }

    #[test]
    fn test_main_detection() {
        let f = FunctionDef {
            name: "MAIN".to_string(),
            return_kind: ReturnKind::Void,
            return_type: None,
            params: vec![],
            locals: vec![],
            body: vec![],
            pos: Position::default(),
        };
        assert!(f.is_main());
    }
}
