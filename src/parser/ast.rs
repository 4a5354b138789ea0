use std::fmt;
use std::rc::Rc;

/// Byte offsets plus line/column positions of a syntax node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Meta {
    pub start_index: usize,
    pub end_index: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

pub trait HasMeta {
    fn get_meta(&self) -> &Meta;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredefinedType {
    Bool,
    Byte,
    SByte,
    Short,
    UShort,
    Char,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Decimal,
    String,
    Object,
    Void,
    Int128,
    UInt128,
}

impl PredefinedType {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "bool" => PredefinedType::Bool,
            "byte" => PredefinedType::Byte,
            "sbyte" => PredefinedType::SByte,
            "short" => PredefinedType::Short,
            "ushort" => PredefinedType::UShort,
            "char" => PredefinedType::Char,
            "int" => PredefinedType::Int,
            "uint" => PredefinedType::UInt,
            "long" => PredefinedType::Long,
            "ulong" => PredefinedType::ULong,
            "float" => PredefinedType::Float,
            "double" => PredefinedType::Double,
            "decimal" => PredefinedType::Decimal,
            "string" => PredefinedType::String,
            "object" => PredefinedType::Object,
            "void" => PredefinedType::Void,
            "Int128" => PredefinedType::Int128,
            "UInt128" => PredefinedType::UInt128,
            _ => return None,
        })
    }

    /// The CLR type name the keyword aliases.
    pub fn clr_name(&self) -> &'static str {
        match self {
            PredefinedType::Bool => "Boolean",
            PredefinedType::Byte => "Byte",
            PredefinedType::SByte => "SByte",
            PredefinedType::Short => "Int16",
            PredefinedType::UShort => "UInt16",
            PredefinedType::Char => "Char",
            PredefinedType::Int => "Int32",
            PredefinedType::UInt => "UInt32",
            PredefinedType::Long => "Int64",
            PredefinedType::ULong => "UInt64",
            PredefinedType::Float => "Single",
            PredefinedType::Double => "Double",
            PredefinedType::Decimal => "Decimal",
            PredefinedType::String => "String",
            PredefinedType::Object => "Object",
            PredefinedType::Void => "Void",
            PredefinedType::Int128 => "Int128",
            PredefinedType::UInt128 => "UInt128",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Predefined(PredefinedType),
    Named { path: Vec<String>, args: Vec<TypeRef> },
    Array { element: Box<TypeRef>, rank: usize },
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Predefined(p) => write!(f, "{:?}", p).map(|_| ()),
            TypeRef::Named { path, args } => {
                write!(f, "{}", path.join("."))?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "<{}>", args.join(", "))?;
                }
                Ok(())
            }
            TypeRef::Array { element, rank } => {
                write!(f, "{}[{}]", element, ",".repeat(rank - 1))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Char(char),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    /// Decimal literal kept in source form, e.g. `"1.50"`.
    Decimal(String),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl BinaryOperator {
    pub fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "%" => BinaryOperator::Remainder,
            "<<" => BinaryOperator::ShiftLeft,
            ">>" => BinaryOperator::ShiftRight,
            "&" => BinaryOperator::BitAnd,
            "|" => BinaryOperator::BitOr,
            "^" => BinaryOperator::BitXor,
            "==" => BinaryOperator::Equal,
            "!=" => BinaryOperator::NotEqual,
            "<" => BinaryOperator::LessThan,
            "<=" => BinaryOperator::LessThanOrEqual,
            ">" => BinaryOperator::GreaterThan,
            ">=" => BinaryOperator::GreaterThanOrEqual,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Compound(BinaryOperator),
    Coalesce,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterpolationPart {
    Text(String),
    Hole(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementInitializer {
    Single(Expr),
    Pair(Expr, Expr),
}

/// Nested `{ ... }` initializer of an array creation expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayInitializer {
    Expr(Box<Expr>),
    Nested(Vec<ArrayInitializer>, Meta),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    PredefinedType(PredefinedType),
    Member {
        object: Box<Expr>,
        name: String,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Index {
        object: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    Update {
        target: Box<Expr>,
        increment: bool,
        prefix: bool,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        operator: AssignmentOperator,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Cast {
        target: TypeRef,
        operand: Box<Expr>,
    },
    Is {
        operand: Box<Expr>,
        target: TypeRef,
    },
    As {
        operand: Box<Expr>,
        target: TypeRef,
    },
    TypeOf(TypeRef),
    New {
        target: TypeRef,
        arguments: Vec<Expr>,
        initializer: Option<Vec<ElementInitializer>>,
    },
    NewArray {
        element: TypeRef,
        sizes: Vec<Expr>,
        rank: usize,
        initializer: Option<ArrayInitializer>,
    },
    ImplicitArray(Vec<Expr>),
    AnonymousObject(Vec<(String, Expr)>),
    Interpolated(Vec<InterpolationPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub meta: Meta,
}

impl HasMeta for Expr {
    fn get_meta(&self) -> &Meta {
        &self.meta
    }
}

impl Expr {
    pub fn new(kind: ExprKind, meta: Meta) -> Self {
        Expr { kind, meta }
    }

    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Name(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Initializer>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    Array(ArrayInitializer),
}

/// `None` means `var`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDeclaration {
    pub declared_type: Option<TypeRef>,
    pub declarators: Vec<Declarator>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Declaration(LocalDeclaration),
    Expressions(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub exception_type: Option<TypeRef>,
    pub binding: Option<String>,
    pub body: Vec<Statement>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub declared_type: TypeRef,
    pub name: String,
}

#[derive(Debug, PartialEq)]
pub struct FunctionData {
    pub name: String,
    pub return_type: TypeRef,
    pub params: Vec<Parameter>,
    pub body: Vec<Statement>,
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementType {
    Expression(Expr),
    Declaration(LocalDeclaration),
    Block(Vec<Statement>),
    Unsafe(Vec<Statement>),
    If {
        test: Expr,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    While {
        test: Expr,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        test: Expr,
    },
    For {
        init: Option<ForInit>,
        test: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Statement>,
    },
    Foreach {
        declared_type: Option<TypeRef>,
        name: String,
        iterable: Expr,
        body: Box<Statement>,
    },
    Try {
        block: Vec<Statement>,
        handlers: Vec<CatchClause>,
        finalizer: Option<Vec<Statement>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Option<Expr>),
    LocalFunction(Rc<FunctionData>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementType,
    pub meta: Meta,
}

impl HasMeta for Statement {
    fn get_meta(&self) -> &Meta {
        &self.meta
    }
}

/// A parsed compilation unit: either a script (statements plus an optional
/// trailing expression) or a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramData {
    pub body: Vec<Statement>,
    pub trailing_expression: Option<Expr>,
    pub meta: Meta,
}
