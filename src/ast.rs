//! AST model: one tagged enum per syntactic category, each node carrying a
//! [`Span`]. A single flat `enum` per category dispatched by pattern match,
//! no base-class hierarchy, split into `Item` / `Stmt` / `Expr` / `TypeExpr`
//! so declarations, statements, and expressions each get their own shape.

use crate::source::Span;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum TypeExpr {
    /// A named type, optionally with generic arguments: `int`, `MyStruct`,
    /// `Box<T>`.
    Named {
        name: String,
        args: Vec<TypeExpr>,
        span: Span,
    },
    Ptr(Box<TypeExpr>, Span),
    Array(Box<TypeExpr>, u64, Span),
    Slice(Box<TypeExpr>, Span),
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. } => *span,
            TypeExpr::Ptr(_, s) | TypeExpr::Array(_, _, s) | TypeExpr::Slice(_, s) => *s,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Module {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, Serialize)]
pub enum Item {
    Import(ImportDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    Extern(ExternDecl),
    Const(ConstDecl),
}

#[derive(Clone, Debug, Serialize)]
pub struct ImportDecl {
    /// Dotted path segments, e.g. `["io"]` for `import {print} from io;`.
    pub path: Vec<String>,
    /// Named bindings pulled in (`import {print} from io;`); empty means
    /// the whole module is imported under its last path segment.
    pub names: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct StructDecl {
    pub name: String,
    pub is_pub: bool,
    pub generics: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct EnumDecl {
    pub name: String,
    pub is_pub: bool,
    pub base_type: Option<TypeExpr>,
    pub variants: Vec<EnumVariantDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct EnumVariantDecl {
    pub name: String,
    /// Explicit discriminant for C-style variants (`Red = 1`).
    pub value: Option<i64>,
    /// Payload fields for data variants (`Some(value: T)`).
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    pub is_pub: bool,
    pub generics: Vec<String>,
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeExpr>,
    pub throws: Vec<TypeExpr>,
    /// `None` for trait-like forward declarations; always `Some` for the
    /// language as specified (no function declarations without a body
    /// other than `extern`).
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub is_mut: bool,
    pub is_move: bool,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExternDecl {
    pub name: String,
    pub params: Vec<TypeExpr>,
    pub return_type: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConstDecl {
    pub name: String,
    pub is_pub: bool,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub span: Span,
}

pub type Block = Vec<Stmt>;

#[derive(Clone, Debug, Serialize)]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
        is_mut: bool,
        span: Span,
    },
    Const {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    Return(Option<Expr>, Span),
    Throw(Expr, Span),
    If {
        cond: Expr,
        then_branch: Block,
        else_branch: Option<Block>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    For {
        var: String,
        start: Expr,
        end: Expr,
        inclusive: bool,
        body: Block,
        span: Span,
    },
    Switch {
        subject: Expr,
        arms: Vec<SwitchArm>,
        default: Option<Block>,
        span: Span,
    },
    Defer(Box<Stmt>, Span),
    Unsafe(Block, Span),
    Break(Span),
    Continue(Span),
}

#[derive(Clone, Debug, Serialize)]
pub struct SwitchArm {
    /// One or more case values sharing a body (multi-value arms).
    pub values: Vec<SwitchCaseValue>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub enum SwitchCaseValue {
    /// C-style enum variant or integer constant.
    Const(String),
    /// Data-carrying variant with payload bindings:
    /// `NotFound e: { ... }` or `Some(value): { ... }`.
    Variant {
        name: String,
        bindings: Vec<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// The `op_*` struct method name this operator binds to, if overloadable.
    pub fn method_name(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "op_add",
            BinaryOp::Sub => "op_sub",
            BinaryOp::Mul => "op_mul",
            BinaryOp::Div => "op_div",
            BinaryOp::Mod => "op_mod",
            BinaryOp::Eq => "op_eq",
            BinaryOp::Neq => "op_neq",
            BinaryOp::Lt => "op_lt",
            BinaryOp::Le => "op_le",
            BinaryOp::Gt => "op_gt",
            BinaryOp::Ge => "op_ge",
            BinaryOp::And => "op_and",
            BinaryOp::Or => "op_or",
            BinaryOp::Xor => "op_xor",
            BinaryOp::Shl => "op_shl",
            BinaryOp::Shr => "op_shr",
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => return None,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub enum CatchKind {
    Panic,
    Throw,
    Clauses {
        clauses: Vec<CatchClause>,
        default: Option<Block>,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct CatchClause {
    pub error_type: String,
    pub binding: Option<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, Serialize)]
pub enum Expr {
    IntLiteral {
        text: String,
        suffix: Option<String>,
        span: Span,
    },
    FloatLiteral {
        text: String,
        suffix: Option<String>,
        span: Span,
    },
    StringLiteral(String, Span),
    BoolLiteral(bool, Span),
    NullLiteral(Span),
    ArrayLiteral(Vec<Expr>, Span),
    Ident(String, Span),
    StructLiteral {
        name: String,
        type_args: Vec<TypeExpr>,
        fields: Vec<(String, Expr)>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        type_args: Vec<TypeExpr>,
        args: Vec<Expr>,
        span: Span,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        span: Span,
    },
    FieldAccess {
        base: Box<Expr>,
        field: String,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Cast {
        expr: Box<Expr>,
        ty: TypeExpr,
        span: Span,
    },
    Move(Box<Expr>, Span),
    Catch {
        call: Box<Expr>,
        kind: CatchKind,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::FloatLiteral { span, .. }
            | Expr::StringLiteral(_, span)
            | Expr::BoolLiteral(_, span)
            | Expr::NullLiteral(span)
            | Expr::ArrayLiteral(_, span)
            | Expr::Ident(_, span)
            | Expr::StructLiteral { span, .. }
            | Expr::Call { span, .. }
            | Expr::MethodCall { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Move(_, span)
            | Expr::Catch { span, .. } => *span,
        }
    }

    /// A literal AST node is one whose type may be coerced to fit its
    /// context (an int/float literal), as opposed to a variable reference.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::IntLiteral { .. } | Expr::FloatLiteral { .. }
        )
    }
}
