//! The checker's output tree: a fully resolved, typed program built fresh
//! from the AST rather than a side-table of annotations hung off it. Every
//! expression node carries its resolved [`Type`] inline, operator calls are
//! already bound to concrete `op_*` methods, and generic instantiations are
//! already mangled to concrete names. The lowerer consumes this tree
//! directly.

use crate::types::Type;
use crate::ast::{BinaryOp, UnaryOp};
use crate::source::Span;
use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct CheckedProgram {
    pub modules: Vec<CheckedModuleInfo>,
    pub structs: FxHashMap<String, StructInfo>,
    pub enums: FxHashMap<String, EnumInfo>,
    pub functions: FxHashMap<String, FunctionInfo>,
    pub externs: FxHashMap<String, ExternInfo>,
    pub consts: FxHashMap<String, ConstInfo>,
    /// Order functions were finalized in; the lowerer emits KIR functions
    /// in this order so output is deterministic run to run.
    pub function_order: Vec<String>,
    /// Order top-level consts were finalized in.
    pub const_order: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ConstInfo {
    pub name: String,
    pub ty: Type,
    pub value: CheckedExpr,
}

#[derive(Clone, Debug)]
pub struct CheckedModuleInfo {
    pub name: String,
    pub is_main: bool,
}

#[derive(Clone, Debug)]
pub struct StructInfo {
    pub name: String,
    pub fields: Vec<(String, Type)>,
    pub has_destroy: bool,
    pub has_oncopy: bool,
    pub has_op_eq: bool,
}

#[derive(Clone, Debug)]
pub struct EnumInfo {
    pub name: String,
    pub base_type: Type,
    pub variants: Vec<VariantInfo>,
}

#[derive(Clone, Debug)]
pub struct VariantInfo {
    pub name: String,
    pub discriminant: i64,
    pub fields: Vec<(String, Type)>,
}

#[derive(Clone, Debug)]
pub struct FunctionInfo {
    pub mangled_name: String,
    pub module_name: String,
    pub params: Vec<ParamInfo>,
    pub return_type: Type,
    /// Ordered struct-type names; position is the 1-based tag.
    pub throws: Vec<String>,
    pub body: CheckedBlock,
    pub is_method_of: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub name: String,
    pub ty: Type,
    pub is_mut: bool,
    pub is_move: bool,
}

#[derive(Clone, Debug)]
pub struct ExternInfo {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
}

pub type CheckedBlock = Vec<CheckedStmt>;

#[derive(Clone, Debug)]
pub enum CheckedStmt {
    Let {
        name: String,
        ty: Type,
        value: CheckedExpr,
        is_mut: bool,
    },
    Const {
        name: String,
        ty: Type,
        value: CheckedExpr,
    },
    Assign {
        target: CheckedExpr,
        value: CheckedExpr,
    },
    Expr(CheckedExpr),
    Return(Option<CheckedExpr>),
    Throw {
        struct_name: String,
        tag_index: u32,
        value: CheckedExpr,
    },
    If {
        cond: CheckedExpr,
        then_branch: CheckedBlock,
        else_branch: Option<CheckedBlock>,
    },
    While {
        cond: CheckedExpr,
        body: CheckedBlock,
    },
    For {
        var: String,
        elem_ty: Type,
        start: CheckedExpr,
        end: CheckedExpr,
        inclusive: bool,
        body: CheckedBlock,
    },
    Switch {
        subject: CheckedExpr,
        arms: Vec<CheckedSwitchArm>,
        default: Option<CheckedBlock>,
    },
    Defer(Box<CheckedStmt>),
    Unsafe(CheckedBlock),
    Break,
    Continue,
}

#[derive(Clone, Debug)]
pub struct CheckedSwitchArm {
    pub values: Vec<CheckedCaseValue>,
    pub body: CheckedBlock,
}

#[derive(Clone, Debug)]
pub enum CheckedCaseValue {
    Const(i64),
    Variant {
        discriminant: i64,
        bindings: Vec<(String, Type)>,
    },
}

#[derive(Clone, Debug)]
pub struct CheckedExpr {
    pub kind: Box<CheckedExprKind>,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum CheckedExprKind {
    IntLiteral(i128),
    FloatLiteral(f64),
    StringLiteral(String),
    BoolLiteral(bool),
    Null,
    ArrayLiteral(Vec<CheckedExpr>),
    Local(String),
    GlobalConst(String),
    Call {
        mangled_name: String,
        args: Vec<CheckedExpr>,
    },
    ExternCall {
        name: String,
        args: Vec<CheckedExpr>,
    },
    /// A user method call (`obj.method(args)`) not bound to one of the
    /// reserved `op_*` operator names.
    MethodCall {
        mangled_name: String,
        receiver: Box<CheckedExpr>,
        args: Vec<CheckedExpr>,
    },
    /// An operator-overload binding: `self` and any struct arguments are
    /// passed by address.
    OperatorCall {
        mangled_name: String,
        receiver: Box<CheckedExpr>,
        args: Vec<CheckedExpr>,
    },
    StructLiteral {
        name: String,
        fields: Vec<CheckedExpr>,
    },
    FieldAccess {
        base: Box<CheckedExpr>,
        field: String,
    },
    Index {
        base: Box<CheckedExpr>,
        index: Box<CheckedExpr>,
        static_length: Option<u64>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<CheckedExpr>,
    },
    UnaryOperatorCall {
        mangled_name: String,
        receiver: Box<CheckedExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<CheckedExpr>,
        rhs: Box<CheckedExpr>,
        operand_type: Type,
    },
    /// Field-wise structural comparison, used for `==`/`!=` on a struct
    /// without a user `op_eq`.
    StructEqCompare {
        lhs: Box<CheckedExpr>,
        rhs: Box<CheckedExpr>,
        negate: bool,
    },
    LogicalAnd(Box<CheckedExpr>, Box<CheckedExpr>),
    LogicalOr(Box<CheckedExpr>, Box<CheckedExpr>),
    Cast {
        expr: Box<CheckedExpr>,
        target: Type,
    },
    Move(Box<CheckedExpr>),
    Catch {
        call: Box<CheckedExpr>,
        kind: CheckedCatchKind,
    },
}

#[derive(Clone, Debug)]
pub enum CheckedCatchKind {
    Panic,
    /// Re-throws into the caller's own throws list; `tag_remap[callee_tag
    /// - 1]` gives the caller's tag for that callee error type.
    Throw { tag_remap: Vec<u32> },
    Clauses {
        clauses: Vec<CheckedCatchClause>,
        default: Option<CheckedBlock>,
    },
}

#[derive(Clone, Debug)]
pub struct CheckedCatchClause {
    pub tag_index: u32,
    pub struct_name: String,
    pub binding: Option<String>,
    pub body: CheckedBlock,
}
