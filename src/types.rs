//! The checker's internal `Type` sum and its assignability/coercion rules.
//!
//! A single tagged enum, compared structurally for primitives and nominally
//! for user types, with a distinguished "don't cascade" variant. The type
//! set here is small enough that cloning a `Type` is cheap, so there is no
//! interning layer.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int { bits: u8, signed: bool },
    Float { bits: u8 },
    Bool,
    Void,
    String,
    Null,
    CChar,
    /// Suppresses cascading diagnostics once a name fails to resolve.
    Error,
    Struct(String),
    Enum(String),
    Function(Box<FunctionType>),
    Ptr(Box<Type>),
    Array(Box<Type>, u64),
    Slice(Box<Type>),
    Range(Box<Type>),
    /// Only present inside a generic body before monomorphization.
    TypeParam(String),
    Module(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub params: Vec<ParamType>,
    pub return_type: Type,
    pub throws: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ParamType {
    pub name: String,
    pub ty: Type,
    pub is_mut: bool,
    pub is_move: bool,
}

impl Type {
    pub const I8: Type = Type::Int { bits: 8, signed: true };
    pub const I16: Type = Type::Int { bits: 16, signed: true };
    pub const I32: Type = Type::Int { bits: 32, signed: true };
    pub const I64: Type = Type::Int { bits: 64, signed: true };
    pub const U8: Type = Type::Int { bits: 8, signed: false };
    pub const U16: Type = Type::Int { bits: 16, signed: false };
    pub const U32: Type = Type::Int { bits: 32, signed: false };
    pub const U64: Type = Type::Int { bits: 64, signed: false };
    pub const F32: Type = Type::Float { bits: 32 };
    pub const F64: Type = Type::Float { bits: 64 };

    /// `int` is the canonical alias for `i32`; `usize` aliases `u64`,
    /// `double` aliases `f64`.
    pub fn from_alias(name: &str) -> Option<Type> {
        Some(match name {
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" | "int" => Type::I32,
            "i64" => Type::I64,
            "u8" => Type::U8,
            "u16" => Type::U16,
            "u32" => Type::U32,
            "u64" | "usize" => Type::U64,
            "f32" => Type::F32,
            "f64" | "double" => Type::F64,
            "bool" => Type::Bool,
            "void" => Type::Void,
            "string" => Type::String,
            "cchar" => Type::CChar,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn int_range(bits: u8, signed: bool) -> (i128, i128) {
        if signed {
            let max = (1i128 << (bits - 1)) - 1;
            let min = -(1i128 << (bits - 1));
            (min, max)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    /// Assignability: identical types assign; `Null` assigns to any `Ptr`;
    /// `Error` assigns to (and absorbs) anything.
    pub fn assignable_from(&self, source: &Type) -> bool {
        if self == source {
            return true;
        }
        if matches!(self, Type::Error) || matches!(source, Type::Error) {
            return true;
        }
        if matches!(source, Type::Null) && matches!(self, Type::Ptr(_)) {
            return true;
        }
        false
    }

    /// Literal coercion rules, applied only by the caller when the source
    /// expression is a literal AST node.
    pub fn accepts_int_literal(&self, value: i128) -> bool {
        match self {
            Type::Int { bits, signed } => {
                let (min, max) = Type::int_range(*bits, *signed);
                value >= min && value <= max
            }
            Type::Float { .. } => true,
            Type::Error => true,
            _ => false,
        }
    }

    pub fn accepts_float_literal(&self) -> bool {
        matches!(self, Type::Float { .. } | Type::Error)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int { bits, signed } => {
                write!(f, "{}{}", if *signed { "i" } else { "u" }, bits)
            }
            Type::Float { bits } => write!(f, "f{bits}"),
            Type::Bool => write!(f, "bool"),
            Type::Void => write!(f, "void"),
            Type::String => write!(f, "string"),
            Type::Null => write!(f, "null"),
            Type::CChar => write!(f, "cchar"),
            Type::Error => write!(f, "<error>"),
            Type::Struct(name) | Type::Enum(name) | Type::Module(name) => write!(f, "{name}"),
            Type::Function(ft) => {
                write!(f, "fn(")?;
                for (i, p) in ft.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ") -> {}", ft.return_type)
            }
            Type::Ptr(inner) => write!(f, "*{inner}"),
            Type::Array(inner, len) => write!(f, "[{inner}; {len}]"),
            Type::Slice(inner) => write!(f, "[{inner}]"),
            Type::Range(inner) => write!(f, "range<{inner}>"),
            Type::TypeParam(name) => write!(f, "{name}"),
        }
    }
}

/// Stable mangling suffix for an overload/monomorphization, derived from a
/// concrete parameter-type tuple: `foo__i32_string`.
pub fn mangle_type_suffix(types: &[Type]) -> String {
    let mut out = String::new();
    out.push('_');
    out.push('_');
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            out.push('_');
        }
        mangle_one(ty, &mut out);
    }
    out
}

/// Single-type mangled fragment, used to build generic instantiation names
/// (`<name>_<argName>_<argName>...`), which join with a single underscore
/// rather than the double-underscore overload suffix style.
pub fn mangle_type_name(ty: &Type) -> String {
    let mut out = String::new();
    mangle_one(ty, &mut out);
    out
}

fn mangle_one(ty: &Type, out: &mut String) {
    match ty {
        Type::Int { bits, signed } => out.push_str(&format!("{}{}", if *signed { "i" } else { "u" }, bits)),
        Type::Float { bits } => out.push_str(&format!("f{bits}")),
        Type::Bool => out.push_str("bool"),
        Type::Void => out.push_str("void"),
        Type::String => out.push_str("string"),
        Type::Null => out.push_str("null"),
        Type::CChar => out.push_str("cchar"),
        Type::Error => out.push_str("error"),
        Type::Struct(name) | Type::Enum(name) => out.push_str(name),
        Type::Ptr(inner) => {
            out.push('p');
            mangle_one(inner, out);
        }
        Type::Array(inner, len) => {
            out.push_str(&format!("a{len}"));
            mangle_one(inner, out);
        }
        Type::Slice(inner) => {
            out.push('s');
            mangle_one(inner, out);
        }
        Type::Range(inner) => {
            out.push('r');
            mangle_one(inner, out);
        }
        Type::Function(_) => out.push_str("fnptr"),
        Type::TypeParam(name) => out.push_str(name),
        Type::Module(name) => out.push_str(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_literal_fit_boundaries() {
        assert!(Type::U8.accepts_int_literal(255));
        assert!(!Type::U8.accepts_int_literal(256));
        assert!(!Type::I8.accepts_int_literal(-129));
        assert!(Type::I8.accepts_int_literal(-128));
    }

    #[test]
    fn null_assigns_to_pointer_only() {
        assert!(Type::Ptr(Box::new(Type::I32)).assignable_from(&Type::Null));
        assert!(!Type::I32.assignable_from(&Type::Null));
    }

    #[test]
    fn error_absorbs_and_suppresses_cascades() {
        assert!(Type::Error.assignable_from(&Type::I32));
        assert!(Type::I32.assignable_from(&Type::Error));
    }

    #[test]
    fn canonical_aliases() {
        assert_eq!(Type::from_alias("int"), Some(Type::I32));
        assert_eq!(Type::from_alias("usize"), Some(Type::U64));
        assert_eq!(Type::from_alias("double"), Some(Type::F64));
    }
}
