//! Multi-module semantic analysis: registers declarations, resolves types,
//! checks statements and expressions, monomorphizes generics, binds
//! operators, and tracks throws obligations. Produces a [`CheckedProgram`]
//! ready for lowering.
//!
//! Three passes run over the whole module set before any function body is
//! checked: collect every top-level name (so later modules can reference
//! earlier ones and vice versa within the flat declaration namespace),
//! resolve struct/enum/extern/function type skeletons, then check bodies
//! module by module in the resolver's topological order.

mod exprs;
mod stmts;

use crate::ast;
use crate::checked::*;
use crate::diagnostics::DiagnosticSink;
use crate::resolver::ResolvedModule;
use crate::source::Span;
use crate::symbols::{ScopeFlags, ScopeStack, Symbol, VariableSymbol};
use crate::types::{FunctionType, ParamType, Type};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

pub struct StructDef {
    pub decl: ast::StructDecl,
    pub module: String,
    /// Field types with `Type::TypeParam` placeholders for generic structs.
    pub fields: Vec<(String, Type)>,
}

pub struct EnumDef {
    pub decl: ast::EnumDecl,
    pub module: String,
    pub base_type: Type,
    pub variants: Vec<VariantInfo>,
}

#[derive(Clone)]
pub struct FuncOverloadDef {
    pub decl: ast::FunctionDecl,
    pub module: String,
    pub is_method_of: Option<String>,
    /// With `Type::TypeParam` placeholders for generic functions/methods.
    pub signature: FunctionType,
    pub mangled_name: String,
}

pub struct ConstDef {
    pub decl: ast::ConstDecl,
    pub module: String,
    pub ty: Option<Type>,
}

#[derive(Default)]
pub struct GlobalTables {
    pub structs: FxHashMap<String, StructDef>,
    pub enums: FxHashMap<String, EnumDef>,
    pub externs: FxHashMap<String, ast::ExternDecl>,
    pub consts: FxHashMap<String, ConstDef>,
    pub functions: FxHashMap<String, Vec<FuncOverloadDef>>,
}

pub struct Checker {
    pub tables: GlobalTables,
    pub program: CheckedProgram,
    pub monomorphized_functions: FxHashSet<String>,
    pub monomorphized_structs: FxHashSet<String>,
    /// Maps a monomorphized struct's mangled name back to its generic base
    /// name, so a method call on an instantiated generic struct can still
    /// find the method registered under `<base>_<method>`.
    pub struct_bases: FxHashMap<String, String>,
    /// Concrete type-parameter bindings recorded for each monomorphized
    /// struct, so its methods can be monomorphized on first use.
    pub struct_bindings: FxHashMap<String, FxHashMap<String, Type>>,
    pub scopes: ScopeStack,
    /// Per-module alias table built while checking that module: a name
    /// introduced by `import` maps to either a single global symbol
    /// (function/struct/enum/const) or, for a whole-module import, to the
    /// module it names.
    pub import_aliases: FxHashMap<String, ImportTarget>,
    pub current_module: String,
    pub current_file: PathBuf,
}

#[derive(Clone, Debug)]
pub enum ImportTarget {
    Global(String),
    Module(String),
}

impl Checker {
    fn new() -> Self {
        Checker {
            tables: GlobalTables::default(),
            program: CheckedProgram {
                modules: Vec::new(),
                structs: FxHashMap::default(),
                enums: FxHashMap::default(),
                functions: FxHashMap::default(),
                externs: FxHashMap::default(),
                consts: FxHashMap::default(),
                function_order: Vec::new(),
                const_order: Vec::new(),
            },
            monomorphized_functions: FxHashSet::default(),
            monomorphized_structs: FxHashSet::default(),
            struct_bases: FxHashMap::default(),
            struct_bindings: FxHashMap::default(),
            scopes: ScopeStack::new(),
            import_aliases: FxHashMap::default(),
            current_module: String::new(),
            current_file: PathBuf::new(),
        }
    }
}

pub fn check_program(modules: &[ResolvedModule], sink: &mut DiagnosticSink) -> CheckedProgram {
    let mut c = Checker::new();

    collect_names(&mut c, modules, sink);
    resolve_skeletons(&mut c, sink);
    check_bodies(&mut c, modules, sink);

    c.program
}

// ---------------------------------------------------------------------
// Pass A: collect names
// ---------------------------------------------------------------------

fn collect_names(c: &mut Checker, modules: &[ResolvedModule], sink: &mut DiagnosticSink) {
    for m in modules {
        c.program.modules.push(CheckedModuleInfo {
            name: m.name.clone(),
            is_main: m.name == "main",
        });
        for item in &m.ast.items {
            match item {
                ast::Item::Struct(s) => {
                    if c.tables.structs.contains_key(&s.name) || c.tables.enums.contains_key(&s.name) {
                        sink.error(&m.source.path, s.span, format!("duplicate declaration of '{}'", s.name));
                        continue;
                    }
                    c.tables.structs.insert(
                        s.name.clone(),
                        StructDef {
                            decl: s.clone(),
                            module: m.name.clone(),
                            fields: Vec::new(),
                        },
                    );
                }
                ast::Item::Enum(e) => {
                    if c.tables.structs.contains_key(&e.name) || c.tables.enums.contains_key(&e.name) {
                        sink.error(&m.source.path, e.span, format!("duplicate declaration of '{}'", e.name));
                        continue;
                    }
                    c.tables.enums.insert(
                        e.name.clone(),
                        EnumDef {
                            decl: e.clone(),
                            module: m.name.clone(),
                            base_type: Type::I32,
                            variants: Vec::new(),
                        },
                    );
                }
                ast::Item::Extern(x) => {
                    if c.tables.externs.contains_key(&x.name) {
                        sink.error(&m.source.path, x.span, format!("duplicate extern declaration of '{}'", x.name));
                        continue;
                    }
                    c.tables.externs.insert(x.name.clone(), x.clone());
                }
                ast::Item::Const(k) => {
                    if c.tables.consts.contains_key(&k.name) {
                        sink.error(&m.source.path, k.span, format!("duplicate declaration of '{}'", k.name));
                        continue;
                    }
                    c.tables.consts.insert(
                        k.name.clone(),
                        ConstDef {
                            decl: k.clone(),
                            module: m.name.clone(),
                            ty: None,
                        },
                    );
                }
                ast::Item::Function(f) => {
                    c.tables.functions.entry(f.name.clone()).or_default().push(FuncOverloadDef {
                        decl: f.clone(),
                        module: m.name.clone(),
                        is_method_of: None,
                        signature: FunctionType { params: Vec::new(), return_type: Type::Void, throws: Vec::new() },
                        mangled_name: String::new(),
                    });
                }
                ast::Item::Import(_) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------
// Pass B: resolve skeletons
// ---------------------------------------------------------------------

fn resolve_skeletons(c: &mut Checker, sink: &mut DiagnosticSink) {
    let struct_names: Vec<String> = c.tables.structs.keys().cloned().collect();
    for name in &struct_names {
        let (generics, fields_src, file, span) = {
            let def = &c.tables.structs[name];
            (
                def.decl.generics.clone(),
                def.decl.fields.clone(),
                module_file(c, &def.module),
                def.decl.span,
            )
        };
        let gset: FxHashSet<String> = generics.iter().cloned().collect();
        let mut fields = Vec::new();
        for f in &fields_src {
            let ty = resolve_type(c, &f.ty, &gset, sink, &file);
            fields.push((f.name.clone(), ty));
        }
        c.tables.structs.get_mut(name).unwrap().fields = fields;
        let _ = span;
    }

    let enum_names: Vec<String> = c.tables.enums.keys().cloned().collect();
    for name in &enum_names {
        let (decl, file) = {
            let def = &c.tables.enums[name];
            (def.decl.clone(), module_file(c, &def.module))
        };
        let base_type = match &decl.base_type {
            Some(te) => resolve_type(c, te, &FxHashSet::default(), sink, &file),
            None => Type::I32,
        };
        let mut variants = Vec::new();
        let mut next = 0i64;
        for v in &decl.variants {
            let discriminant = match v.value {
                Some(explicit) => explicit,
                None => next,
            };
            next = discriminant + 1;
            let mut fields = Vec::new();
            for f in &v.fields {
                let ty = resolve_type(c, &f.ty, &FxHashSet::default(), sink, &file);
                fields.push((f.name.clone(), ty));
            }
            variants.push(VariantInfo {
                name: v.name.clone(),
                discriminant,
                fields,
            });
        }
        let def = c.tables.enums.get_mut(name).unwrap();
        def.base_type = base_type;
        def.variants = variants;
    }

    let extern_names: Vec<String> = c.tables.externs.keys().cloned().collect();
    for name in &extern_names {
        let decl = c.tables.externs[name].clone();
        let file = c.current_file.clone();
        let params: Vec<Type> = decl.params.iter().map(|te| resolve_type(c, te, &FxHashSet::default(), sink, &file)).collect();
        let return_type = match &decl.return_type {
            Some(te) => resolve_type(c, te, &FxHashSet::default(), sink, &file),
            None => Type::Void,
        };
        c.program.externs.insert(
            name.clone(),
            ExternInfo {
                name: name.clone(),
                params,
                return_type,
            },
        );
    }

    let const_names: Vec<String> = c.tables.consts.keys().cloned().collect();
    for name in &const_names {
        let (decl, module) = {
            let def = &c.tables.consts[name];
            (def.decl.clone(), def.module.clone())
        };
        if let Some(te) = &decl.ty {
            let file = module_file(c, &module);
            let ty = resolve_type(c, te, &FxHashSet::default(), sink, &file);
            c.tables.consts.get_mut(name).unwrap().ty = Some(ty);
        }
    }

    // Struct methods become ordinary overload-bearing functions mangled
    // `<Struct>_<method>`.
    let struct_names: Vec<String> = c.tables.structs.keys().cloned().collect();
    for sname in &struct_names {
        let (methods, module, generics) = {
            let def = &c.tables.structs[sname];
            (def.decl.methods.clone(), def.module.clone(), def.decl.generics.clone())
        };
        let gset: FxHashSet<String> = generics.iter().cloned().collect();
        for m in &methods {
            let mangled_base = format!("{sname}_{}", m.name);
            c.tables.functions.entry(mangled_base.clone()).or_default().push(FuncOverloadDef {
                decl: m.clone(),
                module: module.clone(),
                is_method_of: Some(sname.clone()),
                signature: FunctionType { params: Vec::new(), return_type: Type::Void, throws: Vec::new() },
                mangled_name: String::new(),
            });
            let _ = &gset;
        }
    }

    let fn_names: Vec<String> = c.tables.functions.keys().cloned().collect();
    for name in &fn_names {
        let count = c.tables.functions[name].len();
        for i in 0..count {
            let (decl, module, is_method_of) = {
                let def = &c.tables.functions[name][i];
                (def.decl.clone(), def.module.clone(), def.is_method_of.clone())
            };
            let file = module_file(c, &module);
            let gset: FxHashSet<String> = decl.generics.iter().cloned().collect();
            let params: Vec<ParamType> = decl
                .params
                .iter()
                .map(|p| ParamType {
                    name: p.name.clone(),
                    ty: resolve_type(c, &p.ty, &gset, sink, &file),
                    is_mut: p.is_mut,
                    is_move: p.is_move,
                })
                .collect();
            let return_type = match &decl.return_type {
                Some(te) => resolve_type(c, te, &gset, sink, &file),
                None => Type::Void,
            };
            let throws: Vec<Type> = decl
                .throws
                .iter()
                .map(|te| resolve_type(c, te, &gset, sink, &file))
                .collect();
            c.tables.functions.get_mut(name).unwrap()[i].signature = FunctionType {
                params,
                return_type,
                throws,
            };
            let _ = is_method_of;
        }

        // Collision check and mangled-name assignment: a unique overload
        // keeps the bare name, multiple overloads each get the
        // parameter-tuple suffix.
        let overloads = &c.tables.functions[name];
        if overloads.len() == 1 {
            c.tables.functions.get_mut(name).unwrap()[0].mangled_name = name.clone();
        } else {
            let mut seen_tuples: Vec<Vec<Type>> = Vec::new();
            for i in 0..overloads.len() {
                let tuple: Vec<Type> = c.tables.functions[name][i].signature.params.iter().map(|p| p.ty.clone()).collect();
                if seen_tuples.contains(&tuple) {
                    let span = c.tables.functions[name][i].decl.span;
                    let file = module_file(c, &c.tables.functions[name][i].module);
                    sink.error(&file, span, format!("overload of '{name}' collides with an existing overload"));
                }
                seen_tuples.push(tuple.clone());
                let suffix = crate::types::mangle_type_suffix(&tuple);
                c.tables.functions.get_mut(name).unwrap()[i].mangled_name = format!("{name}{suffix}");
            }
        }
    }
}

fn module_file(c: &Checker, module: &str) -> PathBuf {
    let _ = c;
    PathBuf::from(format!("{module}.kei"))
}

/// Resolves a surface `TypeExpr` to an internal `Type`, substituting
/// declared generic parameter names to `Type::TypeParam` and instantiating
/// any explicit generic struct type arguments it names.
pub fn resolve_type(c: &mut Checker, te: &ast::TypeExpr, generics: &FxHashSet<String>, sink: &mut DiagnosticSink, file: &Path) -> Type {
    match te {
        ast::TypeExpr::Named { name, args, span } => {
            if generics.contains(name) {
                if !args.is_empty() {
                    sink.error(file, *span, format!("generic parameter '{name}' takes no type arguments"));
                }
                return Type::TypeParam(name.clone());
            }
            if let Some(t) = Type::from_alias(name) {
                if !args.is_empty() {
                    sink.error(file, *span, format!("'{name}' takes no type arguments"));
                }
                return t;
            }
            if c.tables.structs.contains_key(name) {
                let struct_generics = c.tables.structs[name].decl.generics.clone();
                if struct_generics.is_empty() {
                    if !args.is_empty() {
                        sink.error(file, *span, format!("'{name}' is not generic"));
                    }
                    return Type::Struct(name.clone());
                }
                if args.len() != struct_generics.len() {
                    sink.error(file, *span, format!("'{name}' expects {} type argument(s)", struct_generics.len()));
                    return Type::Error;
                }
                let concrete: Vec<Type> = args.iter().map(|a| resolve_type(c, a, generics, sink, file)).collect();
                let mangled = instantiate_struct(c, name, &concrete, sink, file, *span);
                return Type::Struct(mangled);
            }
            if c.tables.enums.contains_key(name) {
                if !args.is_empty() {
                    sink.error(file, *span, format!("'{name}' is not generic"));
                }
                return Type::Enum(name.clone());
            }
            sink.error(file, *span, format!("unknown type '{name}'"));
            Type::Error
        }
        ast::TypeExpr::Ptr(inner, _) => Type::Ptr(Box::new(resolve_type(c, inner, generics, sink, file))),
        ast::TypeExpr::Array(inner, len, _) => Type::Array(Box::new(resolve_type(c, inner, generics, sink, file)), *len),
        ast::TypeExpr::Slice(inner, _) => Type::Slice(Box::new(resolve_type(c, inner, generics, sink, file))),
    }
}

/// Monomorphizes a generic struct for a concrete argument list, memoized by
/// `<name>_<argName>_<argName>...`. Returns the mangled struct name.
pub fn instantiate_struct(c: &mut Checker, base: &str, args: &[Type], sink: &mut DiagnosticSink, file: &Path, span: Span) -> String {
    let suffix: String = args.iter().map(crate::types::mangle_type_name).collect::<Vec<_>>().join("_");
    let mangled = format!("{base}_{suffix}");
    if c.monomorphized_structs.contains(&mangled) {
        return mangled;
    }
    c.monomorphized_structs.insert(mangled.clone());
    c.struct_bases.insert(mangled.clone(), base.to_string());

    let (generics, field_src) = {
        let def = &c.tables.structs[base];
        (def.decl.generics.clone(), def.decl.fields.clone())
    };
    if generics.len() != args.len() {
        sink.error(file, span, format!("'{base}' expects {} type argument(s)", generics.len()));
        return mangled;
    }
    let bindings: FxHashMap<String, Type> = generics.into_iter().zip(args.iter().cloned()).collect();
    c.struct_bindings.insert(mangled.clone(), bindings.clone());
    let empty_generics = FxHashSet::default();
    let mut fields = Vec::new();
    for f in &field_src {
        let ty = resolve_type(c, &f.ty, &empty_generics, sink, file);
        let ty = substitute(&ty, &bindings);
        fields.push((f.name.clone(), ty));
    }
    c.program.structs.insert(
        mangled.clone(),
        StructInfo {
            name: mangled.clone(),
            fields,
            has_destroy: false,
            has_oncopy: false,
            has_op_eq: false,
        },
    );
    mangled
}

/// Replaces every `Type::TypeParam` occurrence with its bound concrete type.
pub fn substitute(ty: &Type, bindings: &FxHashMap<String, Type>) -> Type {
    match ty {
        Type::TypeParam(name) => bindings.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Ptr(inner) => Type::Ptr(Box::new(substitute(inner, bindings))),
        Type::Array(inner, len) => Type::Array(Box::new(substitute(inner, bindings)), *len),
        Type::Slice(inner) => Type::Slice(Box::new(substitute(inner, bindings))),
        Type::Range(inner) => Type::Range(Box::new(substitute(inner, bindings))),
        other => other.clone(),
    }
}

/// Attempts to bind every name in `generics` by structurally matching a
/// declared (possibly generic) parameter type against a concrete argument
/// type. Used for both generic function calls and generic struct literals,
/// since neither has call-site syntax for explicit type arguments.
pub fn unify(declared: &Type, concrete: &Type, bindings: &mut FxHashMap<String, Type>) -> bool {
    match (declared, concrete) {
        (Type::TypeParam(name), _) => {
            if let Some(existing) = bindings.get(name) {
                existing == concrete
            } else {
                bindings.insert(name.clone(), concrete.clone());
                true
            }
        }
        (Type::Ptr(a), Type::Ptr(b)) => unify(a, b, bindings),
        (Type::Array(a, la), Type::Array(b, lb)) => la == lb && unify(a, b, bindings),
        (Type::Slice(a), Type::Slice(b)) => unify(a, b, bindings),
        (Type::Range(a), Type::Range(b)) => unify(a, b, bindings),
        _ => declared == concrete || matches!(concrete, Type::Error) || matches!(declared, Type::Error),
    }
}

// ---------------------------------------------------------------------
// Pass C: check bodies
// ---------------------------------------------------------------------

fn check_bodies(c: &mut Checker, modules: &[ResolvedModule], sink: &mut DiagnosticSink) {
    for m in modules {
        c.current_module = m.name.clone();
        c.current_file = m.source.path.clone();
        c.import_aliases.clear();
        build_import_aliases(c, m, sink);

        for item in &m.ast.items {
            match item {
                ast::Item::Function(f) if f.generics.is_empty() => {
                    self::exprs::check_top_level_function(c, f, None, sink);
                }
                ast::Item::Struct(s) if s.decl_generics_empty() => {
                    for method in &s.methods {
                        if method.generics.is_empty() {
                            self::exprs::check_top_level_function(c, method, Some(s.name.clone()), sink);
                        }
                    }
                }
                ast::Item::Const(k) => {
                    self::exprs::check_top_level_const(c, k, sink);
                }
                _ => {}
            }
        }
    }
}

trait StructDeclExt {
    fn decl_generics_empty(&self) -> bool;
}
impl StructDeclExt for ast::StructDecl {
    fn decl_generics_empty(&self) -> bool {
        self.generics.is_empty()
    }
}

fn build_import_aliases(c: &mut Checker, m: &ResolvedModule, sink: &mut DiagnosticSink) {
    for item in &m.ast.items {
        let ast::Item::Import(imp) = item else { continue };
        if imp.names.is_empty() {
            let alias = imp.path.last().cloned().unwrap_or_default();
            let target_module = imp.path.join(".");
            c.import_aliases.insert(alias, ImportTarget::Module(target_module));
            continue;
        }
        let target_module = imp.path.join(".");
        for name in &imp.names {
            if !is_exported_by(c, &target_module, name) {
                sink.error(&m.source.path, imp.span, format!("'{name}' is not exported by module '{target_module}'"));
                continue;
            }
            c.import_aliases.insert(name.clone(), ImportTarget::Global(name.clone()));
        }
    }
}

fn is_exported_by(c: &Checker, module: &str, name: &str) -> bool {
    if let Some(d) = c.tables.functions.get(name) {
        return d.iter().any(|o| o.module == module && o.decl.is_pub);
    }
    if let Some(d) = c.tables.structs.get(name) {
        return d.module == module && d.decl.is_pub;
    }
    if let Some(d) = c.tables.enums.get(name) {
        return d.module == module && d.decl.is_pub;
    }
    if let Some(d) = c.tables.consts.get(name) {
        return d.module == module && d.decl.is_pub;
    }
    false
}

/// True if an overload found under lookup key `name` is usable from the
/// module currently being checked: either declared there directly, or
/// explicitly imported by that name (`import {name} from mod;`, which only
/// ever aliases a name `is_exported_by` already confirmed is `pub`). A
/// non-`pub` symbol in another module, or a `pub` one never imported, is
/// not visible here — matching §4.4's export/import rule rather than the
/// flat whole-program table's raw presence.
pub(crate) fn is_visible_overload(c: &Checker, name: &str, o: &FuncOverloadDef) -> bool {
    o.module == c.current_module || matches!(c.import_aliases.get(name), Some(ImportTarget::Global(g)) if g == name)
}

fn is_visible_const(c: &Checker, name: &str, d: &ConstDef) -> bool {
    d.module == c.current_module || matches!(c.import_aliases.get(name), Some(ImportTarget::Global(g)) if g == name)
}

/// Lexical-then-global name lookup used throughout expression checking.
pub enum Resolved {
    Variable(Type, bool /* is_mut */),
    Function(String /* name key into tables.functions */),
    Const(String),
    Module(String),
    Unknown,
}

pub fn lookup_name(c: &Checker, name: &str) -> Resolved {
    if let Some(Symbol::Variable(v)) = c.scopes.lookup(name) {
        return Resolved::Variable(v.ty.clone(), v.is_mutable);
    }
    if let Some(ImportTarget::Module(m)) = c.import_aliases.get(name) {
        return Resolved::Module(m.clone());
    }
    if let Some(overloads) = c.tables.functions.get(name) {
        if overloads.iter().any(|o| is_visible_overload(c, name, o)) {
            return Resolved::Function(name.to_string());
        }
    }
    if let Some(d) = c.tables.consts.get(name) {
        if is_visible_const(c, name, d) {
            return Resolved::Const(name.to_string());
        }
    }
    Resolved::Unknown
}
