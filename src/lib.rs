//! `keic`: a whole-program compiler for the Kei systems language, emitting
//! portable C for a host compiler to finish the job.
//!
//! Pipeline, leaves first: [`source`]/[`diagnostics`] underpin everything;
//! [`lexer`] and [`parser`] turn source text into an [`ast::Module`] per
//! file; [`resolver`] discovers and orders the import graph; [`checker`]
//! performs multi-module semantic analysis into a [`checked::CheckedProgram`];
//! [`lower`] turns that into [`kir::Module`]; [`ssa`] runs mem2reg then
//! de-SSA in place; [`emit`] prints the result as C; [`driver`] wires the
//! whole thing together and shells out to a host C compiler.

pub mod ast;
pub mod checked;
pub mod checker;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod emit;
pub mod kir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod resolver;
pub mod source;
pub mod ssa;
pub mod symbols;
pub mod token;
pub mod trace;
pub mod types;
