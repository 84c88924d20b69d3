//! Pipeline orchestration and host-C-compiler invocation.
//!
//! One-shot: resolve → check → lower → optimize → emit → (optionally) shell
//! out to `cc`/`gcc`/`clang`. Every stop point named in §6 of the spec is a
//! variant of [`Stage`]; `compile` drives the pipeline up to that point and
//! prints/executes whatever the stage calls for.

use crate::checker;
use crate::config::Config;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::emit;
use crate::lower;
use crate::resolver;
use crate::ssa;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Tokens,
    Ast,
    AstJson,
    Check,
    Kir,
    KirOpt,
    EmitC,
    Build,
    Run,
}

pub struct RunOutcome {
    /// Process exit code: the driver's own (0/1) unless `--run` replaces it
    /// with the compiled program's exit code.
    pub exit_code: i32,
}

/// Renders one diagnostic in the user-visible `error: <msg> at <file>:<l>:<c>`
/// format, resolving line/column against the matching source buffer when one
/// is available (module-resolution failures may predate any parsed source).
fn render(diag: &Diagnostic, sources: &[resolver::ResolvedModule]) -> String {
    let line_col = sources
        .iter()
        .find(|m| m.source.path == diag.file)
        .map(|m| m.source.line_col(diag.span.start))
        .unwrap_or_default();
    diag.render(line_col)
}

fn report(sink: &DiagnosticSink, sources: &[resolver::ResolvedModule]) {
    for diag in sink.iter() {
        eprintln!("{}", render(diag, sources));
    }
}

pub fn run(main_file: &Path, stage: Stage, config: &Config) -> RunOutcome {
    let start = Instant::now();

    let modules = match resolver::resolve(main_file, config) {
        Ok(modules) => modules,
        Err(diag) => {
            eprintln!("{}", render(&diag, &[]));
            return RunOutcome { exit_code: 1 };
        }
    };

    if stage == Stage::Tokens {
        for m in &modules {
            let mut sink = DiagnosticSink::new();
            let tokens = crate::lexer::Lexer::new(&m.source.path, &m.source.contents).tokenize(&mut sink);
            for t in &tokens {
                println!("{t:?}");
            }
            report(&sink, &modules);
            if sink.has_errors() {
                return RunOutcome { exit_code: 1 };
            }
        }
        return RunOutcome { exit_code: 0 };
    }

    if stage == Stage::Ast {
        for m in &modules {
            println!("// module {}", m.name);
            println!("{:#?}", m.ast);
        }
        return RunOutcome { exit_code: 0 };
    }

    if stage == Stage::AstJson {
        let asts: Vec<&crate::ast::Module> = modules.iter().map(|m| &m.ast).collect();
        match serde_json::to_string_pretty(&asts) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: failed to serialize AST: {e}");
                return RunOutcome { exit_code: 1 };
            }
        }
        return RunOutcome { exit_code: 0 };
    }

    let mut sink = DiagnosticSink::new();
    let checked = checker::check_program(&modules, &mut sink);
    crate::trace::timer!(start, "checked");
    report(&sink, &modules);
    if sink.has_errors() {
        return RunOutcome { exit_code: 1 };
    }

    if stage == Stage::Check {
        println!("check: ok ({} function(s))", checked.function_order.len());
        return RunOutcome { exit_code: 0 };
    }

    let mut kir_module = lower::lower_program(&checked);
    crate::trace::timer!(start, "lowered");

    if stage == Stage::Kir {
        println!("{kir_module:#?}");
        return RunOutcome { exit_code: 0 };
    }

    ssa::run(&mut kir_module);
    crate::trace::timer!(start, "optimized");

    if stage == Stage::KirOpt {
        println!("{kir_module:#?}");
        return RunOutcome { exit_code: 0 };
    }

    let c_source = emit::emit_module(&kir_module);
    crate::trace::timer!(start, "emitted");

    if stage == Stage::EmitC {
        println!("{c_source}");
        return RunOutcome { exit_code: 0 };
    }

    // Stage::Build or Stage::Run: write the .c file and invoke the host
    // compiler.
    let stem = main_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let dir = main_file.parent().unwrap_or_else(|| Path::new("."));
    let c_path = dir.join(format!("{stem}.c"));
    if let Err(e) = std::fs::write(&c_path, &c_source) {
        eprintln!("error: failed to write {}: {e}", c_path.display());
        return RunOutcome { exit_code: 1 };
    }

    let exe_path = dir.join(&stem);
    let cc = match probe_host_cc(config) {
        Some(cc) => cc,
        None => {
            eprintln!("error: no host C compiler found (tried cc, gcc, clang)");
            return RunOutcome { exit_code: 1 };
        }
    };

    let status = Command::new(&cc)
        .arg("-o")
        .arg(&exe_path)
        .arg(&c_path)
        .arg("-lm")
        .status();
    match status {
        Ok(s) if s.success() => {}
        Ok(s) => {
            eprintln!("error: {cc} exited with status {s}");
            return RunOutcome { exit_code: 1 };
        }
        Err(e) => {
            eprintln!("error: failed to invoke {cc}: {e}");
            return RunOutcome { exit_code: 1 };
        }
    }

    if stage != Stage::Run {
        return RunOutcome { exit_code: 0 };
    }

    match Command::new(&exe_path).status() {
        Ok(status) => RunOutcome {
            exit_code: status.code().unwrap_or(1),
        },
        Err(e) => {
            eprintln!("error: failed to execute {}: {e}", exe_path.display());
            RunOutcome { exit_code: 1 }
        }
    }
}

/// Probes `KEIC_CC`, then `cc`, `gcc`, `clang` in order, returning the first
/// one that exists on `PATH`.
fn probe_host_cc(config: &Config) -> Option<String> {
    if let Some(cc) = &config.cc_override {
        return Some(cc.clone());
    }
    for candidate in ["cc", "gcc", "clang"] {
        if which(candidate).is_some() {
            return Some(candidate.to_string());
        }
    }
    None
}

fn which(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}
