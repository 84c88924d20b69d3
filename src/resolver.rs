//! Module resolution: import discovery, cycle detection, topological order.
//!
//! A depth-first walk over `import` declarations that orders modules before
//! checking runs, searching a source root, a dependency root, and a
//! standard-library root in turn.

use crate::ast;
use crate::config::Config;
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::source::SourceFile;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};

pub struct ResolvedModule {
    pub name: String,
    pub source: SourceFile,
    pub ast: ast::Module,
}

/// Discovers the source root: the nearest ancestor directory named `src`,
/// otherwise the main file's own directory.
pub fn source_root(main_file: &Path) -> PathBuf {
    let mut dir = main_file.parent().unwrap_or_else(|| Path::new("."));
    for ancestor in dir.ancestors() {
        if ancestor.file_name().map(|n| n == "src").unwrap_or(false) {
            return ancestor.to_path_buf();
        }
    }
    // No "src" ancestor found — fall back to the main file's directory.
    if dir.as_os_str().is_empty() {
        dir = Path::new(".");
    }
    dir.to_path_buf()
}

/// The module name for a file: its path relative to the source root, `.kei`
/// suffix removed, separators replaced by `.`.
pub fn module_name_for(path: &Path, root: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let rel = rel.with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

fn dotted_to_path(dotted: &[String]) -> PathBuf {
    let mut p = PathBuf::new();
    for seg in dotted {
        p.push(seg);
    }
    p
}

/// Import path resolution: tries, in order, `<sourceRoot>/<path>.kei`,
/// `<depsRoot>/<path>.kei`, for a single-segment import
/// `<depsRoot>/<seg>/mod.kei`, then `<stdRoot>/<path>.kei`.
pub fn resolve_import_path(dotted: &[String], config: &Config) -> Option<PathBuf> {
    let rel = dotted_to_path(dotted);

    let candidate = config.source_root.join(&rel).with_extension("kei");
    if candidate.is_file() {
        return Some(candidate);
    }

    let candidate = config.deps_root.join(&rel).with_extension("kei");
    if candidate.is_file() {
        return Some(candidate);
    }

    if dotted.len() == 1 {
        let candidate = config.deps_root.join(&dotted[0]).join("mod.kei");
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let candidate = config.std_root.join(&rel).with_extension("kei");
    if candidate.is_file() {
        return Some(candidate);
    }

    None
}

enum Visit {
    InProgress,
    Done,
}

/// DFS from the main file, producing modules in reverse postorder (leaves
/// first, main last). Any of {missing file, lexer error, parser error,
/// import cycle} aborts resolution before type-checking runs, each with one
/// diagnostic.
pub fn resolve(main_file: &Path, config: &Config) -> Result<Vec<ResolvedModule>, Diagnostic> {
    let mut order = Vec::new();
    let mut visiting: FxHashMap<PathBuf, Visit> = FxHashMap::default();
    let mut stack: Vec<String> = Vec::new();
    let mut modules: FxHashMap<PathBuf, ResolvedModule> = FxHashMap::default();

    dfs(main_file, config, &mut visiting, &mut stack, &mut order, &mut modules)?;

    Ok(order
        .into_iter()
        .map(|path| modules.remove(&path).expect("module recorded during DFS"))
        .collect())
}

fn dfs(
    path: &Path,
    config: &Config,
    visiting: &mut FxHashMap<PathBuf, Visit>,
    stack: &mut Vec<String>,
    order: &mut Vec<PathBuf>,
    modules: &mut FxHashMap<PathBuf, ResolvedModule>,
) -> Result<(), Diagnostic> {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());

    match visiting.get(&canonical) {
        Some(Visit::Done) => return Ok(()),
        Some(Visit::InProgress) => {
            let name = module_name_for(&canonical, &config.source_root);
            let mut cycle = stack.clone();
            cycle.push(name);
            return Err(Diagnostic::error(
                canonical,
                crate::source::Span::default(),
                format!("circular import: {}", cycle.join(" -> ")),
            ));
        }
        None => {}
    }

    let contents = std::fs::read_to_string(&canonical).map_err(|e| {
        Diagnostic::error(
            canonical.clone(),
            crate::source::Span::default(),
            format!("cannot read module file: {e}"),
        )
    })?;

    let name = module_name_for(&canonical, &config.source_root);
    visiting.insert(canonical.clone(), Visit::InProgress);
    stack.push(name.clone());

    let mut sink = DiagnosticSink::new();
    let tokens = Lexer::new(&canonical, &contents).tokenize(&mut sink);
    if sink.has_errors() {
        return Err(sink.into_vec().remove(0));
    }
    let ast_module = Parser::new(&canonical, &tokens).parse_module(&mut sink);
    if sink.has_errors() {
        return Err(sink.into_vec().remove(0));
    }

    let mut import_paths = Vec::new();
    let mut seen = FxHashSet::default();
    for item in &ast_module.items {
        if let ast::Item::Import(import) = item {
            if seen.insert(import.path.clone()) {
                import_paths.push(import.path.clone());
            }
        }
    }

    for dotted in &import_paths {
        match resolve_import_path(dotted, config) {
            Some(resolved) => dfs(&resolved, config, visiting, stack, order, modules)?,
            None => {
                return Err(Diagnostic::error(
                    canonical.clone(),
                    crate::source::Span::default(),
                    format!("cannot find module '{}'", dotted.join(".")),
                ));
            }
        }
    }

    stack.pop();
    visiting.insert(canonical.clone(), Visit::Done);
    modules.insert(
        canonical.clone(),
        ResolvedModule {
            name,
            source: SourceFile::new(canonical.clone(), contents),
            ast: ast_module,
        },
    );
    order.push(canonical);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, contents: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn orders_leaves_before_main() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_file(&src, "util.kei", "pub fn helper() -> int { return 1; }");
        let main = write_file(
            &src,
            "main.kei",
            "import util; fn main() -> int { return 0; }",
        );
        let config = Config::for_test(&src);
        let modules = resolve(&main, &config).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "util");
        assert_eq!(modules[1].name, "main");
    }

    #[test]
    fn detects_circular_imports() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_file(&src, "a.kei", "import b;");
        let main = write_file(&src, "b.kei", "import a;");
        let config = Config::for_test(&src);
        let err = resolve(&main, &config).unwrap_err();
        assert!(err.message.contains("circular import"));
    }

    #[test]
    fn missing_module_reports_one_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let main = write_file(&src, "main.kei", "import nope;");
        let config = Config::for_test(&src);
        let err = resolve(&main, &config).unwrap_err();
        assert!(err.message.contains("cannot find module"));
    }
}
