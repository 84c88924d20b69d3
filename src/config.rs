//! Driver-level configuration not covered by CLI flags.
//!
//! A small plain struct built once by the driver and threaded by reference
//! through the pipeline, rather than a global: the module search roots and
//! the host C compiler override.

use std::env;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Config {
    pub source_root: PathBuf,
    pub deps_root: PathBuf,
    pub std_root: PathBuf,
    /// Override for the host C compiler; `None` means probe `cc`, `gcc`,
    /// `clang` in order.
    pub cc_override: Option<String>,
}

impl Config {
    /// Builds the config for a given main file, honoring the `KEIC_STD_ROOT`
    /// and `KEIC_CC` environment overrides.
    pub fn from_main_file(main_file: &Path) -> Self {
        let source_root = crate::resolver::source_root(main_file);
        let deps_root = source_root
            .parent()
            .map(|p| p.join("deps"))
            .unwrap_or_else(|| source_root.join("deps"));
        let std_root = env::var("KEIC_STD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| source_root.join("std"));
        let cc_override = env::var("KEIC_CC").ok();

        Config {
            source_root,
            deps_root,
            std_root,
            cc_override,
        }
    }

    #[cfg(test)]
    pub fn for_test(source_root: &Path) -> Self {
        Config {
            source_root: source_root.to_path_buf(),
            deps_root: source_root.join("deps"),
            std_root: source_root.join("std"),
            cc_override: None,
        }
    }
}
