//! CLI entry point: `keic <file.kei> [flag]`.
//!
//! A hand-rolled `match` over `env::args()` rather than a derive-based arg
//! parser, matching the teacher's own driver (`projects::cli`), which never
//! adopted a CLI-parsing crate for its own binary.

use keic::config::Config;
use keic::driver::{self, Stage};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return ExitCode::from(1);
    }

    let main_file = PathBuf::from(&args[1]);
    if !main_file.is_file() {
        eprintln!("error: no such file: {}", main_file.display());
        return ExitCode::from(1);
    }

    let stage = match parse_stage(&args[2..]) {
        Ok(stage) => stage,
        Err(e) => {
            eprintln!("error: {e}");
            print_help();
            return ExitCode::from(1);
        }
    };

    let mut config = Config::from_main_file(&main_file);
    if let Some(std_root) = std_root_override(&args[2..]) {
        config.std_root = std_root;
    }

    let outcome = driver::run(&main_file, stage, &config);
    ExitCode::from(outcome.exit_code as u8)
}

fn parse_stage(flags: &[String]) -> Result<Stage, String> {
    let mut stage = None;
    let mut i = 0;
    while i < flags.len() {
        let flag = flags[i].as_str();
        if flag == "--std-root" {
            // Two-token flag consumed by `std_root_override`; skip its value.
            i += 2;
            continue;
        }
        let parsed = match flag {
            "--ast" => Stage::Ast,
            "--ast-json" => Stage::AstJson,
            "--check" => Stage::Check,
            "--kir" => Stage::Kir,
            "--kir-opt" => Stage::KirOpt,
            "--emit-c" => Stage::EmitC,
            "--build" => Stage::Build,
            "--run" => Stage::Run,
            other => return Err(format!("unrecognized flag '{other}'")),
        };
        if stage.is_some() {
            return Err("flags are mutually exclusive".to_string());
        }
        stage = Some(parsed);
        i += 1;
    }
    Ok(stage.unwrap_or(Stage::Tokens))
}

fn std_root_override(flags: &[String]) -> Option<PathBuf> {
    flags
        .iter()
        .position(|f| f == "--std-root")
        .and_then(|i| flags.get(i + 1))
        .map(PathBuf::from)
}

fn print_help() {
    eprintln!("keic <file.kei> [flag]");
    eprintln!();
    eprintln!("flags (mutually exclusive; default is a token dump):");
    eprintln!("  --ast        print the parsed AST for every module");
    eprintln!("  --ast-json   print the parsed AST as JSON");
    eprintln!("  --check      run semantic analysis only");
    eprintln!("  --kir        print KIR before SSA passes");
    eprintln!("  --kir-opt    print KIR after mem2reg and de-SSA");
    eprintln!("  --emit-c     print the generated C source");
    eprintln!("  --build      compile to a native executable");
    eprintln!("  --run        compile and run, propagating the exit code");
    eprintln!();
    eprintln!("  --std-root <path>   override the standard-library search root");
}
