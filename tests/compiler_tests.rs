//! End-to-end pipeline tests for the seeded scenarios in the spec's
//! "Testable Properties" section: resolve → check → lower → optimize →
//! emit, asserting on diagnostics and the generated C text. None of these
//! invoke a host C compiler — that is `driver::run`'s job, exercised
//! manually, not under `cargo test`.

use keic::checker;
use keic::config::Config;
use keic::diagnostics::DiagnosticSink;
use keic::emit;
use keic::lower;
use keic::resolver;
use keic::ssa;
use std::fs;

const IO_MODULE: &str = r#"
extern fn kei_print_string(s: string);
extern fn kei_print_int(n: int);

pub fn print(s: string) {
    kei_print_string(s);
}

pub fn print(n: int) {
    kei_print_int(n);
}
"#;

/// Writes `io.kei` plus whatever `extra_modules` names, plus a `main.kei`
/// holding `main_src`, under a fresh temp source root, then drives the
/// whole pipeline short of invoking a host C compiler. Returns the
/// generated C text, or the joined diagnostic messages on failure.
fn compile_with_modules(main_src: &str, extra_modules: &[(&str, &str)]) -> Result<String, String> {
    let dir = tempfile::tempdir().expect("tempdir");
    let src_root = dir.path().join("src");
    fs::create_dir_all(&src_root).expect("mkdir src");
    fs::write(src_root.join("io.kei"), IO_MODULE).expect("write io.kei");
    for (name, content) in extra_modules {
        fs::write(src_root.join(name), content).expect("write extra module");
    }
    let main_path = src_root.join("main.kei");
    fs::write(&main_path, main_src).expect("write main.kei");

    let config = Config {
        source_root: src_root.clone(),
        deps_root: src_root.join("deps"),
        std_root: src_root.join("std"),
        cc_override: None,
    };

    let modules = resolver::resolve(&main_path, &config).map_err(|d| d.message)?;

    let mut sink = DiagnosticSink::new();
    let checked = checker::check_program(&modules, &mut sink);
    if sink.has_errors() {
        let msgs: Vec<String> = sink.iter().map(|d| d.message.clone()).collect();
        return Err(msgs.join("; "));
    }

    let mut kir_module = lower::lower_program(&checked);
    ssa::run(&mut kir_module);
    Ok(emit::emit_module(&kir_module))
}

fn compile(main_src: &str) -> Result<String, String> {
    compile_with_modules(main_src, &[])
}

#[test]
fn hello_world_prints_a_string_literal() {
    let c = compile(
        r#"import {print} from io; fn main() -> int { print("Hello, World!"); return 0; }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("Hello, World!"));
    assert!(c.contains("kei_print_string"));
    assert!(c.contains("int main"));
}

#[test]
fn fib_recurses_and_prints_an_int() {
    let c = compile(
        r#"import {print} from io;
        fn fib(n:int)->int { if n<=1 {return n;} return fib(n-1)+fib(n-2); }
        fn main()->int { print(fib(10)); return 0; }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("fib"));
    assert!(c.contains("kei_print_int"));
}

#[test]
fn throws_catch_handles_both_the_error_and_success_path() {
    let c = compile(
        r#"import {print} from io;
        struct NotFound{code:int}
        fn find(id:int)->int throws NotFound { if id<0 {throw NotFound{code:404};} return id*10; }
        fn main()->int {
            find(5) catch { NotFound: return 1; };
            find(-1) catch { NotFound e: { print(e.code); return 0; } };
            return 0;
        }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("NotFound"));
    assert!(c.contains("kei_print_int"));
}

#[test]
fn operator_overload_binds_op_add_on_a_struct() {
    let c = compile(
        r#"import {print} from io;
        struct Vec2{x:int;y:int; fn op_add(self:Vec2,o:Vec2)->Vec2 { return Vec2{x:self.x+o.x, y:self.y+o.y}; }}
        fn main()->int {
            let sum = Vec2{x:1,y:2} + Vec2{x:3,y:4};
            print(sum.x);
            print(sum.y);
            return 0;
        }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("Vec2"));
    assert!(c.contains("Vec2_op_add"));
}

#[test]
fn bubble_sort_swaps_array_elements_in_place() {
    let c = compile(
        r#"import {print} from io;
        fn main() -> int {
            let mut arr: [int;7] = [64,25,12,22,11,90,34];
            let n = 7;
            for i in 0..n {
                for j in 0..(n-i-1) {
                    if arr[j] > arr[j+1] {
                        let tmp = arr[j];
                        arr[j] = arr[j+1];
                        arr[j+1] = tmp;
                    }
                }
            }
            for i in 0..n {
                print(arr[i]);
            }
            return 0;
        }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("int main"));
    assert!(c.contains("kei_print_int"));
}

#[test]
fn unhandled_catch_panic_lowers_to_kei_panic() {
    let c = compile(
        r#"struct Boom{code:int}
        fn bad()->int throws Boom { throw Boom{code:1}; }
        fn main()->int { bad() catch panic; return 0; }"#,
    )
    .expect("compiles cleanly");
    assert!(c.contains("kei_panic"));
    assert!(c.contains("unhandled error"));
}

#[test]
fn integer_literal_out_of_range_for_declared_width_is_rejected() {
    let err = compile("fn main() -> int { let x: u8 = 256; return 0; }").unwrap_err();
    assert!(err.to_lowercase().contains("range") || err.to_lowercase().contains("fit"));
}

#[test]
fn circular_imports_report_exactly_one_diagnostic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src_root = dir.path().join("src");
    fs::create_dir_all(&src_root).expect("mkdir src");
    fs::write(src_root.join("a.kei"), "import b;\nfn a_fn() -> int { return 0; }\n").expect("write a.kei");
    fs::write(src_root.join("b.kei"), "import a;\nfn b_fn() -> int { return 0; }\n").expect("write b.kei");

    let config = Config {
        source_root: src_root.clone(),
        deps_root: src_root.join("deps"),
        std_root: src_root.join("std"),
        cc_override: None,
    };
    let main_path = src_root.join("a.kei");
    let err = resolver::resolve(&main_path, &config).unwrap_err();
    assert!(err.message.to_lowercase().contains("circular") || err.message.to_lowercase().contains("cycle"));
}

#[test]
fn empty_array_literal_is_rejected() {
    let err = compile("fn main() -> int { let x = []; return 0; }").unwrap_err();
    assert!(err.to_lowercase().contains("empty array"));
}

#[test]
fn assigning_to_a_const_is_rejected() {
    let err = compile("const LIMIT: int = 10; fn main() -> int { LIMIT = 20; return 0; }").unwrap_err();
    assert!(!err.is_empty());
}

#[test]
fn ambiguous_overload_call_is_rejected() {
    let err = compile(
        r#"fn pick(a: i32, b: f64) -> int { return 0; }
        fn pick(a: f64, b: i32) -> int { return 0; }
        fn main() -> int { pick(1, 2); return 0; }"#,
    )
    .unwrap_err();
    assert!(err.to_lowercase().contains("ambiguous"));
}

#[test]
fn non_pub_function_in_another_module_is_not_callable_through_a_qualified_path() {
    let priv_mod = "fn secret() -> int { return 1; }\npub fn public_fn() -> int { return 2; }\n";
    let err = compile_with_modules(
        "import priv_mod;\nfn main() -> int { priv_mod.secret(); return 0; }",
        &[("priv_mod.kei", priv_mod)],
    )
    .unwrap_err();
    assert!(err.to_lowercase().contains("not exported"));
}

#[test]
fn pub_function_in_another_module_is_callable_through_a_qualified_path() {
    let util_mod = "pub fn greet() -> int { return 7; }\n";
    let c = compile_with_modules(
        "import util;\nfn main() -> int { return util.greet(); }",
        &[("util.kei", util_mod)],
    )
    .expect("compiles cleanly");
    assert!(c.contains("greet"));
}

#[test]
fn non_pub_function_in_another_module_is_not_callable_unqualified_even_with_a_whole_module_import() {
    let priv_mod = "fn secret() -> int { return 1; }\n";
    let err = compile_with_modules(
        "import priv_mod;\nfn main() -> int { secret(); return 0; }",
        &[("priv_mod.kei", priv_mod)],
    )
    .unwrap_err();
    assert!(err.to_lowercase().contains("undeclared"));
}

#[test]
fn checker_applied_twice_to_the_same_modules_produces_identical_diagnostics_and_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src_root = dir.path().join("src");
    fs::create_dir_all(&src_root).expect("mkdir src");
    fs::write(src_root.join("io.kei"), IO_MODULE).expect("write io.kei");
    let main_path = src_root.join("main.kei");
    fs::write(
        &main_path,
        r#"import {print} from io;
        struct Point{x:int;y:int;}
        fn dist(p: Point) -> int { return p.x + p.y; }
        fn main() -> int { print(dist(Point{x:1,y:2})); return 0; }"#,
    )
    .expect("write main.kei");

    let config = Config {
        source_root: src_root.clone(),
        deps_root: src_root.join("deps"),
        std_root: src_root.join("std"),
        cc_override: None,
    };
    let modules = resolver::resolve(&main_path, &config).expect("resolves cleanly");

    let mut sink_a = DiagnosticSink::new();
    let checked_a = checker::check_program(&modules, &mut sink_a);
    let mut sink_b = DiagnosticSink::new();
    let checked_b = checker::check_program(&modules, &mut sink_b);

    assert!(!sink_a.has_errors());
    assert!(!sink_b.has_errors());
    let msgs_a: Vec<String> = sink_a.iter().map(|d| d.message.clone()).collect();
    let msgs_b: Vec<String> = sink_b.iter().map(|d| d.message.clone()).collect();
    assert_eq!(msgs_a, msgs_b);
    assert_eq!(format!("{checked_a:?}"), format!("{checked_b:?}"));
}

