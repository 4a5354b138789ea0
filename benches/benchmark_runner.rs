/// Benchmark runner for the evaluation pipeline.
///
/// Times compile + execute, and the full evaluate-and-encode path, for a
/// handful of representative scripts.

extern crate cseval;

use cseval::eval::{ExecutionContext, ScriptEngine};
use cseval::runner::ds::value::Value;
use cseval::runner::jit::{compile, execute};
use cseval::runner::plugin::types::EvalContext;
use std::time::{Duration, Instant};

/// Compile once, then time repeated executions.
fn run_benchmark_vm(name: &str, code: &str, iterations: u32) -> Duration {
    let compilation = compile(&ExecutionContext::new(code), name);
    let unit = compilation
        .unit
        .unwrap_or_else(|| panic!("Failed to compile benchmark: {}", name));

    let start = Instant::now();
    for _ in 0..iterations {
        let mut ctx = EvalContext::default();
        let _ = execute(&unit, &mut ctx);
    }
    start.elapsed()
}

/// Time the whole request path: preprocess, compile, execute, encode.
fn run_benchmark_engine(code: &str, iterations: u32) -> Duration {
    let engine = ScriptEngine::default();
    let start = Instant::now();
    for _ in 0..iterations {
        let _ = engine.evaluate_to_json(code);
    }
    start.elapsed()
}

fn result_of(code: &str) -> Value {
    ScriptEngine::default()
        .evaluate(code)
        .return_value()
        .cloned()
        .unwrap_or(Value::Null)
}

// ============================================================================
// Benchmark definitions
// ============================================================================

const BENCH_FIBONACCI: &str = r#"
int Fib(int n) { return n < 2 ? n : Fib(n - 1) + Fib(n - 2); }
Fib(18)
"#;

const BENCH_LOOP_SUM: &str = r#"
var sum = 0;
for (var i = 0; i < 10000; i++) {
    sum += i;
}
sum
"#;

const BENCH_NESTED_LOOPS: &str = r#"
var count = 0;
for (var i = 0; i < 100; i++) {
    for (var j = 0; j < 100; j++) {
        count++;
    }
}
count
"#;

const BENCH_PRIME_SIEVE: &str = r#"
var count = 0;
for (var n = 2; n < 100; n++) {
    var isPrime = true;
    for (var i = 2; i * i <= n; i++) {
        if (n % i == 0) {
            isPrime = false;
            break;
        }
    }
    if (isPrime) count++;
}
count
"#;

const BENCH_COLLECTIONS: &str = r#"
var list = new List<int>();
for (var i = 0; i < 1000; i++) list.Add(i * 2);
var lookup = new Dictionary<int, int>();
foreach (var x in list) lookup[x] = x / 2;
lookup.Count + list.Sum()
"#;

const BENCH_STRINGS: &str = r#"
var text = "";
for (var i = 0; i < 200; i++) text += $"{i},";
text.Length
"#;

const BENCH_EXCEPTIONS: &str = r#"
var caught = 0;
for (var i = 0; i < 200; i++) {
    try { throw new InvalidOperationException("x"); }
    catch (Exception) { caught++; }
}
caught
"#;

fn main() {
    println!("=======================================================");
    println!("  cseval - Performance Benchmarks");
    println!("  VM only vs full evaluate-and-encode");
    println!("=======================================================\n");

    let benchmarks: Vec<(&str, &str, u32)> = vec![
        ("Fibonacci (n=18)", BENCH_FIBONACCI, 20),
        ("Loop Sum (10K iterations)", BENCH_LOOP_SUM, 100),
        ("Nested Loops (100x100)", BENCH_NESTED_LOOPS, 100),
        ("Prime Sieve (<100)", BENCH_PRIME_SIEVE, 200),
        ("Collections (1K)", BENCH_COLLECTIONS, 100),
        ("Interpolation (200)", BENCH_STRINGS, 200),
        ("Exceptions (200)", BENCH_EXCEPTIONS, 100),
    ];

    println!("{:<30} {:>14} {:>14} {:>10}", "Benchmark", "VM", "Engine", "Overhead");
    println!("{}", "-".repeat(70));

    let mut total_vm = Duration::ZERO;
    let mut total_engine = Duration::ZERO;
    for (name, code, iterations) in &benchmarks {
        let vm = run_benchmark_vm(name, code, *iterations);
        let engine = run_benchmark_engine(code, *iterations);
        total_vm += vm;
        total_engine += engine;
        let overhead = engine.as_secs_f64() / vm.as_secs_f64();
        println!("{:<30} {:>12.2?} {:>12.2?} {:>9.2}x", name, vm, engine, overhead);
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:<30} {:>12.2?} {:>12.2?} {:>9.2}x",
        "TOTAL",
        total_vm,
        total_engine,
        total_engine.as_secs_f64() / total_vm.as_secs_f64()
    );

    println!("\n=======================================================");
    println!("  Correctness Verification");
    println!("=======================================================\n");

    let verifications: Vec<(&str, &str, i32)> = vec![
        ("Fibonacci", BENCH_FIBONACCI, 2584),
        ("Loop Sum", BENCH_LOOP_SUM, 49995000),
        ("Nested Loops", BENCH_NESTED_LOOPS, 10000),
        ("Prime Count", BENCH_PRIME_SIEVE, 25),
        ("Exceptions", BENCH_EXCEPTIONS, 200),
    ];

    println!("{:<20} {:>12} {:>12}", "Test", "Expected", "Actual");
    println!("{}", "-".repeat(46));
    for (name, code, expected) in verifications {
        let actual = match result_of(code) {
            Value::Int(n) => n,
            _ => -1,
        };
        let status = if actual == expected { "✓" } else { "✗" };
        println!("{:<20} {:>12} {:>4} {:>7}", name, expected, status, actual);
    }
    println!("\n=======================================================");
}
