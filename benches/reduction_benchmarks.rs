//! Benchmarks for the parser -> reducer path against a content-addressed
//! plan: how reduction time scales with source size and with how much
//! structural sharing the program exposes (spec §4.C).

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use voxlogica::primitives::PrimitiveRegistry;
use voxlogica::reducer::reduce_program;

fn linear_chain(depth: usize) -> String {
    let mut source = String::from("let v0 = 1\n");
    for i in 1..depth {
        source.push_str(&format!("let v{i} = v{} + v{}\n", i - 1, i - 1));
    }
    source.push_str(&format!("print \"r\" v{}\n", depth - 1));
    source
}

fn repeated_subexpression(width: usize) -> String {
    let mut terms = Vec::with_capacity(width);
    for _ in 0..width {
        terms.push("(1 + 2) * 3".to_string());
    }
    format!("print \"r\" {}\n", terms.join(" + "))
}

fn bench_reduce_linear_chain(c: &mut Criterion) {
    let source = linear_chain(64);
    let program = voxlogica::parser::parse_program_content(&source).unwrap();
    c.bench_function("reduce_linear_chain_64", |b| {
        b.iter(|| {
            let mut registry = PrimitiveRegistry::new();
            let plan = reduce_program(black_box(&program), &mut registry).unwrap();
            black_box(plan.to_symbolic_plan())
        });
    });
}

fn bench_reduce_shared_subexpressions(c: &mut Criterion) {
    let source = repeated_subexpression(64);
    let program = voxlogica::parser::parse_program_content(&source).unwrap();
    c.bench_function("reduce_shared_subexpressions_64", |b| {
        b.iter(|| {
            let mut registry = PrimitiveRegistry::new();
            let plan = reduce_program(black_box(&program), &mut registry).unwrap();
            black_box(plan.to_symbolic_plan())
        });
    });
}

fn bench_registry_construction(c: &mut Criterion) {
    c.bench_function("primitive_registry_new", |b| {
        b.iter(|| black_box(PrimitiveRegistry::new()));
    });
}

criterion_group!(benches, bench_reduce_linear_chain, bench_reduce_shared_subexpressions, bench_registry_construction);
criterion_main!(benches);
