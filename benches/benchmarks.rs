// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths of a run:
//   1. Materializing candidates from the flat value table
//   2. Variation operators (crossover, mutation, selection)
//   3. Prompt dict export/import on deep trees
//   4. A full small optimization with an in-process evaluator

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;

use promptevo::core::operators::{crossover, mutate_genes, select_parents};
use promptevo::core::population::{materialize, Individual, Lineage};
use promptevo::core::{GepaConfig, GepaOptimizer};
use promptevo::evaluator::heuristic::KeywordEvaluator;
use promptevo::prompt::PromptModule;

// ─── Helpers ────────────────────────────────────────────────────────────────

/// A tree of `width` children, each with `per_module` prompts.
fn build_tree(width: usize, per_module: usize) -> PromptModule {
    let mut root = PromptModule::new("Program");
    root.register("instructions", "Answer the question using the context.", None)
        .expect("register");
    for c in 0..width {
        let mut child = PromptModule::new(format!("Stage{c}"));
        for p in 0..per_module {
            child
                .register(
                    &format!("prompt_{p}"),
                    format!("Stage {c} prompt {p}: summarize the findings and cite sources."),
                    None,
                )
                .expect("register");
        }
        root.add_module(&format!("stage_{c}"), child).expect("add module");
    }
    root
}

fn population(template: &PromptModule, size: usize) -> Vec<Individual> {
    let seed = Individual::seed(template);
    (0..size)
        .map(|i| {
            let mut ind = seed.derive(Lineage::Explored);
            ind.fitness = Some(i as f64 / size as f64);
            ind
        })
        .collect()
}

// ─── Benchmark: Materialize ─────────────────────────────────────────────────

fn bench_materialize(c: &mut Criterion) {
    let template = build_tree(10, 5);
    let mut rng = StdRng::seed_from_u64(1);
    let mut genes = Individual::seed(&template).genes;
    mutate_genes(&mut rng, &mut genes, 0.5, 4000);

    let mut group = c.benchmark_group("materialize");
    group.bench_function("materialize_51_params", |b| {
        b.iter(|| materialize(black_box(&template), black_box(&genes), None))
    });
    group.bench_function("clone_tree_51_params", |b| b.iter(|| black_box(&template).clone()));
    group.finish();
}

// ─── Benchmark: Variation operators ─────────────────────────────────────────

fn bench_operators(c: &mut Criterion) {
    let template = build_tree(10, 5);
    let pop = population(&template, 20);
    let mut rng = StdRng::seed_from_u64(2);

    let mut group = c.benchmark_group("operators");
    group.bench_function("crossover_51_params", |b| {
        b.iter(|| crossover(&mut rng, black_box(&pop[0].genes), black_box(&pop[1].genes)))
    });
    group.bench_function("mutate_51_params", |b| {
        b.iter(|| {
            let mut genes = pop[0].genes.clone();
            mutate_genes(&mut rng, &mut genes, 0.3, 4000)
        })
    });
    group.bench_function("select_parents_pop_20", |b| {
        b.iter(|| select_parents(&mut rng, black_box(&pop), 3))
    });
    group.finish();
}

// ─── Benchmark: Prompt dict export / import ─────────────────────────────────

fn bench_prompt_dict(c: &mut Criterion) {
    let mut tree = build_tree(20, 5);
    let dict = tree.get_prompt_dict(true);

    let mut group = c.benchmark_group("prompt_dict");
    group.bench_function("export_101_params", |b| {
        b.iter(|| black_box(&tree).get_prompt_dict(true))
    });
    group.bench_function("import_101_params", |b| {
        b.iter(|| tree.load_prompt_dict(black_box(&dict), true))
    });
    group.finish();
}

// ─── Benchmark: End-to-end optimization ─────────────────────────────────────

fn bench_optimize(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");
    let template = build_tree(3, 2);
    let evaluator = KeywordEvaluator::new();

    c.bench_function("optimize_pop10_gen5", |b| {
        b.iter(|| {
            let mut optimizer = GepaOptimizer::new(GepaConfig {
                convergence_threshold: 0.0,
                seed: Some(3),
                ..Default::default()
            });
            runtime
                .block_on(optimizer.optimize(black_box(&template), &evaluator, &[]))
                .expect("optimize")
        })
    });
}

criterion_group!(
    benches,
    bench_materialize,
    bench_operators,
    bench_prompt_dict,
    bench_optimize,
);
criterion_main!(benches);
