// src/cli/progress.rs — Per-generation progress lines on stderr

use crate::core::types::GenerationStats;

/// Callback for `GepaOptimizer::with_progress()`. Writes to stderr so stdout
/// stays clean for the optimized prompts.
pub fn terminal_progress(generations: usize) -> impl Fn(&GenerationStats) + Send + Sync + 'static {
    move |stats| eprintln!("{}", format_generation(stats, generations))
}

pub fn format_generation(stats: &GenerationStats, generations: usize) -> String {
    let mut line = format!(
        "[gen {}/{}] best={} best_so_far={} mean={}",
        stats.generation + 1,
        generations.max(1),
        fmt_fitness(stats.generation_best),
        fmt_fitness(stats.best_so_far),
        fmt_fitness(stats.mean_fitness),
    );
    if stats.failed > 0 {
        line.push_str(&format!(" failed={}/{}", stats.failed, stats.population_size));
    }
    line
}

fn fmt_fitness(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.3}")
    } else {
        "-".into()
    }
}
