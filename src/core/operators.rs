// src/core/operators.rs — Selection, crossover and mutation

use std::sync::Arc;

use rand::seq::index;
use rand::Rng;

use super::population::{Genes, Individual};

/// Retries allowed when the second tournament winner equals the first.
const DISTINCT_PARENT_RETRIES: usize = 10;

/// Canned rewrites used by template mutation, in rotation order for the
/// initial population.
pub const MUTATION_TEMPLATES: &[Template] = &[
    // specificity
    Template::Prefix("Be specific and detailed in your response."),
    Template::Prefix("Provide concrete examples in your answer."),
    Template::Prefix("Focus on accuracy and precision."),
    // constraints
    Template::Prefix("Keep your response concise and to the point."),
    Template::Prefix("Structure your response clearly with headings."),
    Template::Prefix("Include relevant data and statistics."),
    // domain context
    Template::LowercasedAfter("As an expert in this field,"),
    Template::Prefix("Consider both theoretical and practical aspects."),
    Template::Prefix("Address potential counterarguments."),
    // reasoning
    Template::Prefix("Think step by step before answering."),
    Template::Prefix("Explain your reasoning clearly."),
    Template::Prefix("Provide evidence for your claims."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// `"{prefix} {prompt}"`
    Prefix(&'static str),
    /// `"{lead} {prompt lowercased}"`
    LowercasedAfter(&'static str),
}

impl Template {
    pub fn apply(&self, prompt: &str) -> String {
        match self {
            Template::Prefix(prefix) => format!("{prefix} {prompt}"),
            Template::LowercasedAfter(lead) => format!("{lead} {}", prompt.to_lowercase()),
        }
    }
}

/// Cut `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Rewrite one prompt with a uniformly chosen template.
pub fn mutate_prompt<R: Rng + ?Sized>(rng: &mut R, prompt: &str, max_chars: usize) -> String {
    let template = MUTATION_TEMPLATES[rng.gen_range(0..MUTATION_TEMPLATES.len())];
    truncate_chars(&template.apply(prompt), max_chars)
}

/// Rewrite each gene independently with probability `strength`.
/// Returns how many genes were rewritten.
pub fn mutate_genes<R: Rng + ?Sized>(
    rng: &mut R,
    genes: &mut Genes,
    strength: f64,
    max_chars: usize,
) -> usize {
    let mut rewritten = 0;
    for value in genes.values_mut() {
        if rng.gen_bool(strength) {
            *value = Arc::from(mutate_prompt(rng, &**value, max_chars));
            rewritten += 1;
        }
    }
    rewritten
}

/// Initial-population mutation: like `mutate_genes` with `strength`, but
/// every rewrite uses `MUTATION_TEMPLATES[rotation + k]` and at least one
/// gene is always rewritten so no variant duplicates the seed.
pub fn explore_genes<R: Rng + ?Sized>(
    rng: &mut R,
    genes: &mut Genes,
    strength: f64,
    rotation: usize,
    max_chars: usize,
) -> usize {
    if genes.is_empty() {
        return 0;
    }
    let mut chosen: Vec<bool> = (0..genes.len()).map(|_| rng.gen_bool(strength)).collect();
    if !chosen.iter().any(|c| *c) {
        let forced = rng.gen_range(0..chosen.len());
        chosen[forced] = true;
    }

    let mut rewritten = 0;
    for (value, pick) in genes.values_mut().zip(chosen) {
        if !pick {
            continue;
        }
        let template = MUTATION_TEMPLATES[(rotation + rewritten) % MUTATION_TEMPLATES.len()];
        *value = Arc::from(truncate_chars(&template.apply(&**value), max_chars));
        rewritten += 1;
    }
    rewritten
}

/// Uniform crossover: start from `a` and take each gene `b` also carries
/// with probability one half.
pub fn crossover<R: Rng + ?Sized>(rng: &mut R, a: &Genes, b: &Genes) -> Genes {
    let mut child = a.clone();
    for (path, value) in child.iter_mut() {
        if let Some(other) = b.get(path) {
            if rng.gen_bool(0.5) {
                *value = Arc::clone(other);
            }
        }
    }
    child
}

/// Index of the fittest of `tournament_size` distinct, uniformly sampled individuals.
pub fn tournament<R: Rng + ?Sized>(rng: &mut R, population: &[Individual], tournament_size: usize) -> usize {
    let k = tournament_size.min(population.len()).max(1);
    index::sample(rng, population.len(), k)
        .into_iter()
        .fold(None::<usize>, |best, i| match best {
            Some(b) if population[b].rank_fitness() >= population[i].rank_fitness() => Some(b),
            _ => Some(i),
        })
        .unwrap_or(0)
}

/// Two tournament winners, retrying a bounded number of times for a
/// second parent distinct from the first. Distinctness is not guaranteed.
pub fn select_parents<R: Rng + ?Sized>(
    rng: &mut R,
    population: &[Individual],
    tournament_size: usize,
) -> (usize, usize) {
    let first = tournament(rng, population, tournament_size);
    let mut second = tournament(rng, population, tournament_size);
    let mut attempts = 0;
    while second == first && attempts < DISTINCT_PARENT_RETRIES {
        second = tournament(rng, population, tournament_size);
        attempts += 1;
    }
    (first, second)
}

/// Indices of the `count` fittest individuals, best first; ties keep population order.
pub fn elite_indices(population: &[Individual], count: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| {
        population[b]
            .rank_fitness()
            .total_cmp(&population[a].rank_fitness())
    });
    order.truncate(count);
    order
}
