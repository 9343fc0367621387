// src/core/optimizer.rs — Generational search over prompt values

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use super::operators::{crossover, elite_indices, explore_genes, mutate_genes, select_parents};
use super::population::{materialize, Individual, Lineage};
use super::reflection::{reflect_on, ReflectionAdapter, ReflectionContext};
use super::types::{GenerationStats, GepaConfig, OptimizationReport, OptimizerState};
use crate::evaluator::{score, Evaluator, Scored};
use crate::infra::errors::GepaError;
use crate::prompt::PromptModule;

type ProgressFn = Box<dyn Fn(&GenerationStats) + Send + Sync>;

/// Evolves the optimizable prompts of a module tree.
///
/// One `optimize` call is one run. Counters, history and the best tracker
/// are reset at the start of every call; the values from the last run stay
/// readable through `report()`.
pub struct GepaOptimizer {
    config: GepaConfig,
    reflection: Option<Arc<dyn ReflectionAdapter>>,
    on_progress: Option<ProgressFn>,
    state: OptimizerState,
    history: Vec<GenerationStats>,
    best_fitness: f64,
    evaluations: u64,
    reflections: u64,
    reflection_failures: u64,
}

impl GepaOptimizer {
    pub fn new(config: GepaConfig) -> Self {
        Self {
            config,
            reflection: None,
            on_progress: None,
            state: OptimizerState::NotStarted,
            history: Vec::new(),
            best_fitness: f64::NEG_INFINITY,
            evaluations: 0,
            reflections: 0,
            reflection_failures: 0,
        }
    }

    pub fn with_reflection(mut self, adapter: Arc<dyn ReflectionAdapter>) -> Self {
        self.reflection = Some(adapter);
        self
    }

    /// Fix the RNG seed so runs with deterministic collaborators repeat exactly.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Called with each generation's statistics right after they are recorded.
    pub fn with_progress(mut self, cb: impl Fn(&GenerationStats) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(cb));
        self
    }

    pub fn config(&self) -> &GepaConfig {
        &self.config
    }

    pub fn state(&self) -> OptimizerState {
        self.state
    }

    pub fn history(&self) -> &[GenerationStats] {
        &self.history
    }

    pub fn best_fitness(&self) -> f64 {
        self.best_fitness
    }

    pub fn report(&self) -> OptimizationReport {
        OptimizationReport {
            state: self.state,
            generations_completed: self.history.len(),
            best_fitness: self.best_fitness,
            evaluations: self.evaluations,
            reflections: self.reflections,
            reflection_failures: self.reflection_failures,
            config: self.config.clone(),
            history: self.history.clone(),
        }
    }

    fn reset(&mut self) {
        self.state = OptimizerState::NotStarted;
        self.history.clear();
        self.best_fitness = f64::NEG_INFINITY;
        self.evaluations = 0;
        self.reflections = 0;
        self.reflection_failures = 0;
    }

    /// Search for better prompt values of `root` and return the best module
    /// found. `root` itself is never modified.
    ///
    /// Evaluation and reflection failures are absorbed; only an invalid
    /// configuration is an error. When every candidate fails, the returned
    /// module carries the original values.
    pub async fn optimize(
        &mut self,
        root: &PromptModule,
        evaluator: &dyn Evaluator,
        examples: &[Value],
    ) -> Result<PromptModule, GepaError> {
        self.config.validate()?;
        self.reset();

        if !root.is_learning_enabled() {
            tracing::info!(module = root.kind(), "learning disabled, skipping optimization");
            self.state = OptimizerState::Skipped;
            return Ok(root.clone());
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let template = root.clone();
        let seed = Individual::seed(&template);
        if seed.genes.is_empty() {
            tracing::warn!(module = root.kind(), "no optimizable parameters");
        }

        let mut population = self.initial_population(&mut rng, &seed);
        let mut best = seed;
        let mut seed_fitness = None;
        let last_generation = self.config.generations.saturating_sub(1);

        tracing::info!(
            module = root.kind(),
            parameters = best.genes.len(),
            population = self.config.population_size,
            generations = self.config.generations,
            examples = examples.len(),
            "starting optimization"
        );

        for generation in 0..=last_generation {
            self.state = OptimizerState::Running { generation };

            self.evaluate_population(&template, &mut population, evaluator, examples)
                .await;
            if generation == 0 {
                seed_fitness = population[0].fitness;
            }

            let prior_best = self.best_fitness;
            for individual in &population {
                if individual.rank_fitness() > self.best_fitness {
                    self.best_fitness = individual.rank_fitness();
                    best = individual.clone();
                }
            }

            let stats = generation_stats(generation, &population, self.best_fitness);
            tracing::info!(
                generation,
                best = stats.generation_best,
                best_so_far = stats.best_so_far,
                mean = stats.mean_fitness,
                failed = stats.failed,
                "generation evaluated"
            );
            if let Some(ref cb) = self.on_progress {
                cb(&stats);
            }
            let generation_best = stats.generation_best;
            self.history.push(stats);

            if generation > 0 && (generation_best - prior_best).abs() < self.config.convergence_threshold {
                tracing::info!(generation, best = self.best_fitness, "converged");
                self.state = OptimizerState::Converged { generation };
                break;
            }
            if generation == last_generation {
                self.state = OptimizerState::Exhausted;
                break;
            }

            population = self
                .next_generation(&mut rng, &template, &population, evaluator, examples)
                .await;
        }

        let delta = match seed_fitness {
            Some(seed) if self.best_fitness.is_finite() => self.best_fitness - seed,
            _ => 0.0,
        };
        let mut result = materialize(&template, &best.genes, Some((best.lineage.method(), delta)));
        if self.best_fitness.is_finite() {
            result.update_performance_metrics(&[("fitness", self.best_fitness)]);
        }

        tracing::info!(
            state = %self.state,
            best = self.best_fitness,
            evaluations = self.evaluations,
            reflections = self.reflections,
            "optimization finished"
        );
        Ok(result)
    }

    /// The unmutated seed followed by `population_size - 1` explored variants.
    fn initial_population(&self, rng: &mut StdRng, seed: &Individual) -> Vec<Individual> {
        let mut population = Vec::with_capacity(self.config.population_size);
        population.push(seed.clone());
        for rotation in 0..self.config.population_size.saturating_sub(1) {
            let mut variant = seed.derive(Lineage::Explored);
            explore_genes(
                rng,
                &mut variant.genes,
                self.config.exploration_strength,
                rotation,
                self.config.max_prompt_length,
            );
            population.push(variant);
        }
        population
    }

    async fn evaluate_population(
        &mut self,
        template: &PromptModule,
        population: &mut [Individual],
        evaluator: &dyn Evaluator,
        examples: &[Value],
    ) {
        let timeout = self.config.evaluation_timeout();
        let scores: Vec<Scored> = stream::iter(population.iter())
            .map(|individual| {
                let module = materialize(template, &individual.genes, None);
                async move { score(evaluator, &module, examples, timeout).await }
            })
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        for (individual, scored) in population.iter_mut().zip(scores) {
            self.evaluations += scored.calls;
            individual.fitness = match scored.fitness {
                Ok(fitness) => Some(fitness),
                Err(e) => {
                    tracing::warn!(individual = %individual.id, "evaluation failed: {e}");
                    None
                }
            };
        }
    }

    /// Elites first, then offspring until the population is full. Random
    /// choices are all drawn here before reflection fans out.
    async fn next_generation(
        &mut self,
        rng: &mut StdRng,
        template: &PromptModule,
        population: &[Individual],
        evaluator: &dyn Evaluator,
        examples: &[Value],
    ) -> Vec<Individual> {
        let size = self.config.population_size;
        let mut next: Vec<Individual> = elite_indices(population, self.config.elitism_count)
            .into_iter()
            .map(|i| population[i].derive(Lineage::Elite))
            .collect();

        let mut reflect_slots = Vec::new();
        while next.len() < size {
            let (a, b) = select_parents(rng, population, self.config.tournament_size);
            let crossed = rng.gen_bool(self.config.crossover_rate);
            let mut genes = if crossed {
                crossover(rng, &population[a].genes, &population[b].genes)
            } else {
                let pick = if rng.gen_bool(0.5) { a } else { b };
                population[pick].genes.clone()
            };

            let mutated = rng.gen_bool(self.config.mutation_rate)
                && mutate_genes(
                    rng,
                    &mut genes,
                    self.config.mutation_rate,
                    self.config.max_prompt_length,
                ) > 0;

            let reflected =
                self.reflection.is_some() && rng.gen_bool(self.config.reflection_probability);
            if reflected {
                reflect_slots.push(next.len());
            }

            next.push(Individual::new(
                genes,
                Lineage::Offspring {
                    crossover: crossed,
                    mutated,
                    reflected,
                },
            ));
        }

        if reflect_slots.is_empty() {
            return next;
        }
        if let Some(adapter) = self.reflection.clone() {
            self.reflect_offspring(adapter.as_ref(), template, &mut next, reflect_slots, evaluator, examples)
                .await;
        }
        next
    }

    async fn reflect_offspring(
        &mut self,
        adapter: &dyn ReflectionAdapter,
        template: &PromptModule,
        next: &mut [Individual],
        slots: Vec<usize>,
        evaluator: &dyn Evaluator,
        examples: &[Value],
    ) {
        let ctx = ReflectionContext {
            adapter,
            evaluator,
            template,
            examples,
            trace_limit: self.config.reflection_traces,
            reflection_timeout: self.config.reflection_timeout(),
            evaluation_timeout: self.config.evaluation_timeout(),
            max_prompt_length: self.config.max_prompt_length,
        };

        let work: Vec<_> = slots
            .into_iter()
            .map(|slot| (slot, std::mem::take(&mut next[slot].genes)))
            .collect();
        tracing::debug!(offspring = work.len(), "reflecting");

        let ctx = &ctx;
        let outcomes: Vec<_> = stream::iter(work)
            .map(|(slot, genes)| async move { (slot, reflect_on(ctx, genes).await) })
            .buffered(self.config.max_concurrency)
            .collect()
            .await;

        for (slot, outcome) in outcomes {
            tracing::debug!(slot, performance = outcome.performance, "offspring reflected");
            self.reflections += outcome.calls;
            self.reflection_failures += outcome.failures;
            self.evaluations += outcome.evaluations;
            next[slot].genes = outcome.genes;
        }
    }
}

fn generation_stats(generation: usize, population: &[Individual], best_so_far: f64) -> GenerationStats {
    let scored: Vec<f64> = population.iter().filter_map(|i| i.fitness).collect();
    let generation_best = population
        .iter()
        .map(Individual::rank_fitness)
        .fold(f64::NEG_INFINITY, f64::max);
    let mean_fitness = if scored.is_empty() {
        f64::NEG_INFINITY
    } else {
        scored.iter().sum::<f64>() / scored.len() as f64
    };
    GenerationStats {
        generation,
        generation_best,
        best_so_far,
        mean_fitness,
        failed: population.len() - scored.len(),
        population_size: population.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::FnEvaluator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn qa() -> PromptModule {
        let mut m = PromptModule::new("Qa");
        m.register("instructions", "Answer the question.", None).unwrap();
        m
    }

    fn length_score(m: &PromptModule, _: Option<&Value>) -> anyhow::Result<f64> {
        Ok(m.get_prompt("instructions").map(|p| p.len() as f64 / 1000.0).unwrap_or(0.0))
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_evaluation() {
        let calls = AtomicUsize::new(0);
        let eval = FnEvaluator::new(|_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        });
        let mut opt = GepaOptimizer::new(GepaConfig {
            population_size: 2,
            elitism_count: 3,
            ..Default::default()
        });
        let err = opt.optimize(&qa(), &eval, &[]).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(opt.state(), OptimizerState::NotStarted);
    }

    #[tokio::test]
    async fn test_learning_disabled_skips() {
        let mut root = qa();
        root.enable_learning(false);
        let mut opt = GepaOptimizer::new(GepaConfig::default());
        let out = opt.optimize(&root, &FnEvaluator::new(length_score), &[]).await.unwrap();
        assert_eq!(opt.state(), OptimizerState::Skipped);
        assert_eq!(out.get_prompt_dict(true), root.get_prompt_dict(true));
        assert!(opt.history().is_empty());
    }

    #[tokio::test]
    async fn test_initial_population_seed_first() {
        let opt = GepaOptimizer::new(GepaConfig {
            population_size: 5,
            ..Default::default()
        });
        let seed = Individual::seed(&qa());
        let mut rng = StdRng::seed_from_u64(4);
        let pop = opt.initial_population(&mut rng, &seed);
        assert_eq!(pop.len(), 5);
        assert!(pop[0].same_values(&seed));
        assert!(pop[1..].iter().all(|i| !i.same_values(&seed)));
        assert_eq!(
            pop[1].genes["instructions"].as_ref(),
            "Be specific and detailed in your response. Answer the question."
        );
    }

    #[tokio::test]
    async fn test_counters_reset_between_runs() {
        let mut opt = GepaOptimizer::new(GepaConfig {
            population_size: 3,
            generations: 2,
            elitism_count: 1,
            convergence_threshold: 0.0,
            ..Default::default()
        })
        .with_seed(1);
        let eval = FnEvaluator::new(length_score);
        opt.optimize(&qa(), &eval, &[]).await.unwrap();
        let first = opt.report();
        opt.optimize(&qa(), &eval, &[]).await.unwrap();
        let second = opt.report();
        assert_eq!(first.evaluations, second.evaluations);
        assert_eq!(second.history.len(), 2);
        assert_eq!(second.state, OptimizerState::Exhausted);
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_generation() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let mut opt = GepaOptimizer::new(GepaConfig {
            population_size: 3,
            generations: 3,
            elitism_count: 1,
            convergence_threshold: 0.0,
            ..Default::default()
        })
        .with_seed(2)
        .with_progress(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        opt.optimize(&qa(), &FnEvaluator::new(length_score), &[]).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_generation_stats_ignores_failures_in_mean() {
        let seed = Individual::seed(&qa());
        let mut a = seed.derive(Lineage::Elite);
        a.fitness = Some(0.2);
        let mut b = seed.derive(Lineage::Elite);
        b.fitness = Some(0.6);
        let c = seed.derive(Lineage::Elite);
        let stats = generation_stats(3, &[a, b, c], 0.9);
        assert_eq!(stats.failed, 1);
        assert!((stats.mean_fitness - 0.4).abs() < 1e-9);
        assert!((stats.generation_best - 0.6).abs() < 1e-9);
        assert!((stats.best_so_far - 0.9).abs() < 1e-9);
        assert_eq!(stats.population_size, 3);
    }

    #[test]
    fn test_generation_stats_all_failed() {
        let seed = Individual::seed(&qa());
        let stats = generation_stats(0, &[seed], f64::NEG_INFINITY);
        assert_eq!(stats.mean_fitness, f64::NEG_INFINITY);
        assert_eq!(stats.generation_best, f64::NEG_INFINITY);
        assert_eq!(stats.failed, 1);
    }
}
