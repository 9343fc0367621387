// src/core/population.rs — Flat, copy-on-write population table
//
// An individual is the set of optimizable prompt values of one candidate,
// keyed by dotted parameter path. Values are `Arc<str>`, so elites, clones
// and crossover children share every value they did not rewrite. The module
// tree itself is cloned only when a candidate has to be materialized for
// evaluation or returned to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::prompt::{OptimizationMethod, PromptModule};

pub type Genes = BTreeMap<String, Arc<str>>;

/// How an individual was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lineage {
    /// Unmutated snapshot of the caller's root.
    Seed,
    /// Initial-population variant.
    Explored,
    Elite,
    Offspring {
        crossover: bool,
        mutated: bool,
        reflected: bool,
    },
}

impl Lineage {
    /// History tag recorded on parameters this individual changed.
    pub fn method(&self) -> OptimizationMethod {
        match self {
            Lineage::Seed | Lineage::Elite => OptimizationMethod::Gepa,
            Lineage::Explored => OptimizationMethod::Mutation,
            Lineage::Offspring { reflected: true, .. } => OptimizationMethod::Reflection,
            Lineage::Offspring { mutated: true, .. } => OptimizationMethod::Mutation,
            Lineage::Offspring { crossover: true, .. } => OptimizationMethod::Crossover,
            Lineage::Offspring { .. } => OptimizationMethod::Gepa,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Individual {
    pub id: Uuid,
    pub genes: Genes,
    pub lineage: Lineage,
    pub fitness: Option<f64>,
}

impl Individual {
    pub fn new(genes: Genes, lineage: Lineage) -> Self {
        Self {
            id: Uuid::new_v4(),
            genes,
            lineage,
            fitness: None,
        }
    }

    /// Snapshot the optimizable prompts of `module`.
    pub fn seed(module: &PromptModule) -> Self {
        let genes = module
            .named_parameters(true)
            .map(|(name, p)| (name, Arc::from(p.value.as_str())))
            .collect();
        Self::new(genes, Lineage::Seed)
    }

    /// Fitness used for ranking; unevaluated and failed individuals rank last.
    pub fn rank_fitness(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }

    /// Copy with a fresh id and no fitness. Values stay shared.
    pub fn derive(&self, lineage: Lineage) -> Self {
        Self::new(self.genes.clone(), lineage)
    }

    pub fn same_values(&self, other: &Individual) -> bool {
        self.genes == other.genes
    }
}

/// Build a module carrying `genes` on top of `template`. History is only
/// recorded when `record` is given, as (method, fitness delta).
pub fn materialize(
    template: &PromptModule,
    genes: &Genes,
    record: Option<(OptimizationMethod, f64)>,
) -> PromptModule {
    let mut module = template.clone();
    for (path, value) in genes {
        let unchanged = module
            .get_path(path)
            .map(|p| p.value.as_str() == value.as_ref())
            .unwrap_or(true);
        if unchanged {
            continue;
        }
        match record {
            Some((method, delta)) => {
                module.update_path_with(path, value.as_ref(), method, delta);
            }
            None => {
                module.update_path(path, value.as_ref(), false);
            }
        }
    }
    module
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> PromptModule {
        let mut root = PromptModule::new("Qa");
        root.register("instructions", "Answer.", None).unwrap();
        root.register("tone", "Neutral.", None).unwrap();
        root.freeze("tone");
        let mut child = PromptModule::new("Critic");
        child.register("rubric", "Check facts.", None).unwrap();
        root.add_module("critic", child).unwrap();
        root
    }

    #[test]
    fn test_seed_skips_frozen() {
        let seed = Individual::seed(&template());
        let keys: Vec<&str> = seed.genes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["critic.rubric", "instructions"]);
        assert_eq!(seed.lineage, Lineage::Seed);
        assert!(seed.fitness.is_none());
        assert_eq!(seed.rank_fitness(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_derive_shares_values() {
        let seed = Individual::seed(&template());
        let child = seed.derive(Lineage::Elite);
        assert_ne!(seed.id, child.id);
        assert!(seed.same_values(&child));
        assert!(Arc::ptr_eq(&seed.genes["instructions"], &child.genes["instructions"]));
    }

    #[test]
    fn test_materialize_applies_changes() {
        let t = template();
        let mut ind = Individual::seed(&t);
        ind.genes.insert("critic.rubric".into(), Arc::from("Check sources."));
        let m = materialize(&t, &ind.genes, None);
        assert_eq!(m.get_path("critic.rubric").unwrap().value, "Check sources.");
        assert_eq!(m.get_path("critic.rubric").unwrap().history_len(), 0);
        assert_eq!(m.get_prompt("tone"), Some("Neutral."));
        // template untouched
        assert_eq!(t.get_path("critic.rubric").unwrap().value, "Check facts.");
    }

    #[test]
    fn test_materialize_records_only_changed() {
        let t = template();
        let mut ind = Individual::seed(&t);
        ind.genes.insert("instructions".into(), Arc::from("Answer well."));
        let m = materialize(&t, &ind.genes, Some((OptimizationMethod::Mutation, 0.3)));
        let rec = m.get("instructions").unwrap().history().next().unwrap().clone();
        assert_eq!(rec.method, OptimizationMethod::Mutation);
        assert!((rec.fitness_delta - 0.3).abs() < 1e-9);
        assert_eq!(m.get_path("critic.rubric").unwrap().history_len(), 0);
    }

    #[test]
    fn test_lineage_method() {
        let l = Lineage::Offspring {
            crossover: true,
            mutated: true,
            reflected: false,
        };
        assert_eq!(l.method(), OptimizationMethod::Mutation);
        assert_eq!(Lineage::Seed.method(), OptimizationMethod::Gepa);
    }
}
