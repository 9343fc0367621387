// src/evaluator/heuristic.rs — Deterministic keyword/length evaluator
//
// Stand-in fitness for offline runs where no task-specific judge exists.
// Rewards longer prompts and prompts that ask for specificity.

use async_trait::async_trait;
use serde_json::Value;

use super::Evaluator;
use crate::prompt::PromptModule;

const DEFAULT_KEYWORDS: &[&str] = &["specific", "detailed", "accurate", "examples", "step by step"];
const DEFAULT_KEYWORD_BONUS: usize = 50;
const DEFAULT_NORMALIZER: f64 = 10_000.0;

#[derive(Debug, Clone)]
pub struct KeywordEvaluator {
    keywords: Vec<String>,
    keyword_bonus: usize,
    normalizer: f64,
}

impl Default for KeywordEvaluator {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            keyword_bonus: DEFAULT_KEYWORD_BONUS,
            normalizer: DEFAULT_NORMALIZER,
        }
    }
}

impl KeywordEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(|k| k.into().to_lowercase()).collect();
        self
    }

    /// Length at which a prompt set saturates to a score of 1.0.
    pub fn with_normalizer(mut self, normalizer: f64) -> Self {
        self.normalizer = normalizer.max(1.0);
        self
    }

    pub fn with_keyword_bonus(mut self, bonus: usize) -> Self {
        self.keyword_bonus = bonus;
        self
    }

    /// Score a module. Extra keywords may come from the example's
    /// `"keywords"` array.
    pub fn score_module(&self, module: &PromptModule, example: Option<&Value>) -> f64 {
        let extra: Vec<String> = example
            .and_then(|e| e.get("keywords"))
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_lowercase)
                    .collect()
            })
            .unwrap_or_default();

        let mut total = 0usize;
        for param in module.parameters(true) {
            let lower = param.value.to_lowercase();
            total += param.value.chars().count();
            total += self
                .keywords
                .iter()
                .chain(extra.iter())
                .filter(|k| lower.contains(k.as_str()))
                .count()
                * self.keyword_bonus;
        }
        (total as f64 / self.normalizer).min(1.0)
    }
}

#[async_trait]
impl Evaluator for KeywordEvaluator {
    async fn evaluate(&self, module: &PromptModule, example: Option<&Value>) -> anyhow::Result<f64> {
        Ok(self.score_module(module, example))
    }
}
