// src/evaluator/mod.rs — Evaluation contract
//
// The optimizer scores candidates through an externally supplied
// `Evaluator`. Implementations must not mutate the module they score: the
// same evaluator is called many times across clones.

pub mod heuristic;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::infra::errors::GepaError;
use crate::prompt::PromptModule;

/// Scores a module, optionally against one task example.
///
/// Report failure by returning `Err`: errors, timeouts and non-finite scores
/// rank the candidate last, but a panic is not caught and aborts the whole
/// `optimize` call.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, module: &PromptModule, example: Option<&Value>) -> anyhow::Result<f64>;
}

#[async_trait]
impl<E: Evaluator + ?Sized> Evaluator for std::sync::Arc<E> {
    async fn evaluate(&self, module: &PromptModule, example: Option<&Value>) -> anyhow::Result<f64> {
        (**self).evaluate(module, example).await
    }
}

/// Adapts a synchronous closure into an `Evaluator`.
pub struct FnEvaluator<F> {
    f: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&PromptModule, Option<&Value>) -> anyhow::Result<f64> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&PromptModule, Option<&Value>) -> anyhow::Result<f64> + Send + Sync,
{
    async fn evaluate(&self, module: &PromptModule, example: Option<&Value>) -> anyhow::Result<f64> {
        (self.f)(module, example)
    }
}

/// Outcome of scoring one module, with the number of evaluator calls made.
#[derive(Debug)]
pub struct Scored {
    pub fitness: Result<f64, GepaError>,
    pub calls: u64,
}

/// Fitness of one module: the mean over `examples`, or a single example-less
/// call when there are none. Any failure, timeout or non-finite score is an
/// error, and scoring stops at the first failing example.
pub async fn score(
    evaluator: &dyn Evaluator,
    module: &PromptModule,
    examples: &[Value],
    timeout: Option<Duration>,
) -> Scored {
    if examples.is_empty() {
        return Scored {
            fitness: score_once(evaluator, module, None, timeout).await,
            calls: 1,
        };
    }
    let mut total = 0.0;
    for (i, example) in examples.iter().enumerate() {
        match score_once(evaluator, module, Some(example), timeout).await {
            Ok(value) => total += value,
            Err(e) => {
                return Scored {
                    fitness: Err(e),
                    calls: i as u64 + 1,
                }
            }
        }
    }
    Scored {
        fitness: Ok(total / examples.len() as f64),
        calls: examples.len() as u64,
    }
}

pub(crate) async fn score_once(
    evaluator: &dyn Evaluator,
    module: &PromptModule,
    example: Option<&Value>,
    timeout: Option<Duration>,
) -> Result<f64, GepaError> {
    let call = evaluator.evaluate(module, example);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            GepaError::Evaluation(format!("timed out after {}ms", limit.as_millis()))
        })?,
        None => call.await,
    };
    let value = result.map_err(|e| GepaError::Evaluation(e.to_string()))?;
    if !value.is_finite() {
        return Err(GepaError::Evaluation(format!("non-finite score {value}")));
    }
    Ok(value)
}
