// src/core/reflection.rs — Natural-language reflection over execution traces

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::operators::truncate_chars;
use super::population::{materialize, Genes};
use super::types::{ExecutionTrace, TraceStep};
use crate::evaluator::{score_once, Evaluator};
use crate::infra::errors::GepaError;
use crate::prompt::{Parameter, PromptModule};
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Proposes an improved prompt from the current one, evidence of how it
/// behaved, and the fitness it earned.
#[async_trait]
pub trait ReflectionAdapter: Send + Sync {
    async fn reflect(
        &self,
        prompt: &str,
        traces: &[ExecutionTrace],
        performance: f64,
    ) -> anyhow::Result<String>;
}

#[async_trait]
impl<R: ReflectionAdapter + ?Sized> ReflectionAdapter for Arc<R> {
    async fn reflect(
        &self,
        prompt: &str,
        traces: &[ExecutionTrace],
        performance: f64,
    ) -> anyhow::Result<String> {
        (**self).reflect(prompt, traces, performance).await
    }
}

/// One evaluation run recorded for reflection.
#[derive(Debug, Clone)]
pub(crate) struct TraceRun {
    input: Value,
    output: Value,
    score: Option<f64>,
    elapsed: Duration,
}

/// Evaluate `module` on up to `limit` examples (once without an example if
/// there are none), recording each run. Failures are recorded, not raised.
pub(crate) async fn collect_runs(
    evaluator: &dyn Evaluator,
    module: &PromptModule,
    examples: &[Value],
    limit: usize,
    timeout: Option<Duration>,
) -> Vec<TraceRun> {
    let inputs: Vec<Option<&Value>> = if examples.is_empty() {
        vec![None]
    } else {
        examples.iter().take(limit).map(Some).collect()
    };

    let mut runs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let started = Instant::now();
        let (output, score) = match score_once(evaluator, module, input, timeout).await {
            Ok(score) => (json!({ "score": score }), Some(score)),
            Err(e) => (json!({ "error": e.to_string() }), None),
        };
        runs.push(TraceRun {
            input: input.cloned().unwrap_or(Value::Null),
            output,
            score,
            elapsed: started.elapsed(),
        });
    }
    runs
}

/// Fitness the recorded runs add up to: their mean, or −∞ if any run failed.
pub(crate) fn runs_fitness(runs: &[TraceRun]) -> f64 {
    let scores: Option<Vec<f64>> = runs.iter().map(|run| run.score).collect();
    match scores {
        Some(scores) if !scores.is_empty() => scores.iter().sum::<f64>() / scores.len() as f64,
        _ => f64::NEG_INFINITY,
    }
}

/// The traces one parameter gets to see: every run, attributed to that
/// parameter's path and text.
pub(crate) fn traces_for_parameter(runs: &[TraceRun], param: &Parameter) -> Vec<ExecutionTrace> {
    runs.iter()
        .map(|run| {
            let mut trace = ExecutionTrace::new(param.path.clone(), param.value.clone());
            trace.input = run.input.clone();
            trace.output = run.output.clone();
            trace.execution_time = run.elapsed;
            trace.steps.push(TraceStep {
                name: "evaluate".into(),
                output: run.output.clone(),
            });
            trace
        })
        .collect()
}

/// Result of reflecting on one offspring.
#[derive(Debug)]
pub(crate) struct ReflectionOutcome {
    pub genes: Genes,
    pub performance: f64,
    pub evaluations: u64,
    pub calls: u64,
    pub failures: u64,
}

/// Everything a reflection pass needs besides the offspring itself.
pub(crate) struct ReflectionContext<'a> {
    pub adapter: &'a dyn ReflectionAdapter,
    pub evaluator: &'a dyn Evaluator,
    pub template: &'a PromptModule,
    pub examples: &'a [Value],
    pub trace_limit: usize,
    pub reflection_timeout: Duration,
    pub evaluation_timeout: Option<Duration>,
    pub max_prompt_length: usize,
}

/// Reflect on every optimizable parameter of `genes`, one adapter call per
/// parameter with that parameter's own text and traces. The offspring is
/// scored first and that fitness is what every call sees. A failed, empty
/// or timed-out call leaves that parameter's text unchanged.
pub(crate) async fn reflect_on(ctx: &ReflectionContext<'_>, mut genes: Genes) -> ReflectionOutcome {
    let module = materialize(ctx.template, &genes, None);
    let runs = collect_runs(
        ctx.evaluator,
        &module,
        ctx.examples,
        ctx.trace_limit,
        ctx.evaluation_timeout,
    )
    .await;
    let performance = runs_fitness(&runs);

    let mut calls = 0;
    let mut failures = 0;
    for (path, param) in module.named_parameters(true) {
        let traces = traces_for_parameter(&runs, param);
        calls += 1;
        match reflect_once(ctx, &param.value, &traces, performance).await {
            Ok(improved) => {
                genes.insert(path, Arc::from(truncate_chars(&improved, ctx.max_prompt_length)));
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(parameter = %param.path, "reflection skipped: {e}");
            }
        }
    }

    ReflectionOutcome {
        genes,
        performance,
        evaluations: runs.len() as u64,
        calls,
        failures,
    }
}

async fn reflect_once(
    ctx: &ReflectionContext<'_>,
    prompt: &str,
    traces: &[ExecutionTrace],
    performance: f64,
) -> Result<String, GepaError> {
    let reply = tokio::time::timeout(
        ctx.reflection_timeout,
        ctx.adapter.reflect(prompt, traces, performance),
    )
    .await
    .map_err(|_| GepaError::ReflectionTimeout {
        timeout_ms: ctx.reflection_timeout.as_millis() as u64,
    })?
    .map_err(|e| GepaError::Reflection(e.to_string()))?;

    let reply = reply.trim();
    if reply.is_empty() {
        return Err(GepaError::Reflection("adapter returned an empty prompt".into()));
    }
    Ok(reply.to_string())
}

// ─── Model-backed adapter ───────────────────────────────────────────

const REFLECTION_MAX_TOKENS: u32 = 1500;
const REFLECTION_SYSTEM: &str = "You improve the prompts of language-model programs. \
Reply with the improved prompt only.";
const REFLECTION_TEMPERATURE: f32 = 0.7;

/// Reflection adapter that asks a chat model for the improved prompt.
pub struct ModelReflector {
    provider: Arc<dyn ModelProvider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ModelReflector {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: REFLECTION_TEMPERATURE,
            max_tokens: REFLECTION_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ReflectionAdapter for ModelReflector {
    async fn reflect(
        &self,
        prompt: &str,
        traces: &[ExecutionTrace],
        performance: f64,
    ) -> anyhow::Result<String> {
        let response = self
            .provider
            .chat(ChatRequest {
                model: self.model.clone(),
                messages: vec![Message::user(build_reflection_prompt(prompt, traces, performance))],
                max_tokens: Some(self.max_tokens),
                temperature: Some(self.temperature),
                system: Some(REFLECTION_SYSTEM.to_string()),
            })
            .await?;
        tracing::debug!(
            provider = self.provider.id(),
            model = %self.model,
            tokens = response.usage.total(),
            "reflection reply"
        );

        let improved = clean_reply(&response.content);
        if improved.is_empty() {
            anyhow::bail!("model '{}' returned no prompt", self.model);
        }
        Ok(improved)
    }
}

pub fn build_reflection_prompt(prompt: &str, traces: &[ExecutionTrace], performance: f64) -> String {
    let formatted_traces = traces
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "Trace {}:\nInput: {}\nOutput: {}\nExecution Time: {:.3}s",
                i + 1,
                t.input,
                t.output,
                t.execution_time.as_secs_f64(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Current Performance: {performance:.3}\n\n\
         Current Prompt: {prompt}\n\n\
         Execution Traces:\n{formatted_traces}\n\n\
         Analyze these execution traces and suggest an improved version of the \
         prompt that would lead to better performance. Focus on:\n\
         1. Clarity and specificity\n\
         2. Better task understanding\n\
         3. More effective instructions\n\
         4. Domain-specific improvements\n\n\
         Provide only the improved prompt, no explanations."
    )
}

/// Strip code fences, a leading "Improved prompt:" label and wrapping quotes.
pub fn clean_reply(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(inner) = text.strip_prefix("```") {
        let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        text = inner.strip_suffix("```").unwrap_or(inner).trim();
    }

    for label in ["Improved prompt:", "Improved Prompt:", "IMPROVED PROMPT:"] {
        if let Some(rest) = text.strip_prefix(label) {
            text = rest.trim();
        }
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = text[1..text.len() - 1].trim();
        }
    }

    text.to_string()
}
