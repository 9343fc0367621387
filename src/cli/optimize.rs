// src/cli/optimize.rs — `promptevo optimize`

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use super::progress::terminal_progress;
use super::{read_prompt_dict, OptimizeArgs, ROOT_KIND};
use crate::core::{GepaOptimizer, ModelReflector, ReflectionAdapter};
use crate::evaluator::heuristic::KeywordEvaluator;
use crate::infra::config::{Config, EvaluationConfig, ReflectionConfig};
use crate::prompt::PromptModule;
use crate::provider::openai_compat::OpenAICompatProvider;
use crate::provider::retry::RetryProvider;

pub async fn run_optimize(args: OptimizeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(generations) = args.generations {
        config.optimizer.generations = generations;
    }
    if let Some(population) = args.population {
        config.optimizer.population_size = population;
        config.optimizer.elitism_count = config.optimizer.elitism_count.min(population);
    }
    if let Some(seed) = args.seed {
        config.optimizer.seed = Some(seed);
    }
    config.validate()?;

    let prompts = read_prompt_dict(&args.prompts)?;
    let mut root = PromptModule::from_prompt_dict(ROOT_KIND, &prompts)?;
    for name in &args.freeze {
        if !freeze_path(&mut root, name) {
            anyhow::bail!("cannot freeze unknown prompt '{name}'");
        }
    }
    let examples = match &args.examples {
        Some(path) => read_examples(path)?,
        None => Vec::new(),
    };

    let evaluator = keyword_evaluator(&config.evaluation);
    let mut optimizer = GepaOptimizer::new(config.optimizer.clone());
    if let Some(reflector) = model_reflector(&config.reflection) {
        optimizer = optimizer.with_reflection(reflector);
    }
    if !args.quiet {
        optimizer = optimizer.with_progress(terminal_progress(config.optimizer.generations));
    }

    let best = optimizer.optimize(&root, &evaluator, &examples).await?;
    let report = optimizer.report();
    tracing::info!(state = %report.state, best = report.best_fitness, "run complete");

    // frozen prompts are not exported by the module, so start from the input
    let mut optimized = prompts;
    optimized.extend(best.get_prompt_dict(true));
    let output = serde_json::to_string_pretty(&optimized)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{output}\n"))?;
            eprintln!("Wrote optimized prompts to {}", path.display());
        }
        None => println!("{output}"),
    }

    if args.report {
        eprintln!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Freeze a prompt by dotted name, walking child modules for the prefix.
pub fn freeze_path(root: &mut PromptModule, dotted: &str) -> bool {
    let (prefix, leaf) = match dotted.rsplit_once('.') {
        Some((prefix, leaf)) => (Some(prefix), leaf),
        None => (None, dotted),
    };
    let mut node = root;
    if let Some(prefix) = prefix {
        for segment in prefix.split('.') {
            match node.child_mut(segment) {
                Some(child) => node = child,
                None => return false,
            }
        }
    }
    node.freeze(leaf)
}

pub fn read_examples(path: &Path) -> anyhow::Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => Ok(items),
        _ => anyhow::bail!("{} must contain a JSON array of examples", path.display()),
    }
}

pub fn keyword_evaluator(config: &EvaluationConfig) -> KeywordEvaluator {
    let mut evaluator = KeywordEvaluator::new()
        .with_normalizer(config.normalizer)
        .with_keyword_bonus(config.keyword_bonus);
    if !config.keywords.is_empty() {
        evaluator = evaluator.with_keywords(config.keywords.iter().cloned());
    }
    evaluator
}

/// Model-backed reflector when reflection is enabled and its key is present.
pub fn model_reflector(config: &ReflectionConfig) -> Option<Arc<dyn ReflectionAdapter>> {
    if !config.enabled {
        return None;
    }
    let Some(api_key) = config.api_key() else {
        tracing::warn!(
            env = %config.api_key_env,
            "reflection enabled but API key variable is unset, continuing without it"
        );
        return None;
    };
    let provider = OpenAICompatProvider::new(config.provider.clone(), api_key, config.base_url.clone());
    let provider = RetryProvider::new(Arc::new(provider));
    Some(Arc::new(
        ModelReflector::new(Arc::new(provider), config.model.clone()).with_temperature(config.temperature),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tree() -> PromptModule {
        let mut root = PromptModule::new("Program");
        root.register("instructions", "Answer.", None).unwrap();
        let mut critic = PromptModule::new("critic");
        critic.register("rubric", "Check facts.", None).unwrap();
        root.add_module("critic", critic).unwrap();
        root
    }

    #[test]
    fn test_freeze_path_nested() {
        let mut root = tree();
        assert!(freeze_path(&mut root, "critic.rubric"));
        assert!(root.child("critic").unwrap().is_frozen("rubric"));
        assert!(freeze_path(&mut root, "instructions"));
        assert!(root.is_frozen("instructions"));
    }

    #[test]
    fn test_freeze_path_unknown() {
        let mut root = tree();
        assert!(!freeze_path(&mut root, "critic.missing"));
        assert!(!freeze_path(&mut root, "nobody.rubric"));
    }

    #[test]
    fn test_read_examples() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"q": "2+2"}}, {{"q": "capital of France"}}]"#).unwrap();
        assert_eq!(read_examples(file.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_read_examples_rejects_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"q": "2+2"}}"#).unwrap();
        assert!(read_examples(file.path()).is_err());
    }

    #[test]
    fn test_reflection_disabled_by_default() {
        assert!(model_reflector(&ReflectionConfig::default()).is_none());
    }

    #[test]
    fn test_reflection_without_key_is_skipped() {
        let config = ReflectionConfig {
            enabled: true,
            api_key_env: "PROMPTEVO_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Default::default()
        };
        assert!(model_reflector(&config).is_none());
    }

    #[tokio::test]
    async fn test_run_optimize_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts.json");
        let output = dir.path().join("out.json");
        std::fs::write(&prompts, r#"{"instructions": "Answer the question."}"#).unwrap();

        let args = OptimizeArgs {
            prompts,
            examples: None,
            output: Some(output.clone()),
            generations: Some(2),
            population: Some(4),
            seed: Some(7),
            freeze: Vec::new(),
            report: false,
            quiet: true,
        };
        run_optimize(args, Config::default()).await.unwrap();

        let written: crate::prompt::PromptDict =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let text = &written["instructions"];
        // longer text always wins under the keyword evaluator
        assert!(text.len() > "Answer the question.".len());
        assert!(text.ends_with("the question."));
    }

    #[tokio::test]
    async fn test_run_optimize_frozen_prompt_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts.json");
        let output = dir.path().join("out.json");
        std::fs::write(
            &prompts,
            r#"{"instructions": "Answer the question.", "style": "Be brief."}"#,
        )
        .unwrap();

        let args = OptimizeArgs {
            prompts,
            examples: None,
            output: Some(output.clone()),
            generations: Some(2),
            population: Some(4),
            seed: Some(3),
            freeze: vec!["style".into()],
            report: false,
            quiet: true,
        };
        run_optimize(args, Config::default()).await.unwrap();

        let written: crate::prompt::PromptDict =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["style"], "Be brief.");
        assert_ne!(written["instructions"], "Answer the question.");
    }
}
