// tests/module_test.rs — Integration tests: module tree, prompt dicts and consumers

use pretty_assertions::assert_eq;
use serde_json::Value;

use promptevo::core::{GepaConfig, GepaOptimizer};
use promptevo::evaluator::FnEvaluator;
use promptevo::prompt::{ParameterState, PromptDict, PromptModule, Signature};

fn dict(pairs: &[(&str, &str)]) -> PromptDict {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn rag_program() -> PromptModule {
    let mut root = PromptModule::new("Rag");
    root.register_with_consumer(
        "answer",
        "Answer using the context.",
        Signature::new("context, question -> answer"),
    )
    .unwrap();
    let mut retriever = PromptModule::new("Retriever");
    retriever.register("query", "Rewrite the question as a search query.", None).unwrap();
    let mut reranker = PromptModule::new("Reranker");
    reranker.register("criteria", "Prefer recent sources.", None).unwrap();
    retriever.add_module("reranker", reranker).unwrap();
    root.add_module("retriever", retriever).unwrap();
    root
}

#[test]
fn test_prompt_dict_round_trip_nested() {
    let mut program = rag_program();
    let incoming = dict(&[
        ("answer", "Answer only from the context."),
        ("retriever.query", "Extract keywords."),
        ("retriever.reranker.criteria", "Prefer primary sources."),
    ]);

    assert_eq!(program.load_prompt_dict(&incoming, true), 3);
    assert_eq!(program.get_prompt_dict(true), incoming);
}

#[test]
fn test_load_without_recurse_ignores_dotted_names() {
    let mut program = rag_program();
    let applied = program.load_prompt_dict(&dict(&[("retriever.query", "changed")]), false);
    assert_eq!(applied, 0);
    assert_eq!(
        program.get_path("retriever.query").unwrap().value,
        "Rewrite the question as a search query."
    );
}

#[test]
fn test_from_prompt_dict_builds_tree() {
    let prompts = dict(&[
        ("instructions", "Answer."),
        ("critic.rubric", "Check facts."),
        ("critic.style.tone", "Neutral."),
    ]);
    let tree = PromptModule::from_prompt_dict("Program", &prompts).unwrap();

    assert_eq!(tree.get_prompt_dict(true), prompts);
    let modules: Vec<String> = tree.named_modules(true).map(|(name, _)| name).collect();
    assert_eq!(modules, vec!["", "critic", "critic.style"]);
    assert_eq!(
        tree.get_path("critic.style.tone").unwrap().path,
        "Program.critic.style.tone"
    );
}

#[test]
fn test_from_prompt_dict_rejects_bad_names() {
    let prompts = dict(&[("bad name", "x")]);
    assert!(PromptModule::from_prompt_dict("Program", &prompts).is_err());
}

#[test]
fn test_module_info_serializes() {
    let mut program = rag_program();
    program.freeze("answer");
    let info = program.module_info();
    let json = serde_json::to_value(&info).unwrap();

    assert_eq!(json["kind"], "Rag");
    assert_eq!(json["parameter_states"]["answer"], "frozen");
    assert_eq!(json["submodules"], serde_json::json!(["retriever", "retriever.reranker"]));
    assert_eq!(info.parameter_states["answer"], ParameterState::Frozen);
}

#[test]
fn test_archived_parameter_stays_archived() {
    let mut program = rag_program();
    assert!(program.archive("answer"));
    assert!(!program.freeze("answer"));
    assert!(!program.unfreeze("answer"));
    assert_eq!(program.get("answer").unwrap().state, ParameterState::Archived);
    assert!(!program.get_prompt_dict(false).contains_key("answer"));
}

#[tokio::test]
async fn test_optimized_module_keeps_consumers_in_sync() {
    let mut program = PromptModule::new("Rag");
    program
        .register_with_consumer(
            "answer",
            "Answer using the context.",
            Signature::new("context, question -> answer"),
        )
        .unwrap();
    let eval = FnEvaluator::new(|m: &PromptModule, _: Option<&Value>| {
        Ok(m.get_prompt("answer").map(str::len).unwrap_or(0) as f64)
    });
    let mut opt = GepaOptimizer::new(GepaConfig {
        population_size: 4,
        generations: 2,
        elitism_count: 1,
        seed: Some(5),
        ..Default::default()
    });

    let best = opt.optimize(&program, &eval, &[]).await.unwrap();

    let answer = best.get_prompt("answer").unwrap();
    assert_ne!(answer, "Answer using the context.");
    assert_eq!(best.consumer("answer").unwrap().instructions(), Some(answer));
    // the caller's consumer still carries the original text
    assert_eq!(
        program.consumer("answer").unwrap().instructions(),
        Some("Answer using the context.")
    );
}
