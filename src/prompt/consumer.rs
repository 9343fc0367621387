// src/prompt/consumer.rs — Objects that receive a parameter's instruction text

/// Anything that consumes instruction text, e.g. a predictor's signature.
///
/// A consumer is wired to a parameter when the parameter is registered and
/// receives every subsequent write. Consumers are deep-cloned together with
/// their owning module.
pub trait PromptConsumer: std::fmt::Debug + Send + Sync {
    fn set_instructions(&mut self, text: &str);

    fn instructions(&self) -> Option<&str> {
        None
    }

    fn clone_box(&self) -> Box<dyn PromptConsumer>;
}

impl Clone for Box<dyn PromptConsumer> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// An input/output spec (`"question -> answer"`) plus its instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub spec: String,
    pub instructions: String,
}

impl Signature {
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            instructions: String::new(),
        }
    }

    pub fn input_fields(&self) -> Vec<&str> {
        self.split_spec().0
    }

    pub fn output_fields(&self) -> Vec<&str> {
        self.split_spec().1
    }

    fn split_spec(&self) -> (Vec<&str>, Vec<&str>) {
        match self.spec.split_once("->") {
            Some((inputs, outputs)) => (field_list(inputs), field_list(outputs)),
            None => (field_list(&self.spec), Vec::new()),
        }
    }
}

fn field_list(s: &str) -> Vec<&str> {
    s.split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect()
}

impl PromptConsumer for Signature {
    fn set_instructions(&mut self, text: &str) {
        self.instructions = text.to_string();
    }

    fn instructions(&self) -> Option<&str> {
        Some(&self.instructions)
    }

    fn clone_box(&self) -> Box<dyn PromptConsumer> {
        Box::new(self.clone())
    }
}
