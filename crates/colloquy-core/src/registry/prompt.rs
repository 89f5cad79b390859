//! Prompt templates: named bodies rendered with variable maps.
//!
//! A prompt's declared arguments are derived by scanning the body for
//! free variables, ordered by first occurrence so suspension reports
//! missing names deterministically.

use minijinja::Environment;
use serde_json::Value;

use crate::error::RegistryError;

/// A named prompt template with its declared arguments.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Qualified name (`alias/stem`).
    pub name: String,
    /// Raw template body.
    pub source: String,
    /// Free variables of the body, ordered by first occurrence.
    pub arguments: Vec<String>,
}

impl Prompt {
    /// Create a prompt, scanning the body for free variables.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self, RegistryError> {
        let name = name.into();
        let source = source.into();

        let env = Environment::new();
        let template =
            env.template_from_str(&source)
                .map_err(|e| RegistryError::Render {
                    name: name.clone(),
                    message: e.to_string(),
                })?;

        let mut arguments: Vec<String> = template.undeclared_variables(false).into_iter().collect();
        // HashSet order is unstable; pin to first occurrence in the body.
        arguments.sort_by_key(|arg| source.find(arg.as_str()).unwrap_or(usize::MAX));

        Ok(Self {
            name,
            source,
            arguments,
        })
    }

    /// Render the body with the given argument map.
    pub fn render(&self, args: &serde_json::Map<String, Value>) -> Result<String, RegistryError> {
        let env = Environment::new();
        env.render_str(&self.source, args)
            .map_err(|e| RegistryError::Render {
                name: self.name.clone(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[test]
    fn scans_arguments_in_first_occurrence_order() {
        let prompt = Prompt::new(
            "core/greet",
            "Hello {{ name }}, welcome to {{ place }}. Bye {{ name }}.",
        )
        .expect("build prompt");

        assert_eq!(prompt.arguments, vec!["name", "place"]);
    }

    #[test]
    fn renders_with_argument_map() {
        let prompt = Prompt::new("core/greet", "Hello {{ name }}!").expect("build prompt");
        let text = prompt.render(&args(&[("name", "Ada")])).expect("render");
        assert_eq!(text, "Hello Ada!");
    }

    #[test]
    fn body_without_variables_declares_none() {
        let prompt = Prompt::new("core/static", "No variables here.").expect("build prompt");
        assert!(prompt.arguments.is_empty());
        let text = prompt.render(&args(&[])).expect("render");
        assert_eq!(text, "No variables here.");
    }

    #[test]
    fn invalid_syntax_is_a_render_error() {
        let err = Prompt::new("core/broken", "{% if %}").unwrap_err();
        assert!(matches!(err, RegistryError::Render { .. }));
    }
}
