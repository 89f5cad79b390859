//! Registry bootstrap: walks the YAML registry config and loads dialog
//! templates, prompt directories, and schema documents into a
//! [`RegistryBuilder`].
//!
//! One template file declares one or more templates under the
//! `dialog_templates` key; every template is validated at load and a
//! malformed one aborts the boot with a `ConfigError`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::{McpServerConfig, ModelInfo, Prompt, RegistryBuilder, Schema};
use crate::template::DialogTemplate;

/// Extensions recognized as prompt bodies.
const PROMPT_EXTENSIONS: &[&str] = &["md", "j2", "txt"];

/// The YAML registry config loaded at boot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryConfig {
    /// Source-class identifiers for schema provenance.
    #[serde(default)]
    pub schema_modules: Vec<String>,
    /// Prompt directories keyed by alias; prompts register as
    /// `alias/stem`.
    #[serde(default)]
    pub template_paths: HashMap<String, PathBuf>,
    /// Directory of JSON schema documents, keyed by file stem.
    #[serde(default)]
    pub schemas_dir: Option<PathBuf>,
    /// External tool server declarations.
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Known model declarations.
    #[serde(default)]
    pub models: Vec<ModelInfo>,
    /// Directory of dialog-template YAML files.
    #[serde(default)]
    pub dialog_templates_dir: Option<PathBuf>,
}

/// One dialog-template file: `dialog_templates: { <name>: <template> }`.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    dialog_templates: HashMap<String, serde_yaml::Value>,
}

/// Parse the registry config file.
pub fn load_registry_config(path: &Path) -> Result<RegistryConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::YamlError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load everything the registry config points at into a builder.
///
/// Relative paths in the config resolve against the config file's
/// directory.
pub fn load_registry(config_path: &Path) -> Result<RegistryBuilder, ConfigError> {
    let config = load_registry_config(config_path)?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut builder = RegistryBuilder::new();

    for (alias, dir) in &config.template_paths {
        load_prompt_dir(&mut builder, alias, &resolve(base, dir))?;
    }

    if let Some(dir) = &config.schemas_dir {
        load_schema_dir(&mut builder, &resolve(base, dir), &config.schema_modules)?;
    }

    if let Some(dir) = &config.dialog_templates_dir {
        load_template_dir(&mut builder, &resolve(base, dir))?;
    }

    for (name, server) in config.mcp_servers {
        builder.add_mcp_server(name, server);
    }

    for model in config.models {
        builder.add_model(model);
    }

    Ok(builder)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Register every recognized file in `dir` as a prompt `alias/stem`.
fn load_prompt_dir(
    builder: &mut RegistryBuilder,
    alias: &str,
    dir: &Path,
) -> Result<(), ConfigError> {
    for path in sorted_files(dir)? {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !PROMPT_EXTENSIONS.contains(&ext) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let source = std::fs::read_to_string(&path).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let name = format!("{alias}/{stem}");
        let prompt = Prompt::new(&name, source).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::debug!(prompt = %name, arguments = ?prompt.arguments, "registered prompt");
        builder.add_prompt(prompt);
    }
    Ok(())
}

/// Register every `.json` document in `dir` as a schema.
fn load_schema_dir(
    builder: &mut RegistryBuilder,
    dir: &Path,
    modules: &[String],
) -> Result<(), ConfigError> {
    let source_class = modules.first().cloned().unwrap_or_default();

    for path in sorted_files(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let json_schema = serde_json::from_str(&raw).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        builder.add_schema(Schema {
            name: stem.to_string(),
            json_schema,
            description: String::new(),
            source_class: source_class.clone(),
        });
    }
    Ok(())
}

/// Register every template declared in the `.yaml`/`.yml` files of `dir`.
fn load_template_dir(builder: &mut RegistryBuilder, dir: &Path) -> Result<(), ConfigError> {
    for path in sorted_files(dir)? {
        if !matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        ) {
            continue;
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let file: TemplateFile = serde_yaml::from_str(&raw).map_err(|e| ConfigError::YamlError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        for (name, mut value) in file.dialog_templates {
            // The map key is authoritative for the template name.
            if let serde_yaml::Value::Mapping(mapping) = &mut value {
                mapping.insert(
                    serde_yaml::Value::String("name".into()),
                    serde_yaml::Value::String(name.clone()),
                );
            }
            let template: DialogTemplate =
                serde_yaml::from_value(value).map_err(|e| ConfigError::YamlError {
                    path: path.display().to_string(),
                    message: format!("template '{name}': {e}"),
                })?;

            if let Err(errors) = template.validate() {
                let message = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ConfigError::InvalidTemplate {
                    template: name,
                    message,
                });
            }

            tracing::info!(template = %template.name, steps = template.steps.len(), "registered template");
            builder.add_template(template);
        }
    }
    Ok(())
}

/// Directory listing, sorted for deterministic registration order.
fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|_| ConfigError::FileNotFound {
        path: dir.display().to_string(),
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::write(path, contents).expect("write fixture");
    }

    #[test]
    fn loads_prompts_templates_and_schemas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();

        std::fs::create_dir(root.join("prompts")).expect("mkdir");
        write(root.join("prompts/greet.md").as_path(), "Hello {{ name }}!");
        write(root.join("prompts/notes.txt").as_path(), "static body");

        std::fs::create_dir(root.join("schemas")).expect("mkdir");
        write(
            root.join("schemas/answer.json").as_path(),
            r#"{"type": "object"}"#,
        );

        std::fs::create_dir(root.join("templates")).expect("mkdir");
        write(
            root.join("templates/hello.yaml").as_path(),
            r"
dialog_templates:
  hello:
    model: claude-sonnet-4-5
    steps:
      - name: sys
        type: message
        role: system
        content: hi
",
        );

        write(
            root.join("registry.yaml").as_path(),
            r"
schema_modules: [colloquy.schemas]
template_paths:
  core: prompts
schemas_dir: schemas
dialog_templates_dir: templates
mcp_servers:
  files:
    command: mcp-files
    args: ['--root', '/tmp']
models:
  - name: claude-sonnet-4-5
    provider: anthropic
",
        );

        let registry = load_registry(&root.join("registry.yaml"))
            .expect("load registry")
            .build();

        let prompt = registry.get_prompt("core/greet").expect("prompt");
        assert_eq!(prompt.arguments, vec!["name"]);
        assert!(registry.get_prompt("core/notes").is_ok());

        let template = registry.get_template("hello").expect("template");
        assert_eq!(template.name, "hello");
        assert_eq!(template.steps.len(), 1);

        let schema = registry.get_schema("answer").expect("schema");
        assert_eq!(schema.source_class, "colloquy.schemas");

        let server = registry.get_mcp_server("files").expect("mcp server");
        assert_eq!(server.command, "mcp-files");

        let model = registry.get_model("claude-sonnet-4-5").expect("model");
        assert_eq!(model.provider.as_deref(), Some("anthropic"));
    }

    #[test]
    fn invalid_template_aborts_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir(root.join("templates")).expect("mkdir");
        write(
            root.join("templates/bad.yaml").as_path(),
            r"
dialog_templates:
  bad:
    model: m
    steps:
      - name: x
        type: message
        role: user
",
        );
        write(
            root.join("registry.yaml").as_path(),
            "dialog_templates_dir: templates\n",
        );

        let err = load_registry(&root.join("registry.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTemplate { .. }));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_registry(Path::new("/nonexistent/registry.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }
}
