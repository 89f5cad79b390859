//! Built-in invokables registered at startup.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::dialog::Dialog;
use crate::registry::{InvokeError, Invokable, RegistryBuilder};

/// Returns its `user_input` argument when present, otherwise the whole
/// argument map.
#[derive(Debug)]
pub struct Echo;

#[async_trait::async_trait]
impl Invokable for Echo {
    async fn call(
        &self,
        args: serde_json::Map<String, Value>,
        _dialog: &Dialog,
    ) -> Result<Value, InvokeError> {
        Ok(args
            .get("user_input")
            .cloned()
            .unwrap_or(Value::Object(args)))
    }
}

/// Returns the current UTC time as an RFC 3339 string.
#[derive(Debug)]
pub struct Now;

#[async_trait::async_trait]
impl Invokable for Now {
    async fn call(
        &self,
        _args: serde_json::Map<String, Value>,
        _dialog: &Dialog,
    ) -> Result<Value, InvokeError> {
        Ok(json!(chrono::Utc::now().to_rfc3339()))
    }
}

/// Register the built-ins. `echo` keeps a short alias alongside its
/// dotted name.
pub fn register_builtins(builder: &mut RegistryBuilder) {
    let echo: Arc<dyn Invokable> = Arc::new(Echo);
    builder.add_invokable("builtins.echo", Arc::clone(&echo));
    builder.add_invokable("echo", echo);
    builder.add_invokable("builtins.now", Arc::new(Now));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DialogTemplate;

    fn dialog() -> Dialog {
        let template: DialogTemplate =
            serde_yaml::from_str("name: t\nmodel: m\nsteps: []").expect("template");
        Dialog::from_template(&template, None, None, None)
    }

    #[tokio::test]
    async fn echo_returns_user_input_argument() {
        let mut args = serde_json::Map::new();
        args.insert("user_input".into(), json!("chosen"));
        args.insert("other".into(), json!(1));

        let result = Echo.call(args, &dialog()).await.expect("call");
        assert_eq!(result, json!("chosen"));
    }

    #[tokio::test]
    async fn echo_falls_back_to_whole_argument_map() {
        let mut args = serde_json::Map::new();
        args.insert("k".into(), json!("v"));

        let result = Echo.call(args, &dialog()).await.expect("call");
        assert_eq!(result, json!({"k": "v"}));
    }

    #[tokio::test]
    async fn builtins_are_registered_under_both_names() {
        let mut builder = RegistryBuilder::new();
        register_builtins(&mut builder);
        let registry = builder.build();

        assert!(registry.get_invokable("echo").is_ok());
        assert!(registry.get_invokable("builtins.echo").is_ok());
        assert!(registry.get_invokable("builtins.now").is_ok());
    }
}
