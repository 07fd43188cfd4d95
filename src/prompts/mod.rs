//! Versioned catalog of named prompt templates.
//!
//! Templates are either literal text with `{variable}` placeholders or a
//! function of the variable bag. [`PromptCatalog::build`] substitutes
//! leniently: placeholders without a value are left verbatim.
//! [`PromptCatalog::strict_build`] rejects a build that omits a declared
//! variable instead.

pub mod defaults;

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::error::PromptError;

/// Version of the built-in template set.
pub const CATALOG_VERSION: &str = "1.2.0";

/// Variables supplied to a build. Non-string values are rendered as JSON.
pub type PromptVars = BTreeMap<String, Value>;

pub type TemplateFn = Arc<dyn Fn(&PromptVars) -> String + Send + Sync>;

#[derive(Clone)]
pub enum Template {
    Text(String),
    Builder(TemplateFn),
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Builder(_) => f.write_str("Builder(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PromptDefinition {
    pub name: String,
    pub description: String,
    pub template: Template,
    /// Variables the template expects.
    pub variables: Vec<String>,
    pub model: String,
    pub temperature: f32,
    pub version: String,
}

impl PromptDefinition {
    pub fn text(name: &str, variables: &[&str], text: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            template: Template::Text(text.to_string()),
            variables: variables.iter().map(|v| v.to_string()).collect(),
            model: defaults::DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            version: CATALOG_VERSION.to_string(),
        }
    }

    pub fn builder<F>(name: &str, variables: &[&str], build: F) -> Self
    where
        F: Fn(&PromptVars) -> String + Send + Sync + 'static,
    {
        Self {
            template: Template::Builder(Arc::new(build)),
            ..Self::text(name, variables, "")
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn render(&self, vars: &PromptVars) -> String {
        match &self.template {
            Template::Text(text) => substitute(text, vars),
            Template::Builder(build) => build(vars),
        }
    }
}

/// A prompt ready to send, with its defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
}

/// Catalog key for a display name: lower-cased, whitespace runs become `.`.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a variable the way it is spliced into text.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn substitute(text: &str, vars: &PromptVars) -> String {
    vars.iter().fold(text.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), &render_value(value))
    })
}

pub struct PromptCatalog {
    prompts: RwLock<HashMap<String, PromptDefinition>>,
}

impl Default for PromptCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PromptCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            prompts: RwLock::new(HashMap::new()),
        }
    }

    /// A catalog holding the built-in templates.
    pub fn with_defaults() -> Self {
        let catalog = Self::empty();
        {
            let mut prompts = catalog.prompts.write().unwrap_or_else(|e| e.into_inner());
            for def in defaults::builtin_prompts() {
                prompts.insert(normalize_key(&def.name), def);
            }
        }
        catalog
    }

    pub fn get(&self, name: &str) -> Option<PromptDefinition> {
        self.prompts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalize_key(name))
            .cloned()
    }

    /// Render `name` with `vars`. Unknown placeholders stay verbatim.
    pub fn build(&self, name: &str, vars: &PromptVars) -> Result<BuiltPrompt, PromptError> {
        let def = self
            .get(name)
            .ok_or_else(|| PromptError::PromptNotFound(name.to_string()))?;

        Ok(BuiltPrompt {
            prompt: def.render(vars),
            model: def.model,
            temperature: def.temperature,
        })
    }

    /// Like [`build`](Self::build), but every declared variable must be supplied.
    pub fn strict_build(&self, name: &str, vars: &PromptVars) -> Result<BuiltPrompt, PromptError> {
        let def = self
            .get(name)
            .ok_or_else(|| PromptError::PromptNotFound(name.to_string()))?;

        let missing: Vec<String> = def
            .variables
            .iter()
            .filter(|v| !vars.contains_key(v.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PromptError::MissingVariables {
                name: def.name,
                missing,
            });
        }

        self.build(name, vars)
    }

    /// Add or replace a prompt under its normalized key.
    pub fn register(&self, def: PromptDefinition) -> Result<String, PromptError> {
        if def.name.trim().is_empty() {
            return Err(PromptError::InvalidPromptDefinition("name is empty".into()));
        }
        if let Template::Text(text) = &def.template {
            if text.trim().is_empty() {
                return Err(PromptError::InvalidPromptDefinition(format!(
                    "{}: template is empty",
                    def.name
                )));
            }
        }
        if def.variables.is_empty() {
            return Err(PromptError::InvalidPromptDefinition(format!(
                "{}: no variables declared",
                def.name
            )));
        }

        let key = normalize_key(&def.name);
        let replaced = self
            .prompts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), def)
            .is_some();
        debug!("Registered prompt {} (replaced: {})", key, replaced);
        Ok(key)
    }

    /// Every key, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .prompts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Definitions whose key starts with `prefix`, sorted by key.
    pub fn by_category_prefix(&self, prefix: &str) -> Vec<PromptDefinition> {
        let prompts = self.prompts.read().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<(&String, &PromptDefinition)> =
            prompts.iter().filter(|(k, _)| k.starts_with(prefix)).collect();
        matches.sort_by(|a, b| a.0.cmp(b.0));
        matches.into_iter().map(|(_, def)| def.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.prompts.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build a [`PromptVars`] from key/value pairs.
pub fn vars<I, K, V>(pairs: I) -> PromptVars
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_substitutes_every_occurrence() {
        let catalog = PromptCatalog::empty();
        catalog
            .register(
                PromptDefinition::text("greet", &["name"], "Hello {name}. Bye {name}.")
                    .with_model("m1")
                    .with_temperature(0.2),
            )
            .unwrap();

        let built = catalog.build("greet", &vars([("name", "Ada")])).unwrap();
        assert_eq!(built.prompt, "Hello Ada. Bye Ada.");
        assert_eq!(built.model, "m1");
        assert_eq!(built.temperature, 0.2);
    }

    #[test]
    fn missing_variables_stay_verbatim() {
        let catalog = PromptCatalog::empty();
        catalog
            .register(PromptDefinition::text("pair", &["a", "b"], "{a} and {b}"))
            .unwrap();

        let built = catalog.build("pair", &vars([("a", 1)])).unwrap();
        assert_eq!(built.prompt, "1 and {b}");

        let err = catalog.strict_build("pair", &vars([("a", 1)])).unwrap_err();
        match err {
            PromptError::MissingVariables { missing, .. } => assert_eq!(missing, vec!["b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_prompt_is_an_error() {
        let catalog = PromptCatalog::empty();
        assert!(matches!(
            catalog.build("nope", &PromptVars::new()),
            Err(PromptError::PromptNotFound(_))
        ));
        assert!(catalog.get("nope").is_none());
    }

    #[test]
    fn register_validates_definition() {
        let catalog = PromptCatalog::empty();
        for bad in [
            PromptDefinition::text("", &["x"], "{x}"),
            PromptDefinition::text("empty template", &["x"], "   "),
            PromptDefinition::text("no vars", &[], "static text"),
        ] {
            assert!(matches!(
                catalog.register(bad),
                Err(PromptError::InvalidPromptDefinition(_))
            ));
        }
        assert!(catalog.is_empty());
    }

    #[test]
    fn colliding_keys_overwrite() {
        let catalog = PromptCatalog::empty();
        let first = catalog
            .register(PromptDefinition::text("Daily  Digest", &["x"], "first {x}"))
            .unwrap();
        let second = catalog
            .register(PromptDefinition::text("daily digest", &["x"], "second {x}"))
            .unwrap();

        assert_eq!(first, "daily.digest");
        assert_eq!(first, second);
        assert_eq!(catalog.list(), vec!["daily.digest"]);
        let built = catalog.build("Daily Digest", &vars([("x", "!")])).unwrap();
        assert_eq!(built.prompt, "second !");
    }

    #[test]
    fn builder_templates_see_the_variables() {
        let catalog = PromptCatalog::empty();
        catalog
            .register(PromptDefinition::builder("count", &["items"], |vars| {
                let n = vars
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, |a| a.len());
                format!("{} items", n)
            }))
            .unwrap();

        let built = catalog
            .build("count", &vars([("items", json!([1, 2, 3]))]))
            .unwrap();
        assert_eq!(built.prompt, "3 items");
    }

    #[test]
    fn builtins_are_listed_by_prefix() {
        let catalog = PromptCatalog::with_defaults();
        let agent: Vec<String> = catalog
            .by_category_prefix("agent.")
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert!(agent.contains(&"agent.decision".to_string()));
        assert!(agent.iter().all(|n| n.starts_with("agent.")));
        assert_eq!(catalog.by_category_prefix("memory.").len(), 1);
        assert_eq!(catalog.len(), catalog.list().len());
    }
}
