//! Environment variable settings.
//!
//! `APP_SERVER__PORT=80` with prefix `APP_` becomes `server.port = 80`:
//! prefix stripped, name lowercased, `__` read as a key separator.

use crate::engine::{Engine, Value};
use crate::loaders::{LoadError, Loader};

/// Loads variables that start with a prefix.
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
    /// Fixed variables instead of the process environment.
    vars: Option<Vec<(String, String)>>,
}

impl EnvLoader {
    /// Read from the process environment each time the layer loads.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from the given variables instead of the process environment.
    pub fn with_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
        }
    }

    /// Map a variable name to a setting key, if it carries the prefix.
    pub fn key_for(&self, var: &str) -> Option<String> {
        let rest = var.strip_prefix(&self.prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase().replace("__", "."))
    }

    fn collect_vars(&self) -> Vec<(String, String)> {
        let mut vars = match &self.vars {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        vars.sort();
        vars
    }
}

impl Loader for EnvLoader {
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError> {
        for (name, raw) in self.collect_vars() {
            let Some(key) = self.key_for(&name) else {
                continue;
            };
            engine.set_value_at(key, Value::parse_scalar(&raw), format!("env:{}", name))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("environment variables {}*", self.prefix)
    }
}
