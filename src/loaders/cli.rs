//! Command-line settings.
//!
//! # Accepted Forms
//! - `--key=value` and `--key value`
//! - `--flag` alone sets `true`, `--no-flag` sets `false`
//! - `--` ends option parsing; positional and short options are ignored
//!
//! Assignments (`key=value`, as collected by a `--set` option) are accepted too.
//! Values go through [`Value::parse_scalar`].

use crate::engine::{Engine, Value};
use crate::loaders::{LoadError, Loader};

#[derive(Debug, Clone)]
enum Source {
    Args(Vec<String>),
    Assignments(Vec<String>),
}

/// Loads settings from command-line arguments.
#[derive(Debug, Clone)]
pub struct CliLoader {
    source: Source,
}

/// A parsed setting with the flag that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CliSetting {
    pub key: String,
    pub value: Value,
    pub location: String,
}

impl CliLoader {
    /// Parse long options from `args` (program name excluded).
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: Source::Args(args.into_iter().map(Into::into).collect()),
        }
    }

    /// Parse `key=value` assignments.
    pub fn from_assignments<I, S>(assignments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: Source::Assignments(assignments.into_iter().map(Into::into).collect()),
        }
    }

    pub fn settings(&self) -> Result<Vec<CliSetting>, LoadError> {
        match &self.source {
            Source::Args(args) => parse_args(args),
            Source::Assignments(items) => items.iter().map(|item| parse_assignment(item)).collect(),
        }
    }
}

fn setting(key: &str, value: Value, location: String) -> Result<CliSetting, LoadError> {
    if key.is_empty() {
        return Err(LoadError::cli(format!("missing option name in '{}'", location)));
    }
    Ok(CliSetting {
        key: key.to_string(),
        value,
        location,
    })
}

fn parse_args(args: &[String]) -> Result<Vec<CliSetting>, LoadError> {
    let mut settings = Vec::new();
    let mut iter = args.iter().peekable();

    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }
        let Some(option) = arg.strip_prefix("--") else {
            continue;
        };

        if let Some((key, raw)) = option.split_once('=') {
            settings.push(setting(key, Value::parse_scalar(raw), format!("--{}", key))?);
            continue;
        }

        if let Some(key) = option.strip_prefix("no-") {
            settings.push(setting(key, Value::Bool(false), arg.clone())?);
            continue;
        }

        let takes_value = iter.peek().is_some_and(|next| !next.starts_with("--"));
        let value = if takes_value {
            iter.next().map(|raw| Value::parse_scalar(raw)).unwrap_or(Value::Bool(true))
        } else {
            Value::Bool(true)
        };
        settings.push(setting(option, value, arg.clone())?);
    }

    Ok(settings)
}

fn parse_assignment(item: &str) -> Result<CliSetting, LoadError> {
    let Some((key, raw)) = item.split_once('=') else {
        return Err(LoadError::cli(format!("expected KEY=VALUE, got '{}'", item)));
    };
    let key = key.trim();
    setting(key, Value::parse_scalar(raw), format!("--set {}", key))
}

impl Loader for CliLoader {
    fn load(&mut self, engine: &mut Engine) -> Result<(), LoadError> {
        for CliSetting {
            key,
            value,
            location,
        } in self.settings()?
        {
            engine.set_value_at(key, value, location)?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.source {
            Source::Args(args) => format!("{} command-line arguments", args.len()),
            Source::Assignments(items) => format!("{} command-line assignments", items.len()),
        }
    }
}
