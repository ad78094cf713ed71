use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, bail};
use regex::Regex;
use serde::Deserialize;
use toml::Value;

use crate::Config;

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let mut raw_config: Value = toml::from_str(&content)?;
    expand_env_placeholders(&mut raw_config, &|name| std::env::var(name).ok())?;

    let config = Config::deserialize(raw_config)?;
    validate_model_references(&config)?;

    Ok(config)
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

/// Replaces `{{ env.NAME }}` placeholders in every string value. Missing
/// variables are an error rather than an empty expansion so that a broken
/// shell environment does not silently produce an unauthenticated provider.
fn expand_env_placeholders(
    value: &mut Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    match value {
        Value::String(s) => {
            if !s.contains("{{") {
                return Ok(());
            }

            let mut missing = None;
            let expanded = env_pattern().replace_all(s, |caps: &regex::Captures<'_>| {
                let name = &caps[1];
                match lookup(name) {
                    Some(v) => v,
                    None => {
                        missing.get_or_insert_with(|| name.to_string());
                        String::new()
                    }
                }
            });

            if let Some(name) = missing {
                bail!("environment variable '{name}' referenced in configuration is not set");
            }

            *s = expanded.into_owned();
        }
        Value::Array(values) => {
            for value in values {
                expand_env_placeholders(value, lookup)?;
            }
        }
        Value::Table(map) => {
            for (_, value) in map.iter_mut() {
                expand_env_placeholders(value, lookup)?;
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

pub(crate) fn validate_model_references(config: &Config) -> anyhow::Result<()> {
    for (tier, reference) in config.orchestrator.models.iter() {
        let Some((provider, model)) = reference.split_once('/') else {
            bail!("model reference '{reference}' for tier {tier:?} must use the provider/model form");
        };

        if model.is_empty() {
            bail!("model reference '{reference}' for tier {tier:?} is missing the model id");
        }

        if !config.providers.contains_key(provider) {
            bail!("model reference '{reference}' for tier {tier:?} names unknown provider '{provider}'");
        }
    }

    Ok(())
}
