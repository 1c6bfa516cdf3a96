//! YAML configuration loader
//!
//! Configuration files may pull in other files with `$include` and reference
//! environment variables as `${VAR}` or `${VAR:default}`. Everything is
//! resolved on the YAML tree before it is deserialized.

use crate::{OptimizerError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

const INCLUDE_KEY: &str = "$include";

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").expect("valid env var regex"))
}

/// Read a YAML file, resolving includes (relative to the file) and
/// environment variables.
pub fn load_yaml_file<P: AsRef<Path>>(path: P) -> Result<YamlValue> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| OptimizerError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let mut value: YamlValue = serde_yaml::from_str(&content)
        .map_err(|e| OptimizerError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_includes(&mut value, base_dir)?;
    expand_variables(&mut value);

    Ok(value)
}

/// Load a YAML file and deserialize it into `T`.
///
/// An empty file deserializes as an empty mapping so that `T`'s serde
/// defaults apply.
pub fn load_yaml_config<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let yaml = load_yaml_file(path)?;
    let json = match yaml_to_json(&yaml)? {
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        other => other,
    };

    serde_json::from_value(json)
        .map_err(|e| OptimizerError::Config(format!("Invalid configuration: {}", e)))
}

fn resolve_includes(value: &mut YamlValue, base_dir: &Path) -> Result<()> {
    match value {
        YamlValue::Mapping(map) => {
            if let Some(YamlValue::String(include)) = map.get(INCLUDE_KEY).cloned() {
                *value = load_yaml_file(base_dir.join(include))?;
                return Ok(());
            }
            for (_, v) in map.iter_mut() {
                resolve_includes(v, base_dir)?;
            }
        }
        YamlValue::Sequence(seq) => {
            for item in seq.iter_mut() {
                resolve_includes(item, base_dir)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_variables(value: &mut YamlValue) {
    match value {
        YamlValue::String(s) => {
            if let Some(expanded) = expand_env_in_string(s) {
                *value = reparse_scalar(&expanded);
            }
        }
        YamlValue::Mapping(map) => map.iter_mut().for_each(|(_, v)| expand_variables(v)),
        YamlValue::Sequence(seq) => seq.iter_mut().for_each(expand_variables),
        _ => {}
    }
}

/// `max_workers: ${WORKERS:3}` should become the number 3, not the string.
fn reparse_scalar(expanded: &str) -> YamlValue {
    match serde_yaml::from_str::<YamlValue>(expanded) {
        Ok(v @ (YamlValue::Bool(_) | YamlValue::Number(_) | YamlValue::Null)) if !expanded.is_empty() => v,
        _ => YamlValue::String(expanded.to_string()),
    }
}

/// Replace every `${VAR:default}` in `s`. Returns `None` when `s` has no
/// references.
pub fn expand_env_in_string(s: &str) -> Option<String> {
    if !s.contains("${") {
        return None;
    }

    let expanded = env_var_regex().replace_all(s, |cap: &regex::Captures<'_>| {
        let default = cap.get(2).map(|m| m.as_str()).unwrap_or("");
        env::var(&cap[1]).unwrap_or_else(|_| default.to_string())
    });

    Some(expanded.into_owned())
}

fn yaml_to_json(yaml: &YamlValue) -> Result<JsonValue> {
    Ok(match yaml {
        YamlValue::Null => JsonValue::Null,
        YamlValue::Bool(b) => JsonValue::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .ok_or_else(|| OptimizerError::Config(format!("Invalid number: {}", n)))?
            }
        }
        YamlValue::String(s) => JsonValue::String(s.clone()),
        YamlValue::Sequence(seq) => {
            JsonValue::Array(seq.iter().map(yaml_to_json).collect::<Result<Vec<_>>>()?)
        }
        YamlValue::Mapping(map) => {
            let mut object = serde_json::Map::new();
            for (k, v) in map {
                let key = k
                    .as_str()
                    .ok_or_else(|| OptimizerError::Config("Map keys must be strings".to_string()))?;
                object.insert(key.to_string(), yaml_to_json(v)?);
            }
            JsonValue::Object(object)
        }
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_expand_env_in_string() {
        env::set_var("OPTIMIZER_LOADER_TEST_MODEL", "grok-4");

        let result = expand_env_in_string("model ${OPTIMIZER_LOADER_TEST_MODEL} here");
        assert_eq!(result, Some("model grok-4 here".to_string()));

        env::remove_var("OPTIMIZER_LOADER_TEST_MODEL");
    }

    #[test]
    fn test_expand_env_with_default() {
        let result = expand_env_in_string("${OPTIMIZER_LOADER_MISSING:7}");
        assert_eq!(result, Some("7".to_string()));
        assert_eq!(expand_env_in_string("no variables"), None);
    }

    #[test]
    fn test_expanded_numbers_are_typed() -> Result<()> {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "workers: ${{OPTIMIZER_LOADER_WORKERS:4}}\nname: \"${{OPTIMIZER_LOADER_NAME:fast}}\"\n").unwrap();

        let json = yaml_to_json(&load_yaml_file(temp_file.path())?)?;
        assert_eq!(json["workers"], 4);
        assert_eq!(json["name"], "fast");
        Ok(())
    }

    #[test]
    fn test_include_resolves_relative_to_file() -> Result<()> {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("retry.yaml"), "max_retries: 5\n").unwrap();
        fs::write(dir.path().join("main.yaml"), "retry:\n  $include: retry.yaml\n").unwrap();

        let json = yaml_to_json(&load_yaml_file(dir.path().join("main.yaml"))?)?;
        assert_eq!(json["retry"]["max_retries"], 5);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_yaml_file("/nonexistent/optimizer.yaml").unwrap_err();
        assert!(matches!(err, OptimizerError::Config(_)));
    }

    #[test]
    fn test_yaml_to_json_rejects_non_string_keys() {
        let yaml: YamlValue = serde_yaml::from_str("1: one").unwrap();
        assert!(yaml_to_json(&yaml).is_err());
    }
}
