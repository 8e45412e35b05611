//! Template rendering for layers, entry scripts and volume specs.
//!
//! Rendering is a collaborator seam: the builder and the run-spec merger
//! only depend on [`LayerRenderer`]. The bundled [`PlaceholderRenderer`]
//! substitutes `{{ dotted.path }}` expressions and nothing else.

use std::sync::LazyLock;

use regex::Regex;
use rocked_common::config::Profile;
use rocked_common::error::{Result, RockedError};
use rocked_common::settings::Settings;
use serde_json::Value;

/// Renders a template string against a JSON context.
pub trait LayerRenderer {
    /// Renders `template` with values from `context`.
    ///
    /// # Errors
    ///
    /// Returns [`RockedError::Template`] if the template references values
    /// the context does not provide.
    fn render(&self, template: &str, context: &Value) -> Result<String>;
}

/// Builds the `{settings, profile}` context every template is rendered with.
///
/// # Errors
///
/// Returns an error if either value fails to serialize.
pub fn template_context(settings: &Settings, profile: &Profile) -> Result<Value> {
    Ok(serde_json::json!({
        "settings": serde_json::to_value(settings)?,
        "profile": serde_json::to_value(profile)?,
    }))
}

/// Substitutes `{{ a.b.c }}` placeholders.
///
/// Strings are inserted verbatim, numbers and booleans in their JSON form,
/// `null` as the empty string and arrays as their space-joined elements.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRenderer;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

impl LayerRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&template[last..whole.start()]);
            let value = lookup(context, path.as_str()).ok_or_else(|| RockedError::Template {
                message: format!("undefined value `{}`", path.as_str()),
            })?;
            out.push_str(&display_value(path.as_str(), value)?);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }
}

fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display_value(path: &str, value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| display_value(path, item))
            .collect::<Result<Vec<_>>>()
            .map(|parts| parts.join(" ")),
        Value::Object(_) => Err(RockedError::Template {
            message: format!("`{path}` is an object and cannot be inserted"),
        }),
    }
}
