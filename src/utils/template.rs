//! `{name}` placeholder expansion for simulation arguments.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Match: "{identifier}"
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
    });

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{name}}} in '{template}'")]
    UnknownPlaceholder { name: String, template: String },
}

/// Names of all placeholders in a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitute every placeholder with its value
pub fn expand(template: &str, values: &BTreeMap<String, String>) -> Result<String, TemplateError> {
    if let Some(name) = placeholders(template).into_iter().find(|n| !values.contains_key(*n)) {
        return Err(TemplateError::UnknownPlaceholder {
            name: name.to_string(),
            template: template.to_string(),
        });
    }
    let expanded = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        values.get(&caps[1]).cloned().unwrap_or_default()
    });
    Ok(expanded.into_owned())
}
