//! Variable substitution engine for templates

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// `{{ key }}` with optional whitespace around the key
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("valid placeholder regex");
}

/// Replace every `{{ key }}` placeholder in `template` with the string form of
/// `variables[key]`.
///
/// Missing keys and `null` values render as an empty string. Strings render
/// verbatim, numbers and booleans through their display form, arrays and
/// objects as JSON.
pub fn substitute_variables(template: &str, variables: &serde_json::Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            variables
                .get(&caps[1])
                .map(value_to_string)
                .unwrap_or_default()
        })
        .into_owned()
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        // For arrays and objects, use JSON representation
        _ => value.to_string(),
    }
}

/// Names of all placeholders referenced by `template`, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
