//! Step input rendering.
//!
//! Two placeholder shapes are recognised:
//!
//! - `{{.key}}` is replaced with the workflow variable `key`
//! - `{{.step.output}}` is replaced with the output of an already executed step
//!
//! Keys must match exactly; padded forms like `{{. key }}` and anything else
//! between braces are left untouched. The executor only sees the
//! [`TemplateRenderer`] trait, so a richer engine can be swapped in.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\.([^{}]+?)\}\}").expect("placeholder regex is valid"));

const OUTPUT_SUFFIX: &str = ".output";

/// Values visible to a step's input template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateBindings<'a> {
    pub variables: &'a BTreeMap<String, Value>,
    /// Step name -> captured output of every step executed so far.
    pub outputs: &'a HashMap<String, String>,
}

/// Turns a template plus bindings into plain text.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, bindings: &TemplateBindings<'_>) -> String;
}

/// The built-in `{{.key}}` / `{{.step.output}}` substitution.
///
/// Replacement is a single left-to-right pass: substituted text is never
/// rescanned, so an output containing `{{.x}}` is inserted literally. When a
/// key names both a variable and `<step>.output`, the variable wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl TemplateRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, bindings: &TemplateBindings<'_>) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| {
                let key = &caps[1];
                if let Some(value) = bindings.variables.get(key) {
                    return value_text(value);
                }
                if let Some(output) = key
                    .strip_suffix(OUTPUT_SUFFIX)
                    .and_then(|step| bindings.outputs.get(step))
                {
                    return output.clone();
                }
                caps[0].to_string()
            })
            .into_owned()
    }
}

/// String form of a variable: strings verbatim, null as empty, everything
/// else as compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
