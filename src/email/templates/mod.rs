//! HTML body formatting
//!
//! The sender does not know how HTML bodies are produced; it calls a
//! [`BodyFormatter`] injected at construction. [`TemplateEngine`] provides
//! `{{variable_name}}` substitution, [`PassthroughFormatter`] sends the body
//! as given.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("Unresolved template variable '{0}'")]
    UnresolvedVariable(String),
}

/// Renders the HTML body of an outgoing mail
pub trait BodyFormatter: Send + Sync {
    fn render_html(&self, body: &str) -> Result<String, FormatError>;
}

/// Sends HTML bodies unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughFormatter;

impl BodyFormatter for PassthroughFormatter {
    fn render_html(&self, body: &str) -> Result<String, FormatError> {
        Ok(body.to_string())
    }
}

/// Template rendering engine with variable substitution
#[derive(Debug, Default, Clone)]
pub struct TemplateEngine {
    variables: HashMap<String, String>,
    strict: bool,
}

impl TemplateEngine {
    /// Create a new template engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail rendering when a placeholder has no value instead of leaving it in place
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Set a variable value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set multiple variables from an iterator
    pub fn set_all<I, K, V>(&mut self, iter: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in iter {
            self.variables.insert(k.into(), v.into());
        }
        self
    }

    /// Render a template string, replacing {{variable}} with values.
    ///
    /// Each placeholder is replaced once; substituted values are not scanned again.
    pub fn render(&self, template: &str) -> String {
        self.expand(template).0
    }

    /// Single left-to-right pass returning the output and the first
    /// placeholder without a value
    fn expand(&self, template: &str) -> (String, Option<String>) {
        let mut out = String::with_capacity(template.len());
        let mut unresolved = None;
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find("}}") else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };

            let name = after[..end].trim();
            match self.variables.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    if unresolved.is_none() && is_variable_name(name) {
                        unresolved = Some(name.to_string());
                    }
                    out.push_str(&rest[start..start + 2 + end + 2]);
                }
            }
            rest = &after[end + 2..];
        }

        out.push_str(rest);
        (out, unresolved)
    }
}

fn is_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

impl BodyFormatter for TemplateEngine {
    fn render_html(&self, body: &str) -> Result<String, FormatError> {
        let (rendered, unresolved) = self.expand(body);

        match unresolved {
            Some(name) if self.strict => Err(FormatError::UnresolvedVariable(name)),
            _ => Ok(rendered),
        }
    }
}
