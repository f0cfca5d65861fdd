//! Prompt templates with declared variables.
//!
//! Placeholders use `{name}` where `name` is an identifier. Braces that do not
//! wrap an identifier (JSON samples, for instance) are left alone.

use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use thiserror::Error;

use crate::error::PipelineError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Variable bindings handed to [`PromptTemplate::render`].
pub type Bindings = HashMap<String, String>;

/// Construction error for templates whose body and declaration disagree.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("placeholder '{{{0}}}' is not a declared variable")]
pub struct UndeclaredPlaceholder(pub String);

/// A string template plus the variable names it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    body: String,
    required_variables: BTreeSet<String>,
}

impl PromptTemplate {
    /// Build a template whose required variables are exactly its placeholders.
    pub fn new(body: impl Into<String>) -> Self {
        let body = body.into();
        let required_variables = placeholders(&body);
        Self {
            body,
            required_variables,
        }
    }

    /// Build a template with an explicit declaration.
    ///
    /// Declared names that never appear in the body are allowed and still
    /// required at render time.
    pub fn with_variables<I, S>(
        body: impl Into<String>,
        variables: I,
    ) -> Result<Self, UndeclaredPlaceholder>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let body = body.into();
        let required_variables: BTreeSet<String> =
            variables.into_iter().map(Into::into).collect();

        if let Some(stray) = placeholders(&body)
            .into_iter()
            .find(|name| !required_variables.contains(name))
        {
            return Err(UndeclaredPlaceholder(stray));
        }

        Ok(Self {
            body,
            required_variables,
        })
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn required_variables(&self) -> &BTreeSet<String> {
        &self.required_variables
    }

    /// Substitute every placeholder with its binding.
    ///
    /// Values are inserted verbatim and never re-scanned, so a value that
    /// happens to contain `{name}` stays literal. Extra bindings are ignored.
    pub fn render(&self, variables: &Bindings) -> Result<String, PipelineError> {
        let missing: Vec<String> = self
            .required_variables
            .iter()
            .filter(|name| !variables.contains_key(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingVariable(missing));
        }

        let rendered = PLACEHOLDER.replace_all(&self.body, |caps: &regex::Captures<'_>| {
            variables
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });
        Ok(rendered.into_owned())
    }
}

/// Collect the placeholder names that appear in `body`.
pub fn placeholders(body: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(body)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Convenience for building bindings from literal pairs.
pub fn bindings<'a, I>(pairs: I) -> Bindings
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
