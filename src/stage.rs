//! Pipeline stages.
//!
//! A stage reads from the session, renders its prompt, invokes the model once
//! and hands back a [`StageOutput`]. Stages never write to the session; the
//! orchestrator merges their output.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::llm::{InvocationClient, InvocationRequest, SamplingParameters};
use crate::prompt::{Bindings, PromptTemplate};
use crate::session::{SessionState, Slot, StageOutput};
use crate::tokens::{count_tokens, truncate_to_tokens};
use crate::{log_debug, log_info};

type Transform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// What happens to a completion before it is returned.
#[derive(Clone, Default)]
pub enum PostProcess {
    /// Keep the completion verbatim.
    #[default]
    Identity,
    Trim,
    /// Remove a trailing `</tag>` and surrounding whitespace.
    StripTag(String),
    Custom(Transform),
}

impl PostProcess {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn apply(&self, slot: Slot, raw: String) -> StageOutput {
        let text = match self {
            Self::Identity => raw,
            Self::Trim => raw.trim().to_string(),
            Self::StripTag(tag) => strip_closing_tag(&raw, tag),
            Self::Custom(f) => f(&raw),
        };
        StageOutput::Text { slot, text }
    }
}

impl fmt::Debug for PostProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Trim => f.write_str("Trim"),
            Self::StripTag(tag) => f.debug_tuple("StripTag").field(tag).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn strip_closing_tag(text: &str, tag: &str) -> String {
    let closing = format!("</{tag}>");
    let trimmed = text.trim();
    trimmed
        .strip_suffix(closing.as_str())
        .unwrap_or(trimmed)
        .replace(closing.as_str(), "")
        .trim()
        .to_string()
}

/// One step of a chain.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    /// The slot this stage's output is merged into.
    fn produces(&self) -> Slot;

    /// Slots read when building variables.
    fn depends_on(&self) -> Vec<Slot>;

    async fn run(
        &self,
        session: &SessionState,
        client: &InvocationClient,
    ) -> Result<StageOutput, PipelineError>;
}

/// A stage built from a template, slot bindings and constants.
#[derive(Debug, Clone)]
pub struct PromptStage {
    name: String,
    template: PromptTemplate,
    produces: Slot,
    model_id: String,
    params: Option<SamplingParameters>,
    inputs: Vec<(String, Slot)>,
    constants: Bindings,
    postprocess: PostProcess,
    max_input_tokens: Option<usize>,
}

impl PromptStage {
    pub fn new(
        name: impl Into<String>,
        template: PromptTemplate,
        produces: Slot,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            template,
            produces,
            model_id: model_id.into(),
            params: None,
            inputs: Vec::new(),
            constants: Bindings::new(),
            postprocess: PostProcess::Identity,
            max_input_tokens: None,
        }
    }

    /// Bind template variable `variable` to the text of `slot`.
    #[must_use]
    pub fn bind(mut self, variable: impl Into<String>, slot: Slot) -> Self {
        self.inputs.push((variable.into(), slot));
        self
    }

    #[must_use]
    pub fn constant(mut self, variable: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.insert(variable.into(), value.into());
        self
    }

    #[must_use]
    pub const fn params(mut self, params: SamplingParameters) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn postprocess(mut self, postprocess: PostProcess) -> Self {
        self.postprocess = postprocess;
        self
    }

    /// Truncate slot text longer than `max_tokens` before binding it.
    #[must_use]
    pub const fn truncate_inputs(mut self, max_tokens: usize) -> Self {
        self.max_input_tokens = Some(max_tokens);
        self
    }

    pub const fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Variables for this stage from the current session.
    ///
    /// Slots that are still empty are simply left out, so rendering reports
    /// them as missing variables.
    pub fn variables(&self, session: &SessionState) -> Bindings {
        let mut variables = self.constants.clone();
        for (variable, slot) in &self.inputs {
            let Some(text) = session.slot_text(*slot) else {
                continue;
            };
            let value = match self.max_input_tokens {
                Some(max) if count_tokens(&text) > max => {
                    log_info!(
                        "Truncating '{}' for stage '{}' to {} tokens",
                        slot,
                        self.name,
                        max
                    );
                    truncate_to_tokens(&text, max)
                }
                _ => text.into_owned(),
            };
            variables.insert(variable.clone(), value);
        }
        variables
    }

    pub fn render(&self, session: &SessionState) -> Result<String, PipelineError> {
        self.template.render(&self.variables(session))
    }
}

#[async_trait]
impl PipelineStage for PromptStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Slot {
        self.produces
    }

    fn depends_on(&self) -> Vec<Slot> {
        self.inputs.iter().map(|(_, slot)| *slot).collect()
    }

    async fn run(
        &self,
        session: &SessionState,
        client: &InvocationClient,
    ) -> Result<StageOutput, PipelineError> {
        let prompt = self.render(session)?;
        log_debug!(
            "Stage '{}' prompt token size: {}",
            self.name,
            count_tokens(&prompt)
        );
        let request = InvocationRequest::new(&self.model_id, prompt, self.params);
        let result = client.invoke(&request).await?;
        Ok(self.postprocess.apply(self.produces, result.text))
    }
}
