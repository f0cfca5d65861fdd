//! Structured field extraction from the affidavit.

mod parser;
mod record;
mod schema;

pub use parser::parse_completion;
pub use record::ExtractedRecord;
pub use schema::{ExtractionSchema, FieldSpec, SchemaError};

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::llm::{InvocationClient, InvocationRequest, SamplingParameters};
use crate::prompt::library;
use crate::session::{SessionState, Slot, StageOutput};
use crate::stage::PipelineStage;
use crate::tokens::{count_tokens, truncate_to_tokens};
use crate::{log_debug, log_info};

/// Pull the schema's fields out of `document_text` with a single invocation.
///
/// Only a failed invocation is an error. A completion that does not parse
/// still yields a record, with unset fields and the raw text kept.
pub async fn extract(
    client: &InvocationClient,
    model_id: &str,
    params: Option<SamplingParameters>,
    schema: &ExtractionSchema,
    document_text: &str,
) -> Result<ExtractedRecord, PipelineError> {
    let mut variables = schema.bindings();
    variables.insert("aoh_text".to_string(), document_text.to_string());
    let prompt = library::extraction().render(&variables)?;
    log_debug!("Extraction prompt token size: {}", count_tokens(&prompt));

    let result = client
        .invoke(&InvocationRequest::new(model_id, prompt, params))
        .await?;
    Ok(parse_completion(schema, &result.text))
}

/// Runs [`extract`] over the affidavit text.
#[derive(Debug, Clone)]
pub struct ExtractionStage {
    name: String,
    model_id: String,
    params: Option<SamplingParameters>,
    schema: ExtractionSchema,
    max_document_tokens: Option<usize>,
}

impl ExtractionStage {
    pub fn new(
        name: impl Into<String>,
        model_id: impl Into<String>,
        schema: ExtractionSchema,
    ) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
            params: None,
            schema,
            max_document_tokens: None,
        }
    }

    #[must_use]
    pub const fn params(mut self, params: SamplingParameters) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub const fn truncate_document(mut self, max_tokens: usize) -> Self {
        self.max_document_tokens = Some(max_tokens);
        self
    }

    pub const fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }
}

#[async_trait]
impl PipelineStage for ExtractionStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Slot {
        Slot::ExtractedRecord
    }

    fn depends_on(&self) -> Vec<Slot> {
        vec![Slot::AohText]
    }

    async fn run(
        &self,
        session: &SessionState,
        client: &InvocationClient,
    ) -> Result<StageOutput, PipelineError> {
        let document = session
            .aoh_text()
            .ok_or_else(|| PipelineError::missing("aoh_text"))?;
        let document = match self.max_document_tokens {
            Some(max) => truncate_to_tokens(document, max),
            None => document.to_string(),
        };
        log_info!("Extracting {} field(s)", self.schema.len());
        let record = extract(
            client,
            &self.model_id,
            self.params,
            &self.schema,
            &document,
        )
        .await?;
        Ok(StageOutput::Record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::llm::{MockModelClient, RetryPolicy};
    use std::sync::Arc;

    fn client(mock: &MockModelClient) -> InvocationClient {
        InvocationClient::new(Arc::new(mock.clone()), RetryPolicy::immediate(1))
    }

    #[tokio::test]
    async fn test_extract_embeds_schema_and_document() {
        let mock = MockModelClient::new();
        mock.push_response(r#"{"date": "01/01/2020"}"#);
        let schema = ExtractionSchema::from_pairs([("date", "date of X")]).expect("valid");

        let record = extract(&client(&mock), "m", None, &schema, "THE AFFIDAVIT")
            .await
            .expect("extraction succeeds");

        assert_eq!(record.get("date"), Some("01/01/2020"));
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("date: date of X"));
        assert!(prompt.contains("THE AFFIDAVIT"));
    }

    #[tokio::test]
    async fn test_garbled_completion_is_not_an_error() {
        let mock = MockModelClient::new();
        mock.push_response("Sorry, I cannot help with that.");
        let schema = ExtractionSchema::default();

        let record = extract(&client(&mock), "m", None, &schema, "doc")
            .await
            .expect("parse failure is soft");

        assert!(!record.is_parsed());
        assert_eq!(record.len(), schema.len());
        assert_eq!(record.raw_text(), "Sorry, I cannot help with that.");
    }

    #[tokio::test]
    async fn test_invocation_failure_propagates() {
        let mock = MockModelClient::new();
        mock.push_failure(ModelError::Rejected("denied".into()));
        let schema = ExtractionSchema::default();

        let err = extract(&client(&mock), "m", None, &schema, "doc")
            .await
            .expect_err("invocation failed");
        assert!(matches!(err, PipelineError::Invocation { .. }));
    }

    #[tokio::test]
    async fn test_stage_truncates_affidavit_before_extracting() {
        let mock = MockModelClient::new();
        mock.push_response(r#"{"date": "01/01/2020"}"#);
        let schema = ExtractionSchema::from_pairs([("date", "date of X")]).expect("valid");
        let stage = ExtractionStage::new("extraction", "m", schema).truncate_document(3);
        let session = SessionState::with_documents(
            "instructions".to_string(),
            "alpha beta gamma delta epsilon zeta eta theta".to_string(),
        );

        let output = stage
            .run(&session, &client(&mock))
            .await
            .expect("stage runs");

        match output {
            StageOutput::Record(record) => assert_eq!(record.get("date"), Some("01/01/2020")),
            other => panic!("expected a record, got {other:?}"),
        }
        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("alpha"));
        assert!(!prompt.contains("theta"));
    }

    #[tokio::test]
    async fn test_stage_without_affidavit_fails() {
        let mock = MockModelClient::new();
        let stage = ExtractionStage::new("extraction", "m", ExtractionSchema::default());

        let err = stage
            .run(&SessionState::default(), &client(&mock))
            .await
            .expect_err("no affidavit text");
        assert!(err.to_string().contains("aoh_text"));
        assert!(mock.requests().is_empty());
    }
}
