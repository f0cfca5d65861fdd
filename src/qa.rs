//! Fixed compliance questions asked of the affidavit.
//!
//! Each question is an independent invocation; answers come back in question
//! order and are kept free-form.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::llm::{InvocationClient, InvocationRequest, SamplingParameters};
use crate::prompt::{bindings, library};
use crate::session::{SessionState, Slot, StageOutput};
use crate::stage::PipelineStage;
use crate::tokens::truncate_to_tokens;
use crate::{log_debug, log_info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplianceQuestion {
    pub text: String,
}

impl ComplianceQuestion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// The model's verbatim answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComplianceAnswer {
    pub question: String,
    pub raw_text: String,
}

/// Elements every Affidavit of Heirship must carry.
pub fn default_questions() -> Vec<ComplianceQuestion> {
    [
        "Does the document include a statement that there are no unpaid debts of the estate, including estate taxes?",
        "Does the document include a statement that there has not been any administration or probate opened with respect to the decedent's estate and none is anticipated or necessary?",
        "Is the document sworn and does it contain a proper jurat (not an acknowledgement)?",
        "Does the document include signatures of at least two disinterested parties having personal knowledge of the family history of the decedent and having personally known the decedent for at least ten years?",
    ]
    .into_iter()
    .map(ComplianceQuestion::new)
    .collect()
}

/// Ask each question against `document_text`, one call per question.
pub async fn ask(
    client: &InvocationClient,
    model_id: &str,
    params: Option<SamplingParameters>,
    questions: &[ComplianceQuestion],
    document_text: &str,
) -> Result<Vec<ComplianceAnswer>, PipelineError> {
    let template = library::question();
    let mut answers = Vec::with_capacity(questions.len());
    for (index, question) in questions.iter().enumerate() {
        log_debug!("Asking compliance question {}/{}", index + 1, questions.len());
        let prompt = template.render(&bindings([
            ("question", question.text.as_str()),
            ("aoh_text", document_text),
        ]))?;
        let request = InvocationRequest::new(model_id, prompt, params);
        let result = client.invoke(&request).await?;
        answers.push(ComplianceAnswer {
            question: question.text.clone(),
            raw_text: result.text,
        });
    }
    Ok(answers)
}

/// Runs the question set against the affidavit text.
#[derive(Debug, Clone)]
pub struct QuestionStage {
    name: String,
    model_id: String,
    params: Option<SamplingParameters>,
    questions: Vec<ComplianceQuestion>,
    max_document_tokens: Option<usize>,
}

impl QuestionStage {
    pub fn new(
        name: impl Into<String>,
        model_id: impl Into<String>,
        questions: Vec<ComplianceQuestion>,
    ) -> Self {
        Self {
            name: name.into(),
            model_id: model_id.into(),
            params: None,
            questions,
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

    pub fn questions(&self) -> &[ComplianceQuestion] {
        &self.questions
    }
}

#[async_trait]
impl PipelineStage for QuestionStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn produces(&self) -> Slot {
        Slot::ComplianceAnswers
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
        log_info!("Asking {} compliance question(s)", self.questions.len());
        let answers = ask(
            client,
            &self.model_id,
            self.params,
            &self.questions,
            &document,
        )
        .await?;
        Ok(StageOutput::Answers(answers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, RetryPolicy};
    use std::sync::Arc;

    fn client(mock: &MockModelClient) -> InvocationClient {
        InvocationClient::new(Arc::new(mock.clone()), RetryPolicy::immediate(1))
    }

    #[test]
    fn test_default_questions() {
        let questions = default_questions();
        assert_eq!(questions.len(), 4);
        assert!(questions[2].text.contains("jurat"));
    }

    #[tokio::test]
    async fn test_one_call_per_question_in_order() {
        let mock = MockModelClient::with_responder(|req| {
            Ok(if req.prompt.contains("first?") {
                "Yes, paragraph 1".to_string()
            } else {
                "No".to_string()
            })
        });
        let questions = vec![
            ComplianceQuestion::new("first?"),
            ComplianceQuestion::new("second?"),
        ];

        let answers = ask(&client(&mock), "m", None, &questions, "AOH TEXT")
            .await
            .expect("answers");

        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].raw_text, "Yes, paragraph 1");
        assert_eq!(answers[1].raw_text, "No");
        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts.iter().all(|p| p.contains("AOH TEXT")));
        assert!(!prompts[1].contains("first?"));
    }

    #[tokio::test]
    async fn test_stage_needs_affidavit_text() {
        let mock = MockModelClient::new();
        let stage = QuestionStage::new("questions", "m", default_questions());
        let err = stage
            .run(&SessionState::new(), &client(&mock))
            .await
            .expect_err("no affidavit loaded");
        assert!(matches!(err, PipelineError::MissingVariable(_)));
        assert!(mock.requests().is_empty());
    }
}
