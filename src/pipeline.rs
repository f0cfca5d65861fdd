//! The standard affidavit review chain.
//!
//! Six stages run in this order:
//!
//! 1. `requirements` pulls the checklist authority's requirements out of the
//!    instruction document.
//! 2. `instruction_summary` summarizes the instruction document.
//! 3. `compliance` applies the requirements to the affidavit.
//! 4. `extraction` pulls the schema fields out of the affidavit.
//! 5. `questions` asks the fixed compliance questions.
//! 6. `document_summary` summarizes the affidavit.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::document::DocumentLoader;
use crate::error::{ChainError, PipelineError};
use crate::extraction::{ExtractedRecord, ExtractionSchema, ExtractionStage};
use crate::llm::{InvocationClient, SamplingParameters};
use crate::log_info;
use crate::orchestrator::{Chain, Orchestrator};
use crate::prompt::library;
use crate::providers::Provider;
use crate::qa::{ComplianceAnswer, ComplianceQuestion, QuestionStage, default_questions};
use crate::session::{Phase, SessionState, Slot};
use crate::stage::{PipelineStage, PostProcess, PromptStage};

/// Output budget for the requirements list, which runs long.
pub const REQUIREMENTS_MAX_TOKENS: u32 = 8192;

pub const DEFAULT_AUTHORITY: &str = "First American";
pub const DEFAULT_CODE: &str = "ATRQ/T137";

/// Everything the standard chain is built from.
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub model_id: String,
    pub sampling: SamplingParameters,
    /// Whose requirements the instruction document sets out.
    pub authority: String,
    /// Requirement code within the instruction document.
    pub code: String,
    pub schema: ExtractionSchema,
    pub questions: Vec<ComplianceQuestion>,
    /// Token budget for any document embedded in a prompt.
    pub max_document_tokens: Option<usize>,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            model_id: Provider::default().default_model().to_string(),
            sampling: SamplingParameters::default(),
            authority: DEFAULT_AUTHORITY.to_string(),
            code: DEFAULT_CODE.to_string(),
            schema: ExtractionSchema::default(),
            questions: default_questions(),
            max_document_tokens: None,
        }
    }
}

impl ReviewSettings {
    /// Apply shared sampling and the document token cap.
    fn prompt_stage(&self, stage: PromptStage) -> PromptStage {
        let stage = stage.params(self.sampling);
        match self.max_document_tokens {
            Some(max) => stage.truncate_inputs(max),
            None => stage,
        }
    }
}

/// Build the six-stage review chain.
pub fn standard_chain(settings: &ReviewSettings) -> Result<Chain, ChainError> {
    let model = settings.model_id.as_str();

    let requirements = settings
        .prompt_stage(
            PromptStage::new("requirements", library::requirements(), Slot::Instructions, model)
                .constant("authority", &settings.authority)
                .constant("code", &settings.code)
                .bind("instruction_text", Slot::InstructionText)
                .postprocess(PostProcess::Trim),
        )
        .params(settings.sampling.with_max_tokens(REQUIREMENTS_MAX_TOKENS));

    let instruction_summary = settings.prompt_stage(
        PromptStage::new(
            "instruction_summary",
            library::summary(),
            Slot::InstructionSummary,
            model,
        )
        .bind("document", Slot::InstructionText)
        .postprocess(PostProcess::StripTag("summary".to_string())),
    );

    let compliance = settings.prompt_stage(
        PromptStage::new(
            "compliance",
            library::compliance(),
            Slot::ComplianceNarrative,
            model,
        )
        .bind("instructions", Slot::Instructions)
        .bind("aoh_text", Slot::AohText)
        .postprocess(PostProcess::StripTag("final_answer".to_string())),
    );

    let mut extraction =
        ExtractionStage::new("extraction", model, settings.schema.clone()).params(settings.sampling);
    if let Some(max) = settings.max_document_tokens {
        extraction = extraction.truncate_document(max);
    }

    let mut questions = QuestionStage::new("questions", model, settings.questions.clone())
        .params(settings.sampling);
    if let Some(max) = settings.max_document_tokens {
        questions = questions.truncate_document(max);
    }

    let document_summary = settings.prompt_stage(
        PromptStage::new(
            "document_summary",
            library::summary(),
            Slot::DocumentSummary,
            model,
        )
        .bind("document", Slot::AohText)
        .postprocess(PostProcess::StripTag("summary".to_string())),
    );

    let stages: Vec<Box<dyn PipelineStage>> = vec![
        Box::new(requirements),
        Box::new(instruction_summary),
        Box::new(compliance),
        Box::new(extraction),
        Box::new(questions),
        Box::new(document_summary),
    ];
    Chain::new(stages)
}

/// Loads both documents and drives a chain over them.
pub struct ReviewPipeline {
    orchestrator: Orchestrator,
    chain: Chain,
    loader: Box<dyn DocumentLoader>,
}

impl ReviewPipeline {
    /// The standard chain over `settings`.
    pub fn new(
        client: InvocationClient,
        settings: &ReviewSettings,
        loader: Box<dyn DocumentLoader>,
    ) -> Result<Self, ChainError> {
        Ok(Self::with_chain(
            Orchestrator::new(client),
            standard_chain(settings)?,
            loader,
        ))
    }

    pub fn with_chain(
        orchestrator: Orchestrator,
        chain: Chain,
        loader: Box<dyn DocumentLoader>,
    ) -> Self {
        Self {
            orchestrator,
            chain,
            loader,
        }
    }

    pub const fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Read both documents into a fresh session.
    pub fn load(&self, instructions: &str, document: &str) -> Result<SessionState, PipelineError> {
        let instruction_text = self.loader.load_text(instructions)?;
        let aoh_text = self.loader.load_text(document)?;
        log_info!(
            "Loaded instructions ({} chars) and affidavit ({} chars)",
            instruction_text.len(),
            aoh_text.len()
        );
        Ok(SessionState::with_documents(instruction_text, aoh_text))
    }

    /// Review `document` against `instructions`.
    ///
    /// Only an unreadable document is an error; stage failures are reported
    /// on the returned report alongside whatever finished before them.
    pub async fn review(
        &self,
        instructions: &str,
        document: &str,
        cancel: &CancellationToken,
    ) -> Result<ReviewReport, PipelineError> {
        let session = self.load(instructions, document)?;
        let session = self
            .orchestrator
            .run_chain_with_cancel(session, &self.chain, cancel)
            .await;
        Ok(ReviewReport::from_session(&session))
    }
}

/// Per-run output handed to the CLI and other consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewReport {
    pub instructions: Option<String>,
    pub instruction_summary: Option<String>,
    pub compliance_narrative: Option<String>,
    pub extracted_record: Option<ExtractedRecord>,
    pub compliance_answers: Vec<ComplianceAnswer>,
    pub document_summary: Option<String>,
    #[serde(flatten)]
    pub outcome: Phase,
}

impl ReviewReport {
    pub fn from_session(session: &SessionState) -> Self {
        Self {
            instructions: session.instructions().map(str::to_string),
            instruction_summary: session.instruction_summary().map(str::to_string),
            compliance_narrative: session.compliance_narrative().map(str::to_string),
            extracted_record: session.extracted_record().cloned(),
            compliance_answers: session.compliance_answers().to_vec(),
            document_summary: session.document_summary().map(str::to_string),
            outcome: session.phase().clone(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == Phase::Done
    }

    /// `(stage, reason)` when the run failed.
    pub fn failure(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            Phase::Failed { stage, reason } => Some((stage, reason)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_chain_order() {
        let chain = standard_chain(&ReviewSettings::default()).expect("valid chain");
        assert_eq!(
            chain.stage_names(),
            vec![
                "requirements",
                "instruction_summary",
                "compliance",
                "extraction",
                "questions",
                "document_summary"
            ]
        );
    }

    #[test]
    fn test_failed_report_serializes_stage_and_reason() {
        let mut session = SessionState::with_documents("i", "a");
        session.fail("extraction", "model invocation failed");
        let report = ReviewReport::from_session(&session);
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["phase"], "failed");
        assert_eq!(json["stage"], "extraction");
        assert_eq!(report.failure(), Some(("extraction", "model invocation failed")));
        assert!(!report.is_complete());
    }
}
