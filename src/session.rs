//! Per-run session state.
//!
//! A session accumulates stage outputs monotonically: a slot is written once
//! and never overwritten, and the phase only moves forward until it reaches
//! `Done` or `Failed`.

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

use crate::error::PipelineError;
use crate::extraction::ExtractedRecord;
use crate::qa::ComplianceAnswer;
use crate::{log_debug, log_warn};

/// Named places in the session that stages read from and write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Full text of the instruction (checklist) document. Input.
    InstructionText,
    /// Full text of the affidavit under review. Input.
    AohText,
    Instructions,
    InstructionSummary,
    ComplianceNarrative,
    ExtractedRecord,
    ComplianceAnswers,
    DocumentSummary,
}

impl Slot {
    /// Slots filled by document loading rather than by a stage.
    pub const fn is_input(self) -> bool {
        matches!(self, Self::InstructionText | Self::AohText)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::InstructionText => "instruction_text",
            Self::AohText => "aoh_text",
            Self::Instructions => "instructions",
            Self::InstructionSummary => "instruction_summary",
            Self::ComplianceNarrative => "compliance_narrative",
            Self::ExtractedRecord => "extracted_record",
            Self::ComplianceAnswers => "compliance_answers",
            Self::DocumentSummary => "document_summary",
        }
    }

    /// The phase reached once this slot is merged, if it marks one.
    const fn milestone(self) -> Option<Phase> {
        match self {
            Self::Instructions => Some(Phase::InstructionsExtracted),
            Self::ExtractedRecord => Some(Phase::FieldsExtracted),
            Self::ComplianceAnswers => Some(Phase::ComplianceEvaluated),
            Self::DocumentSummary => Some(Phase::Summarized),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a session is in the review.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    DocumentLoaded,
    InstructionsExtracted,
    FieldsExtracted,
    ComplianceEvaluated,
    Summarized,
    Done,
    Failed { stage: String, reason: String },
}

impl Phase {
    const fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::DocumentLoaded => 1,
            Self::InstructionsExtracted => 2,
            Self::FieldsExtracted => 3,
            Self::ComplianceEvaluated => 4,
            Self::Summarized => 5,
            Self::Done | Self::Failed { .. } => 6,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::DocumentLoaded => f.write_str("document loaded"),
            Self::InstructionsExtracted => f.write_str("instructions extracted"),
            Self::FieldsExtracted => f.write_str("fields extracted"),
            Self::ComplianceEvaluated => f.write_str("compliance evaluated"),
            Self::Summarized => f.write_str("summarized"),
            Self::Done => f.write_str("done"),
            Self::Failed { stage, reason } => write!(f, "failed in '{stage}': {reason}"),
        }
    }
}

/// What a stage hands back for the orchestrator to merge.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Text { slot: Slot, text: String },
    Record(ExtractedRecord),
    Answers(Vec<ComplianceAnswer>),
}

impl StageOutput {
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Text { slot, .. } => *slot,
            Self::Record(_) => Slot::ExtractedRecord,
            Self::Answers(_) => Slot::ComplianceAnswers,
        }
    }
}

/// State of one document-analysis run.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    instruction_text: Option<String>,
    aoh_text: Option<String>,
    instructions: Option<String>,
    instruction_summary: Option<String>,
    compliance_narrative: Option<String>,
    extracted_record: Option<ExtractedRecord>,
    compliance_answers: Option<Vec<ComplianceAnswer>>,
    document_summary: Option<String>,
    phase: Phase,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept both documents for analysis.
    pub fn with_documents(
        instruction_text: impl Into<String>,
        aoh_text: impl Into<String>,
    ) -> Self {
        Self {
            instruction_text: Some(instruction_text.into()),
            aoh_text: Some(aoh_text.into()),
            phase: Phase::DocumentLoaded,
            ..Self::default()
        }
    }

    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    pub const fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// `(stage, reason)` when the session failed.
    pub fn failure(&self) -> Option<(&str, &str)> {
        match &self.phase {
            Phase::Failed { stage, reason } => Some((stage, reason)),
            _ => None,
        }
    }

    pub fn instruction_text(&self) -> Option<&str> {
        self.instruction_text.as_deref()
    }

    pub fn aoh_text(&self) -> Option<&str> {
        self.aoh_text.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn instruction_summary(&self) -> Option<&str> {
        self.instruction_summary.as_deref()
    }

    pub fn compliance_narrative(&self) -> Option<&str> {
        self.compliance_narrative.as_deref()
    }

    pub const fn extracted_record(&self) -> Option<&ExtractedRecord> {
        self.extracted_record.as_ref()
    }

    pub fn compliance_answers(&self) -> &[ComplianceAnswer] {
        self.compliance_answers.as_deref().unwrap_or_default()
    }

    pub fn document_summary(&self) -> Option<&str> {
        self.document_summary.as_deref()
    }

    pub fn has(&self, slot: Slot) -> bool {
        match slot {
            Slot::ExtractedRecord => self.extracted_record.is_some(),
            Slot::ComplianceAnswers => self.compliance_answers.is_some(),
            _ => self.text_slot(slot).is_some(),
        }
    }

    /// Text view of a slot, for binding into prompts.
    pub fn slot_text(&self, slot: Slot) -> Option<Cow<'_, str>> {
        match slot {
            Slot::ExtractedRecord => self
                .extracted_record
                .as_ref()
                .map(|r| Cow::Owned(r.to_prompt_text())),
            Slot::ComplianceAnswers => self.compliance_answers.as_ref().map(|answers| {
                Cow::Owned(
                    answers
                        .iter()
                        .map(|a| a.raw_text.trim())
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                )
            }),
            _ => self.text_slot(slot).map(Cow::Borrowed),
        }
    }

    fn text_slot(&self, slot: Slot) -> Option<&str> {
        match slot {
            Slot::InstructionText => self.instruction_text.as_deref(),
            Slot::AohText => self.aoh_text.as_deref(),
            Slot::Instructions => self.instructions.as_deref(),
            Slot::InstructionSummary => self.instruction_summary.as_deref(),
            Slot::ComplianceNarrative => self.compliance_narrative.as_deref(),
            Slot::DocumentSummary => self.document_summary.as_deref(),
            Slot::ExtractedRecord | Slot::ComplianceAnswers => None,
        }
    }

    fn text_slot_mut(&mut self, slot: Slot) -> Option<&mut Option<String>> {
        match slot {
            Slot::InstructionText => Some(&mut self.instruction_text),
            Slot::AohText => Some(&mut self.aoh_text),
            Slot::Instructions => Some(&mut self.instructions),
            Slot::InstructionSummary => Some(&mut self.instruction_summary),
            Slot::ComplianceNarrative => Some(&mut self.compliance_narrative),
            Slot::DocumentSummary => Some(&mut self.document_summary),
            Slot::ExtractedRecord | Slot::ComplianceAnswers => None,
        }
    }

    /// Merge a stage result. Fails if the slot already holds a value.
    pub fn merge(&mut self, output: StageOutput) -> Result<(), PipelineError> {
        let slot = output.slot();
        if self.has(slot) {
            return Err(PipelineError::SlotOccupied(slot));
        }

        match output {
            StageOutput::Text { slot, text } => {
                let target = self
                    .text_slot_mut(slot)
                    .ok_or(PipelineError::SlotMismatch(slot))?;
                *target = Some(text);
            }
            StageOutput::Record(record) => self.extracted_record = Some(record),
            StageOutput::Answers(answers) => self.compliance_answers = Some(answers),
        }
        log_debug!("Merged '{}' into session", slot);

        if let Some(milestone) = slot.milestone() {
            self.advance(milestone);
        }
        Ok(())
    }

    fn advance(&mut self, next: Phase) {
        if self.phase.is_terminal() || next.rank() <= self.phase.rank() {
            return;
        }
        log_debug!("Session phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Mark the session failed. Earlier results stay in place.
    pub fn fail(&mut self, stage: impl Into<String>, reason: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        let stage = stage.into();
        let reason = reason.into();
        log_warn!("Session failed in stage '{}': {}", stage, reason);
        self.phase = Phase::Failed { stage, reason };
    }

    /// Mark the session complete unless it already failed.
    pub fn finish(&mut self) {
        if !self.phase.is_terminal() {
            log_debug!("Session phase: {} -> done", self.phase);
            self.phase = Phase::Done;
        }
    }
}
