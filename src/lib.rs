//! AOH Review - prompt-chain review of an Affidavit of Heirship
//!
//! This library chains foundation-model prompts over two documents: an
//! instruction document listing a title insurer's requirements and the
//! affidavit under review. It extracts the requirements, checks the
//! affidavit against them, pulls out key fields, asks fixed compliance
//! questions and summarizes both documents.

#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::future_not_send)] // From Rig framework internals, can't fix
#![allow(clippy::return_self_not_must_use)] // Builder pattern is clear enough

pub mod cli;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod logger;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod qa;
pub mod session;
pub mod stage;
pub mod tokens;

pub use config::Config;
pub use error::{ChainError, ModelError, PipelineError, StageFailure};
pub use extraction::{ExtractedRecord, ExtractionSchema, ExtractionStage, FieldSpec};
pub use llm::{
    InvocationClient, InvocationRequest, InvocationResult, MockModelClient, ModelClient,
    RetryPolicy, SamplingParameters,
};
pub use orchestrator::{Chain, Orchestrator};
pub use pipeline::{ReviewPipeline, ReviewReport, ReviewSettings, standard_chain};
pub use prompt::PromptTemplate;
pub use providers::{Provider, ProviderConfig};
pub use qa::{ComplianceAnswer, ComplianceQuestion};
pub use session::{Phase, SessionState, Slot, StageOutput};
pub use stage::{PipelineStage, PostProcess, PromptStage};
