//! Chain assembly and execution.

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{ChainError, PipelineError, StageFailure};
use crate::llm::InvocationClient;
use crate::session::{SessionState, Slot};
use crate::stage::PipelineStage;
use crate::{log_debug, log_error, log_info, log_warn};

/// An ordered list of stages whose data-flow edges have been checked.
///
/// Every slot a stage reads is either a document input or produced by an
/// earlier stage, and each slot has at most one producer.
pub struct Chain {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Result<Self, ChainError> {
        let mut producers: HashMap<Slot, &str> = HashMap::new();

        for stage in &stages {
            for slot in stage.depends_on() {
                if !slot.is_input() && !producers.contains_key(&slot) {
                    return Err(ChainError::UnsatisfiedDependency {
                        stage: stage.name().to_string(),
                        slot,
                    });
                }
            }

            let slot = stage.produces();
            if slot.is_input() {
                return Err(ChainError::ProducesInput {
                    stage: stage.name().to_string(),
                    slot,
                });
            }
            if let Some(first) = producers.insert(slot, stage.name()) {
                return Err(ChainError::DuplicateProducer {
                    slot,
                    first: first.to_string(),
                    second: stage.name().to_string(),
                });
            }
        }

        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    fn stages(&self) -> &[Box<dyn PipelineStage>] {
        &self.stages
    }
}

/// Runs chains against sessions with an injected invocation client.
#[derive(Clone)]
pub struct Orchestrator {
    client: InvocationClient,
}

impl Orchestrator {
    pub const fn new(client: InvocationClient) -> Self {
        Self { client }
    }

    pub const fn client(&self) -> &InvocationClient {
        &self.client
    }

    /// Run every stage once, in order, merging each result before the next starts.
    ///
    /// The first failing stage moves the session to `Failed`; results merged
    /// before it stay visible.
    pub async fn run_chain(&self, session: SessionState, chain: &Chain) -> SessionState {
        self.run_chain_with_cancel(session, chain, &CancellationToken::new())
            .await
    }

    /// Like [`Orchestrator::run_chain`], abandoning the session as failed
    /// once `cancel` fires.
    pub async fn run_chain_with_cancel(
        &self,
        mut session: SessionState,
        chain: &Chain,
        cancel: &CancellationToken,
    ) -> SessionState {
        if session.is_terminal() {
            log_warn!("Refusing to run a chain on a finished session ({})", session.phase());
            return session;
        }

        log_info!("Running chain of {} stage(s)", chain.len());
        for stage in chain.stages() {
            let name = stage.name();
            if cancel.is_cancelled() {
                session.fail(name, PipelineError::Cancelled.to_string());
                return session;
            }

            log_info!("Stage '{}' started", name);
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(PipelineError::Cancelled),
                result = stage
                    .run(&session, &self.client)
                    .instrument(tracing::info_span!("stage", name)) => result,
            };

            if let Err(source) = outcome.and_then(|output| session.merge(output)) {
                let failure = StageFailure {
                    stage: name.to_string(),
                    source,
                };
                log_error!("{}", failure);
                session.fail(name, failure.source.to_string());
                return session;
            }
            log_debug!("Stage '{}' finished, session is {}", name, session.phase());
        }

        session.finish();
        log_info!("Chain finished");
        session
    }
}
