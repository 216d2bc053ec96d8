use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::payload::CanonicalPayload;
use super::programs::ProgramDescriptor;
use super::results::{ProgramResponse, ProgramResult};
use super::slots::{CycleToken, ResultBoard};

/// Failure talking to a remote collaborator. Never surfaced per program.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote returned status {0}")]
    Status(u16),
    #[error("unreadable response: {0}")]
    Decode(String),
}

/// Remote pricing programs. One call per program per cycle.
#[async_trait]
pub trait PricingGateway: Send + Sync {
    async fn price(
        &self,
        program: &ProgramDescriptor,
        payload: &Value,
    ) -> Result<ProgramResponse, GatewayError>;
}

/// Per-cycle tally. Failed and malformed programs stay pending on the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub requested: usize,
    pub filled: usize,
    pub failed: usize,
    pub rejected: usize,
}

enum SlotOutcome {
    Filled,
    Failed,
    Rejected,
}

/// Keeps the dispatching count accurate even if the dispatch future is dropped.
struct ActiveDispatch<'a>(&'a AtomicUsize);

impl<'a> ActiveDispatch<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveDispatch<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Fans one payload out to every discovered program concurrently.
pub struct Dispatcher {
    gateway: Arc<dyn PricingGateway>,
    active: AtomicUsize,
}

impl Dispatcher {
    pub fn new(gateway: Arc<dyn PricingGateway>) -> Self {
        Self {
            gateway,
            active: AtomicUsize::new(0),
        }
    }

    /// True while any dispatch, current or superseded, still has calls outstanding.
    pub fn is_dispatching(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Price `payload` against every program and write each success into its
    /// own slot. Resolves once every call has settled.
    pub async fn dispatch(
        &self,
        board: &ResultBoard,
        token: CycleToken,
        programs: &[ProgramDescriptor],
        payload: &CanonicalPayload,
    ) -> DispatchReport {
        let _active = ActiveDispatch::enter(&self.active);
        let wire = payload.to_wire();

        let calls = programs.iter().enumerate().map(|(index, program)| {
            let gateway = Arc::clone(&self.gateway);
            let wire = &wire;
            async move {
                let program_id = program.identity();
                let response = match gateway.price(program, wire).await {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(program = program_id, index, error = %err, "pricing call failed");
                        return SlotOutcome::Failed;
                    }
                };

                let result = match ProgramResult::from_response(program.clone(), response) {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(program = program_id, index, error = %err, "malformed pricing response");
                        return SlotOutcome::Failed;
                    }
                };

                match board.fill(token, index, result) {
                    Ok(()) => {
                        debug!(program = program_id, index, "slot filled");
                        SlotOutcome::Filled
                    }
                    Err(reason) => {
                        debug!(program = program_id, index, %reason, "slot write rejected");
                        SlotOutcome::Rejected
                    }
                }
            }
        });

        let outcomes = join_all(calls).await;

        let mut report = DispatchReport {
            requested: programs.len(),
            ..DispatchReport::default()
        };
        for outcome in outcomes {
            match outcome {
                SlotOutcome::Filled => report.filled += 1,
                SlotOutcome::Failed => report.failed += 1,
                SlotOutcome::Rejected => report.rejected += 1,
            }
        }

        info!(
            generation = token.generation(),
            requested = report.requested,
            filled = report.filled,
            failed = report.failed,
            rejected = report.rejected,
            "dispatch settled"
        );
        report
    }
}
