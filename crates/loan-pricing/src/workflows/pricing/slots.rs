use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use super::programs::ProgramDescriptor;
use super::results::ProgramResult;

/// Fixed-position container for one program's eventual result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultSlot {
    Pending { descriptor: ProgramDescriptor },
    Filled { result: ProgramResult },
}

impl ResultSlot {
    pub fn descriptor(&self) -> &ProgramDescriptor {
        match self {
            ResultSlot::Pending { descriptor } => descriptor,
            ResultSlot::Filled { result } => &result.descriptor,
        }
    }

    pub fn result(&self) -> Option<&ProgramResult> {
        match self {
            ResultSlot::Pending { .. } => None,
            ResultSlot::Filled { result } => Some(result),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ResultSlot::Pending { .. })
    }
}

/// Identifies the calculation cycle a write belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleToken(u64);

impl CycleToken {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Published view of the board. Every accepted write replaces `slots` with a new `Arc`.
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub generation: u64,
    pub slots: Arc<[ResultSlot]>,
    allocated: bool,
}

impl BoardSnapshot {
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| !slot.is_pending())
    }
}

/// Why a fill was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FillRejected {
    #[error("write from cycle {write} arrived after cycle {current} started")]
    StaleGeneration { write: u64, current: u64 },
    #[error("slot {index} does not exist ({len} slots)")]
    OutOfRange { index: usize, len: usize },
    #[error("slot {index} already filled")]
    AlreadyFilled { index: usize },
    #[error("slots for cycle {generation} are already allocated")]
    AlreadyAllocated { generation: u64 },
}

/// Single writer for the ordered slot array.
#[derive(Debug)]
pub struct ResultBoard {
    sender: watch::Sender<BoardSnapshot>,
}

impl Default for ResultBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultBoard {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(BoardSnapshot {
            generation: 0,
            slots: Arc::from(Vec::new()),
            allocated: false,
        });
        Self { sender }
    }

    /// Start a new cycle with no slots. Writes carrying an older token are
    /// rejected from here on.
    pub fn begin(&self) -> CycleToken {
        let mut generation = 0;
        self.sender.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.slots = Arc::from(Vec::new());
            snapshot.allocated = false;
            generation = snapshot.generation;
        });
        CycleToken(generation)
    }

    /// Allocate one pending slot per descriptor, in discovery order, for the
    /// cycle `token` started. Ignored when a newer cycle has begun since. Each
    /// cycle allocates exactly once.
    pub fn allocate(
        &self,
        token: CycleToken,
        descriptors: &[ProgramDescriptor],
    ) -> Result<(), FillRejected> {
        let mut outcome = Ok(());
        self.sender.send_if_modified(|snapshot| {
            if snapshot.generation != token.0 {
                outcome = Err(FillRejected::StaleGeneration {
                    write: token.0,
                    current: snapshot.generation,
                });
                return false;
            }
            if snapshot.allocated {
                outcome = Err(FillRejected::AlreadyAllocated {
                    generation: token.0,
                });
                return false;
            }
            let slots: Vec<ResultSlot> = descriptors
                .iter()
                .cloned()
                .map(|descriptor| ResultSlot::Pending { descriptor })
                .collect();
            snapshot.slots = Arc::from(slots);
            snapshot.allocated = true;
            true
        });

        if outcome.is_ok() {
            debug!(
                generation = token.0,
                slots = descriptors.len(),
                "result slots allocated"
            );
        }
        outcome
    }

    /// [`begin`](Self::begin) followed by [`allocate`](Self::allocate).
    pub fn initialize(&self, descriptors: &[ProgramDescriptor]) -> CycleToken {
        let token = self.begin();
        // A concurrent `begin` in between owns the board.
        let _ = self.allocate(token, descriptors);
        token
    }

    /// Write `result` into slot `index`. Slots are write-once per cycle and no
    /// other index is touched.
    pub fn fill(
        &self,
        token: CycleToken,
        index: usize,
        result: ProgramResult,
    ) -> Result<(), FillRejected> {
        let mut outcome = Ok(());
        self.sender.send_if_modified(|snapshot| {
            if snapshot.generation != token.0 {
                outcome = Err(FillRejected::StaleGeneration {
                    write: token.0,
                    current: snapshot.generation,
                });
                return false;
            }
            match snapshot.slots.get(index) {
                None => {
                    outcome = Err(FillRejected::OutOfRange {
                        index,
                        len: snapshot.slots.len(),
                    });
                    return false;
                }
                Some(ResultSlot::Filled { .. }) => {
                    outcome = Err(FillRejected::AlreadyFilled { index });
                    return false;
                }
                Some(ResultSlot::Pending { .. }) => {}
            }

            let mut next: Vec<ResultSlot> = snapshot.slots.to_vec();
            next[index] = ResultSlot::Filled { result };
            snapshot.slots = Arc::from(next);
            true
        });
        outcome
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<BoardSnapshot> {
        self.sender.subscribe()
    }
}
