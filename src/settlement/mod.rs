//! Draw settlement.
//!
//! # Data Flow
//! ```text
//! new block -> Reconciler (pot) -> DrawProcessor
//!   -> for each draw whose seeding block is mined:
//!        block hash -> Stretcher (PBKDF2) -> SettlementEngine::finalize_draw
//!          -> tickets summed, winner picked, bonus split, carry written
//! ```
//!
//! # Design Decisions
//! - The schedule is plain arithmetic over block heights; no state
//! - Stretching happens outside the ledger unit of work so the database
//!   lock is never held across the slow part
//! - Finalization claims the block hash first; a second call for the same
//!   draw always reports `AlreadyFinalized`

pub mod bonus;
pub mod engine;
pub mod processor;
pub mod report;
pub mod schedule;
pub mod selection;
pub mod stretch;

use serde::{Deserialize, Serialize};

use crate::ledger::queries::draws::DrawRow;

pub use bonus::{split_pool, BonusFraction, BonusSplit};
pub use engine::{FinalizeOutcome, SettlementEngine, WinnerResult};
pub use processor::{BlockReport, DrawProcessor};
pub use report::{draw_report, verify_report, DrawReport, Verification};
pub use schedule::DrawSchedule;
pub use selection::{select_winner, ticket_ranges, winning_ticket, TicketEntry, TicketRange};
pub use stretch::Stretcher;

/// Lifecycle of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawState {
    /// Still accepting tickets, or waiting for its seeding block.
    Open,
    /// Seeding block is scanned but the draw is not finalized yet.
    Finalizing,
    Finalized,
    /// Winner has been paid.
    Paid,
}

impl DrawState {
    /// State as far as the row alone tells.
    pub fn of(draw: &DrawRow) -> Self {
        match (&draw.block_hash, &draw.winner_txid) {
            (Some(_), Some(_)) => DrawState::Paid,
            (Some(_), None) => DrawState::Finalized,
            _ => DrawState::Open,
        }
    }

    /// State given the pot's scanned height.
    pub fn at(draw: &DrawRow, schedule: &DrawSchedule, watermark: u64) -> Self {
        match Self::of(draw) {
            DrawState::Open if schedule.hash_height(draw.id) <= watermark => DrawState::Finalizing,
            state => state,
        }
    }
}
