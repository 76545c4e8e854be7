//! Reservation-based cost tracking with soft and hard ceilings.
//!
//! Every paid call goes through three steps:
//! 1. Before the call: `reserve(estimated_cost)` holds budget
//! 2. After the call: `record(id, actual_cost)` converts the hold into spend
//! 3. On failure: `release(id)` frees the hold
//!
//! Two ceilings:
//! - Soft ceiling: gates new reservations (`can_afford`, `reserve`)
//! - Hard ceiling: confirmed spend at or above it means the benchmark must abort

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BudgetError {
    #[error("Cannot reserve ${requested:.4}: only ${remaining:.4} remaining")]
    BudgetExceeded { requested: f64, remaining: f64 },

    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    #[error("Invalid reservation amount: {0}")]
    InvalidAmount(f64),
}

pub type BudgetResult<T> = Result<T, BudgetError>;

/// Opaque token for a live reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the tracker state. `ceiling` is the soft ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetSummary {
    pub spent: f64,
    pub reserved: f64,
    pub remaining: f64,
    pub ceiling: f64,
}

#[derive(Debug, Default)]
struct Ledger {
    spent: f64,
    reservations: HashMap<ReservationId, f64>,
}

impl Ledger {
    fn reserved(&self) -> f64 {
        self.reservations.values().sum()
    }

    fn remaining(&self, soft_ceiling: f64) -> f64 {
        soft_ceiling - self.spent - self.reserved()
    }
}

/// Thread-safe budget tracker for one benchmark run.
///
/// All operations take the same lock, so the check in `reserve` and the insert
/// of the new reservation happen as one step. Two concurrent reservations can
/// never jointly push `spent + reserved` past the soft ceiling.
#[derive(Debug)]
pub struct BudgetTracker {
    ledger: Mutex<Ledger>,
    soft_ceiling: f64,
    hard_ceiling: f64,
}

impl BudgetTracker {
    /// Create a tracker whose hard ceiling equals the soft ceiling.
    pub fn new(soft_ceiling: f64) -> Self {
        Self::with_hard_ceiling(soft_ceiling, soft_ceiling)
    }

    pub fn with_hard_ceiling(soft_ceiling: f64, hard_ceiling: f64) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            soft_ceiling,
            hard_ceiling,
        }
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // The ledger holds plain numbers; a panic elsewhere cannot leave it half-written.
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve an estimated cost before making a call.
    ///
    /// Negative and non-finite amounts are refused with `InvalidAmount`.
    pub fn reserve(&self, estimated_cost: f64) -> BudgetResult<ReservationId> {
        if !estimated_cost.is_finite() || estimated_cost < 0.0 {
            return Err(BudgetError::InvalidAmount(estimated_cost));
        }
        let mut ledger = self.ledger();
        let remaining = ledger.remaining(self.soft_ceiling);
        if estimated_cost > remaining {
            return Err(BudgetError::BudgetExceeded {
                requested: estimated_cost,
                remaining,
            });
        }

        let id = ReservationId::new();
        ledger.reservations.insert(id, estimated_cost);
        tracing::debug!(
            "Reserved ${:.6} ({}), ${:.6} remaining",
            estimated_cost,
            id,
            remaining - estimated_cost
        );
        Ok(id)
    }

    /// Replace a reservation with the actual cost of the call.
    ///
    /// The actual cost may differ from the estimate.
    pub fn record(&self, id: ReservationId, actual_cost: f64) -> BudgetResult<()> {
        let mut ledger = self.ledger();
        if ledger.reservations.remove(&id).is_none() {
            return Err(BudgetError::UnknownReservation(id));
        }
        ledger.spent += actual_cost;
        Ok(())
    }

    /// Release an unused reservation (e.g. the call failed).
    pub fn release(&self, id: ReservationId) -> BudgetResult<()> {
        let mut ledger = self.ledger();
        if ledger.reservations.remove(&id).is_none() {
            return Err(BudgetError::UnknownReservation(id));
        }
        Ok(())
    }

    pub fn can_afford(&self, estimated_cost: f64) -> bool {
        estimated_cost <= self.ledger().remaining(self.soft_ceiling)
    }

    /// True once confirmed spend reaches the hard ceiling.
    ///
    /// Independent of `can_afford`: the soft ceiling may be exhausted while the
    /// benchmark is not yet required to abort.
    pub fn should_abort(&self) -> bool {
        self.ledger().spent >= self.hard_ceiling
    }

    pub fn spent(&self) -> f64 {
        self.ledger().spent
    }

    pub fn reserved(&self) -> f64 {
        self.ledger().reserved()
    }

    /// Soft ceiling minus spent and reserved.
    pub fn remaining(&self) -> f64 {
        self.ledger().remaining(self.soft_ceiling)
    }

    /// Number of reservations not yet recorded or released.
    pub fn live_reservations(&self) -> usize {
        self.ledger().reservations.len()
    }

    pub fn soft_ceiling(&self) -> f64 {
        self.soft_ceiling
    }

    pub fn hard_ceiling(&self) -> f64 {
        self.hard_ceiling
    }

    pub fn summary(&self) -> BudgetSummary {
        let ledger = self.ledger();
        BudgetSummary {
            spent: ledger.spent,
            reserved: ledger.reserved(),
            remaining: ledger.remaining(self.soft_ceiling),
            ceiling: self.soft_ceiling,
        }
    }
}
