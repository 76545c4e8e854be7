//! Budget module - cost tracking and model pricing.
//!
//! # Key Concepts
//! - Tracker: reserve/record/release ledger against a soft and a hard ceiling
//! - Pricing: the model catalog, pricing tiers and per-call cost arithmetic
//!
//! A single [`BudgetTracker`] is created per benchmark and shared across every
//! concurrent model call. It is the only mutable state touched concurrently.

mod tracker;
pub mod pricing;

pub use tracker::{BudgetError, BudgetResult, BudgetSummary, BudgetTracker, ReservationId};
pub use pricing::{ModelCandidate, ModelCatalog, PricingTier};
