//! Halcyon Chain Core
//!
//! Deterministic ledger pipeline and the native gas/fee settlement and
//! inflation-distribution engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              Consensus Adapter (ABCI)                │
//! │  InitChain → BeginBlock → DeliverTx* → EndBlock     │
//! │              → Commit                                │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Ledger Pipeline (this crate)            │
//! │  escrow gas → execute payload → settle gas          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │   Token book / organizations / staking (in-memory)   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - Deterministic replay: same delivered transactions → same state digest
//! - Fee conservation: burn + beneficiary + validator payments == gas charged
//! - Single writer: all ledger mutation is strictly ordered per height
//! - At most one outstanding gas escrow per payer

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod chain;
pub mod error;
pub mod gas;
pub mod metrics;
pub mod runtime;
pub mod tokens;
pub mod types;

// Re-exports
pub use chain::{Chain, LedgerChain};
pub use error::{Error, Result};
pub use gas::GasEngine;
pub use runtime::{OrgView, Runtime};
pub use types::{
    Address, CodeType, Event, EventData, EventKind, Timestamp, Transaction, TxHash, TxPayload,
    TxResult, ValidatorUpdate,
};
