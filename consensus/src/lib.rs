//! CometBFT Consensus Integration
//!
//! Adapts the ledger pipeline to CometBFT through ABCI for Byzantine Fault
//! Tolerant consensus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 CometBFT Network                     │
//! │         (Byzantine Fault Tolerant)                   │
//! │   Validator 1 | Validator 2 | Validator 3           │
//! └────────────────────┬────────────────────────────────┘
//!                      │ Consensus (2/3 majority)
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              ABCI Application                        │
//! │  InitChain → BeginBlock → DeliverTx* → EndBlock     │
//! │              → Commit                                │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//!                      ↓
//! ┌─────────────────────────────────────────────────────┐
//! │              Chain Core                              │
//! │  Gas settlement + inflation + deterministic digest  │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # System transactions
//!
//! Genesis bootstrap and inflation application are not user-submitted:
//! every node regenerates them deterministically from committed state, the
//! current proposer pushes them into the mempool over RPC with supervised
//! retry, and delivery through a block clears them on all nodes.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod abci;
pub mod config;
pub mod error;
pub mod relay;
pub mod state;

// Re-exports
pub use abci::ChainApp;
pub use config::Config;
pub use error::{Error, Result};
pub use relay::{HttpRelay, RetryBroadcaster, TxRelay};
pub use state::NodeState;
