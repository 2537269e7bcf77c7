//! Credit ledger billing engine.
//!
//! This crate turns usage and admin requests into balanced ledger entries:
//!
//! - LLM message, skill call and memory charges with platform, developer and
//!   agent fees
//! - Recharges, rewards, agent withdrawals and manual adjustments
//! - The hourly free credit refill
//! - Paginated event and transaction listings
//!
//! The operation modules ([`accounts`], [`expense`], [`manual`], [`refill`],
//! [`query`]) take an open [`LedgerTx`](credit_ledger_store::LedgerTx) and
//! never commit, so several of them can be composed in one transaction.
//! [`Ledger`] wraps each one in its own transaction.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use credit_ledger_core::{Credits, PaymentSettings, PricingConfig, UserId};
//! use credit_ledger_service::{Ledger, StaticAgentDirectory};
//! use credit_ledger_store::MemoryStore;
//!
//! # async fn demo() -> credit_ledger_core::Result<()> {
//! let ledger = Ledger::new(
//!     Arc::new(MemoryStore::new()),
//!     PaymentSettings::default(),
//!     PricingConfig::default(),
//!     Arc::new(StaticAgentDirectory::new()),
//! );
//! ledger
//!     .recharge(&UserId::new("u1"), Credits::whole(100), "tx-1", None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accounts;
pub mod agents;
pub mod config;
pub mod expense;
pub mod ledger;
pub mod manual;
pub mod query;
pub mod recorder;
pub mod refill;

pub use accounts::Accounts;
pub use agents::{AgentDirectory, StaticAgentDirectory};
pub use config::ServiceConfig;
pub use expense::{MessageCharge, SkillCharge, SkillCost};
pub use ledger::Ledger;
pub use manual::Settlement;
pub use query::{EventFilter, FeedPage, Page, TransactionWithEvent};
pub use refill::RefillReport;
