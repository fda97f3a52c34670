//! Credit ledger
//!
//! Every send attempt that reaches the gateway is paid for by exactly one
//! debit; a gateway failure produces exactly one matching refund referencing
//! the same work item. Mutations run in a storage transaction with the
//! balance row locked, so per-user movements are linearizable while other
//! users stay unblocked.

#![forbid(unsafe_code)]

pub mod error;
pub mod ledger;
pub mod types;

pub use error::{LedgerError, Result};
pub use ledger::CreditLedger;
pub use types::{DebitOutcome, TransactionType};
