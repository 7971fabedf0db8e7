//! Funds-movement ledger with OTP-gated confirmation.
//!
//! Every movement follows one path: validate the request, persist it,
//! challenge the caller with a one-time code, and only then apply the
//! debit/credit pair atomically and append the immutable transaction
//! records. Balances are integers in minor currency units and every
//! mutation is serialized per account through an optimistic version check.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
