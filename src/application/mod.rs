//! Application layer: the ledger engine, the OTP challenge manager, and the
//! orchestrator that composes them into the public funds-movement API.

pub mod engine;
pub mod fees;
pub mod orchestrator;
pub mod otp;
