//! Transport adapters exposing the orchestrator to callers.

pub mod http;
