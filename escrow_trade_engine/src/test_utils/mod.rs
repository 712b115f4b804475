//! Helpers for tests: throwaway SQLite databases and in-memory stand-ins for the ledger oracle and release endpoint.
mod fakes;
pub mod prepare_env;

pub use fakes::{FakeLedger, FakeReleaseEndpoint};
