//! The `utils` module holds the pieces shared across `topic-manager`:
//! the error types and the log sink setup.

pub mod error;
pub mod logging;
