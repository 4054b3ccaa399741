//! selfheal library crate
//!
//! Runs a script, and when it fails, asks a remote code model for a corrected
//! version, writes it over the script and runs it again to verify.

pub mod config;
pub mod error;
pub mod executor;
pub mod fixer;
pub mod heal;
pub mod logging;
pub mod util;

pub use error::{HealError, RemoteServiceError};
pub use heal::{run, HealOutcome, HealRequest};
