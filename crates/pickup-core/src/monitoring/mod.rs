//! Background monitoring tasks.
//!
//! The expiry reaper sweeps pending orders whose pickup window has closed.

pub mod expiry;

pub use expiry::{ExpiryReaper, SweepReport};
