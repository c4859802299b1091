//! Capture session orchestration
//!
//! A [`SessionController`] moves between `Idle` and `Capturing`. While
//! capturing it owns one browser, feeds page events through the interceptor and
//! correlator, and on stop turns the exchange log into a saved script.

mod controller;
mod event_loop;
mod prompt;

pub use controller::{SessionController, SessionState, StopReport};
pub use prompt::{DestinationPrompt, FixedDestination};
