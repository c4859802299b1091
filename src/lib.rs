//! Apiscribe - capture browser API traffic and generate Playwright API tests
//!
//! A capture session drives a browser through an injected capability, records
//! every XHR/fetch call under an API base URL, matches responses back to their
//! requests, and turns the log into a Playwright test script when it stops.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod script;
pub mod session;

pub use error::{ApiscribeError, Result};
