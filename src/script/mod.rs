//! Test script generation

mod generator;
pub mod literal;

pub use generator::{generate, ScriptGenerator};

/// Import line for Playwright Test
pub const PLAYWRIGHT_IMPORT: &str = "const { test, expect } = require('@playwright/test');";

/// Script generation options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    /// Prefix of every test name; the 1-based sequence number follows it
    pub test_name_prefix: String,
    /// Start non-empty scripts with [`PLAYWRIGHT_IMPORT`]
    pub preamble: bool,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            test_name_prefix: "API Test Case".to_string(),
            preamble: false,
        }
    }
}
