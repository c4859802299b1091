//! Playwright test generation from captured exchanges

use std::fmt;

use serde_json::Value;

use crate::capture::{CapturedExchange, CapturedResponse};

use super::literal;
use super::{GeneratorOptions, PLAYWRIGHT_IMPORT};

/// Methods with a dedicated helper on Playwright's `APIRequestContext`
const VERB_HELPERS: [&str; 6] = ["get", "post", "put", "patch", "delete", "head"];

/// Indentation of the request options object
const OPTIONS_INDENT: &str = "    ";

/// Turns an exchange log into Playwright test source
#[derive(Debug, Clone, Default)]
pub struct ScriptGenerator {
    options: GeneratorOptions,
}

impl ScriptGenerator {
    /// Generator with default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator with explicit options
    #[must_use]
    pub fn with_options(options: GeneratorOptions) -> Self {
        Self { options }
    }

    /// Generate one test per exchange, in order, separated by blank lines
    ///
    /// An empty log produces an empty string.
    #[must_use]
    pub fn generate(&self, exchanges: &[CapturedExchange]) -> String {
        let blocks: Vec<String> = exchanges
            .iter()
            .enumerate()
            .map(|(index, exchange)| self.test_block(index + 1, exchange))
            .collect();

        if blocks.is_empty() {
            return String::new();
        }

        let body = blocks.join("\n\n");
        if self.options.preamble {
            format!("{PLAYWRIGHT_IMPORT}\n\n{body}")
        } else {
            body
        }
    }

    /// Render the test for the exchange at 1-based position `sequence`
    #[must_use]
    pub fn test_block(&self, sequence: usize, exchange: &CapturedExchange) -> String {
        TestBlock {
            name: format!("{} {}", self.options.test_name_prefix, sequence),
            exchange,
        }
        .to_string()
    }
}

/// One `test(...)` call for a single exchange
struct TestBlock<'a> {
    name: String,
    exchange: &'a CapturedExchange,
}

impl fmt::Display for TestBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exchange = self.exchange;
        let method = exchange.method().to_ascii_lowercase();
        let url = literal::string(exchange.url());

        writeln!(
            f,
            "test({}, async ({{ request }}) => {{",
            literal::string(&self.name)
        )?;

        if VERB_HELPERS.contains(&method.as_str()) {
            writeln!(f, "  const response = await request.{method}({url}, {{")?;
        } else {
            writeln!(f, "  const response = await request.fetch({url}, {{")?;
            writeln!(
                f,
                "{OPTIONS_INDENT}method: {},",
                literal::string(exchange.method())
            )?;
        }

        writeln!(
            f,
            "{OPTIONS_INDENT}headers: {},",
            literal::indent_tail(&literal::headers(exchange.request_headers()), OPTIONS_INDENT)
        )?;
        writeln!(
            f,
            "{OPTIONS_INDENT}data: {},",
            literal::optional_string(exchange.request_body())
        )?;
        writeln!(f, "  }});")?;

        if let Some(response) = exchange.response() {
            write_assertions(f, response)?;
        }

        write!(f, "}});")
    }
}

/// Status assertion plus a body check when the body has usable content
fn write_assertions(f: &mut fmt::Formatter<'_>, response: &CapturedResponse) -> fmt::Result {
    writeln!(f, "  expect(response.status()).toBe({});", response.status)?;

    let Some(text) = response.body.as_text() else {
        return Ok(());
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => writeln!(
            f,
            "  expect(await response.json()).toEqual(expect.objectContaining({}));",
            literal::indent_tail(&literal::pretty(&value), "  ")
        ),
        Ok(value) => writeln!(
            f,
            "  expect(await response.json()).toEqual({});",
            literal::indent_tail(&literal::pretty(&value), "  ")
        ),
        Err(_) => writeln!(
            f,
            "  expect(await response.text()).toBe({});",
            literal::string(text)
        ),
    }
}

/// Generate a script with default options
#[must_use]
pub fn generate(exchanges: &[CapturedExchange]) -> String {
    ScriptGenerator::new().generate(exchanges)
}
