//! Apiscribe CLI

use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use apiscribe::config::Config;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = &args[1];

    let result = match command.as_str() {
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: apiscribe check <config.toml>");
                process::exit(1);
            }
            check(&PathBuf::from(&args[2]))
        }
        "init" => print_default_config(),
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'apiscribe' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!("Apiscribe v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: apiscribe <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  check <config.toml>   Validate a configuration file");
    eprintln!("  init                  Print the default configuration");
    eprintln!();
    eprintln!("Capture sessions run inside a host that provides the browser.");
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("while checking {}", path.display()))?;

    apiscribe::logging::init(&config.log_level)?;
    tracing::debug!("Loaded configuration from {}", path.display());

    println!("Configuration: {}", path.display());
    println!();
    println!(
        "  Application URL:  {}",
        config.site_url.as_deref().unwrap_or("(prompt at start)")
    );
    println!(
        "  API Base URL:     {}",
        config.api_base_url.as_deref().unwrap_or("(prompt at start)")
    );
    println!(
        "  Browser:          {} {}",
        if config.browser.headless { "headless" } else { "headed" },
        config.browser.args.join(" ")
    );
    println!("  Output file:      {}", config.output.default_file_name);
    println!("  Test name prefix: {}", config.output.test_name_prefix);
    println!(
        "  Body drain:       {} ms, max body {} bytes",
        config.limits.drain_timeout_ms, config.limits.max_body_bytes
    );
    Ok(())
}

fn print_default_config() -> anyhow::Result<()> {
    let rendered =
        toml::to_string_pretty(&Config::default()).context("failed to render default config")?;
    print!("{rendered}");
    Ok(())
}
