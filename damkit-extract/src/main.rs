//! Raw metadata extraction tool.
//!
//! This binary looks a single record up in a DAM catalog by its record name
//! and writes every populated field as an XML metadata document.
//!
//! # Security Guarantees
//! - Passwords are prompted for without echo when not supplied
//! - No credentials are logged; server locations are redacted

use clap::Parser;
use damkit_core::logging::init_logging;
use damkit_extract::{Cli, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet)?;

    let output = run(&cli, |prompt: &str| rpassword::prompt_password(prompt))?;
    if !cli.quiet {
        println!("Metadata written to {}", output.display());
    }

    Ok(())
}
