//! `kvlite`: interactive shell for kvlite collections.

mod config;
mod shell;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use crate::config::{DEFAULT_HISTORY_SIZE, ShellConfig};
use crate::shell::{Flow, Shell};

/// kvlite shell.
#[derive(Parser, Debug)]
#[command(name = "kvlite", version, about = "kvlite collection shell")]
struct Cli {
    /// Path to the collection registry (default: ~/.kvlite/registry.json).
    #[arg(long = "registry")]
    registry: Option<PathBuf>,

    /// Serializer for opened collections: cbor or compressed_json.
    #[arg(long = "serializer", default_value = "cbor")]
    serializer: String,

    /// Number of distinct command lines kept in history.
    #[arg(long = "history-size", default_value_t = DEFAULT_HISTORY_SIZE)]
    history_size: usize,

    /// Run these commands and exit instead of reading stdin.
    #[arg(short = 'c', long = "command")]
    commands: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; command output owns stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ShellConfig::from_args(cli.registry.as_deref(), &cli.serializer, cli.history_size)?;
    let mut shell = Shell::new(config)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if !cli.commands.is_empty() {
        for command in &cli.commands {
            if shell.execute(command, &mut out)? == Flow::Exit {
                break;
            }
        }
        shell.close();
        return Ok(());
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut line = String::new();
    loop {
        write!(out, "{} ", shell.prompt())?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        if shell.execute(&line, &mut out)? == Flow::Exit {
            break;
        }
    }
    shell.close();
    Ok(())
}
