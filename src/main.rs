use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::info;

use yugen::{api, config, Engine};

/// Serve data-engine requests over stdin/stdout, one JSON object per line.
#[derive(Debug, Parser)]
#[command(name = "yugen", version, about)]
struct Args {
    /// TOML config file (defaults to ./yugen.toml when present).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = config::load_config(args.config.as_deref()).context("loading configuration")?;
    let engine = Engine::new(config);
    info!("Yugen startup");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = api::handle_line(&engine, &line);
        serde_json::to_writer(&mut stdout, &response).context("writing response")?;
        writeln!(stdout).context("writing response")?;
        stdout.flush().context("flushing response")?;
    }

    Ok(())
}
