use anyhow::{Context, Result};
use clap::Parser;
use powchain_core::{
    constants::{DEFAULT_DIFFICULTY, MAX_PRACTICAL_DIFFICULTY},
    Chain, ChainConfig, Payload,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
    time::Instant,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "powchain")]
#[command(about = "Build a proof-of-work hash chain and check its integrity")]
struct Cli {
    /// Leading zero hex digits required in every block hash
    #[arg(long, default_value_t = DEFAULT_DIFFICULTY)]
    difficulty: usize,

    /// Also re-check proof-of-work when validating
    #[arg(long)]
    strict: bool,

    /// Mine on all cores
    #[arg(long)]
    parallel: bool,

    /// JSON file holding an array of payload objects to append
    #[arg(long)]
    payloads: Option<PathBuf>,
}

fn demo_payloads() -> Vec<Payload> {
    vec![
        Payload::new()
            .with("from", "Alice")
            .with("to", "Bob")
            .with("amount", 5),
        Payload::new()
            .with("from", "John")
            .with("to", "Bob")
            .with("amount", 2),
    ]
}

fn load_payloads(path: &Path) -> Result<Vec<Payload>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read payloads from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of objects", path.display()))
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    let payloads = match &cli.payloads {
        Some(path) => load_payloads(path)?,
        None => demo_payloads(),
    };

    if cli.difficulty > MAX_PRACTICAL_DIFFICULTY {
        warn!(
            "difficulty {} is past what can be mined in reasonable time; this may never finish",
            cli.difficulty
        );
    }

    let mut config = ChainConfig::new(cli.difficulty);
    if cli.strict {
        config = config.strict();
    }
    let mut chain = Chain::with_config(config);

    let cancel = AtomicBool::new(false);
    for (i, payload) in payloads.into_iter().enumerate() {
        let block = if cli.parallel {
            chain.append_parallel(payload, &cancel)
        } else {
            chain.append(payload)
        }
        .with_context(|| format!("failed to append payload #{i}"))?;
        info!("appended block {} after {:?}", block.hash, start.elapsed());
    }

    println!("{}", serde_json::to_string_pretty(&chain)?);
    match chain.validate() {
        Ok(()) => println!("valid: true"),
        Err(err) => {
            println!("valid: false");
            eprintln!("{err}");
        }
    }
    println!("elapsed: {:?}", start.elapsed());
    Ok(())
}
