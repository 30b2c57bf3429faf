use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context};
use rentwatch_rs::config::{ConfigOverrides, PipelineOverrides, PublishOverrides};
use rentwatch_rs::normalize::RawRow;
use rentwatch_rs::{
    profile, MemoryServingStore, PersistentServingStore, RawSnapshot, Rentwatch, RentwatchConfig,
    ScoringProfile, ServingStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    println!(
        r#"rentwatch_batch - resolve owners and score NYC buildings

USAGE:
    rentwatch_batch --input <DIR> [OPTIONS]

OPTIONS:
    -i, --input <DIR>        Directory with buildings.json, violations.json,
                             complaints.json, evictions.json, registrations.json
    -c, --config <FILE>      TOML config file
    -p, --profile <NAME>     Scoring profile: balanced, health-first, accountability
        --as-of <DATE>       Reference date (YYYY-MM-DD)
        --threads <N>        Worker threads
        --data-dir <DIR>     Publish into a persistent serving store
        --output <FILE>      Write the generation as JSON
    -h, --help               Print help

ENVIRONMENT:
    RENTWATCH_CONFIG         Config file path
    RENTWATCH_*              Config overrides, e.g. RENTWATCH_RESOLVER__MERGE_THRESHOLD=0.8
    RUST_LOG                 Log filter (default: info)"#
    );
}

fn parse_profile(value: &str) -> anyhow::Result<ScoringProfile> {
    match value {
        "balanced" => Ok(ScoringProfile::Balanced),
        "health-first" => Ok(ScoringProfile::HealthFirst),
        "accountability" => Ok(ScoringProfile::Accountability),
        other => Err(anyhow!("unknown scoring profile '{other}'")),
    }
}

/// Rows of one source file; a missing file is an empty source.
fn load_rows(dir: &Path, file: &str) -> anyhow::Result<Vec<RawRow>> {
    let path = dir.join(file);
    if !path.exists() {
        info!(file, "Source file missing, treating as empty");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let rows: Vec<RawRow> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(rows)
}

fn load_snapshot(dir: &Path) -> anyhow::Result<RawSnapshot> {
    Ok(RawSnapshot {
        buildings: load_rows(dir, "buildings.json")?,
        violations: load_rows(dir, "violations.json")?,
        complaints: load_rows(dir, "complaints.json")?,
        evictions: load_rows(dir, "evictions.json")?,
        registrations: load_rows(dir, "registrations.json")?,
    })
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Build CLI overrides
    let mut overrides = ConfigOverrides::default();
    if let Some(profile) = parse_arg("--profile").or_else(|| parse_arg("-p")) {
        overrides.profile = Some(parse_profile(&profile)?);
    }

    let mut pipeline = PipelineOverrides::default();
    if let Some(as_of) = parse_arg("--as-of") {
        pipeline.as_of = Some(as_of.parse().with_context(|| format!("invalid --as-of '{as_of}'"))?);
    }
    if let Some(threads) = parse_arg("--threads") {
        pipeline.worker_threads = Some(threads.parse()?);
    }
    if pipeline.as_of.is_some() || pipeline.worker_threads.is_some() {
        overrides.pipeline = Some(pipeline);
    }

    let publish = PublishOverrides {
        data_dir: parse_arg("--data-dir").map(Into::into),
        output: parse_arg("--output").map(Into::into),
    };
    if publish.data_dir.is_some() || publish.output.is_some() {
        overrides.publish = Some(publish);
    }

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("RENTWATCH_CONFIG").ok());
    let config = RentwatchConfig::load(config_path.as_deref(), overrides)?;

    let input = parse_arg("--input")
        .or_else(|| parse_arg("-i"))
        .ok_or_else(|| anyhow!("--input is required"))?;
    let raw = load_snapshot(Path::new(&input))?;

    let data_dir = config.publish.data_dir.clone();
    let output = config.publish.output.clone();
    let engine = Rentwatch::new(config)?;

    if let Some(dir) = data_dir {
        let store = PersistentServingStore::open(&dir)?;
        let number = engine.run_and_publish(&raw, &store)?;
        println!("Published generation {number} to {}", dir.display());
    } else {
        let store = MemoryServingStore::new();
        engine.run_and_publish(&raw, &store)?;
        let generation = store
            .current()?
            .ok_or_else(|| anyhow!("no generation after publish"))?;
        let json = generation.to_json()?;
        match output {
            Some(path) => {
                fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                println!(
                    "Wrote {} buildings and {} owners to {}",
                    generation.buildings.len(),
                    generation.owners.len(),
                    path.display()
                );
            }
            None => println!("{json}"),
        }
    }

    profile::report();
    Ok(())
}
