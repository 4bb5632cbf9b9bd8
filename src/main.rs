//! cloudblock - read remote objects through the block cache
//!
//! Small CLI over a directory or HTTP object store, mainly for inspecting
//! cache behavior.

use std::env;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cloudblock::cache::{BlockCache, CacheCounters};
use cloudblock::config::CacheConfig;
use cloudblock::fs::CachedFileSystem;
use cloudblock::remote::{HttpStore, LocalStore, ObjectStore};

/// Environment variable naming a JSON config file
const ENV_CONFIG: &str = "CLOUDBLOCK_CONFIG";

/// CLI command
#[derive(Debug)]
enum Command {
    /// Copy an object (or a range of it) to stdout
    Cat {
        source: String,
        name: String,
        offset: u64,
        len: Option<u64>,
    },
    /// Read an object repeatedly and report cache statistics
    Bench {
        source: String,
        name: String,
        passes: u32,
    },
    /// Print the effective configuration
    Config,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"cloudblock - read remote objects through a block cache

USAGE:
    cloudblock cat <source> <name> [offset] [len]
    cloudblock bench <source> <name> [passes]
    cloudblock config
    cloudblock help

SOURCE:
    A local directory, or an http:// / https:// base URL.

ENVIRONMENT:
    CLOUDBLOCK_CONFIG                   JSON config file
    CLOUDBLOCK_BLOCK_SIZE_MB            Block size in MiB
    CLOUDBLOCK_MAX_SIZE_MB              Block cache budget in MiB (0 disables)
    CLOUDBLOCK_MAX_STALENESS            Maximum block age in seconds (0 = never)
    CLOUDBLOCK_STAT_CACHE_MAX_AGE       Metadata TTL in seconds (0 disables)
    CLOUDBLOCK_STAT_CACHE_MAX_ENTRIES   Metadata cache capacity
    RUST_LOG                            Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {}: {}", what, value))
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some(command) = args.get(1) else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "cat" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: cloudblock cat <source> <name> [offset] [len]"));
            }
            let offset = match args.get(4) {
                Some(v) => parse_number(v, "offset")?,
                None => 0,
            };
            let len = args.get(5).map(|v| parse_number(v, "length")).transpose()?;
            Ok(Command::Cat {
                source: args[2].clone(),
                name: args[3].clone(),
                offset,
                len,
            })
        }
        "bench" => {
            if args.len() < 4 {
                return Err(anyhow!("Usage: cloudblock bench <source> <name> [passes]"));
            }
            let passes = match args.get(4) {
                Some(v) => parse_number(v, "pass count")?,
                None => 2,
            };
            Ok(Command::Bench {
                source: args[2].clone(),
                name: args[3].clone(),
                passes,
            })
        }
        "config" => Ok(Command::Config),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(anyhow!("Unknown command: {}", other)),
    }
}

fn load_config() -> Result<CacheConfig> {
    let mut config = match env::var(ENV_CONFIG) {
        Ok(path) => CacheConfig::load(Path::new(&path))?,
        Err(_) => CacheConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

fn open_store(source: &str) -> Result<Arc<dyn ObjectStore>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(Arc::new(HttpStore::new(source)?));
    }
    let root = PathBuf::from(source);
    if !root.is_dir() {
        return Err(anyhow!("Source is neither a URL nor a directory: {}", source));
    }
    Ok(Arc::new(LocalStore::new(root)))
}

fn cat(fs: &CachedFileSystem<'_>, name: &str, offset: u64, len: Option<u64>) -> Result<()> {
    let mut file = fs
        .open(name)
        .with_context(|| format!("Failed to open {}", name))?;
    file.seek(SeekFrom::Start(offset))?;

    let mut stdout = io::stdout().lock();
    let copied = match len {
        Some(len) => io::copy(&mut file.by_ref().take(len), &mut stdout)?,
        None => io::copy(&mut file, &mut stdout)?,
    };
    stdout.flush()?;

    info!(name = name, offset = offset, bytes = copied, "Copied object range");
    Ok(())
}

fn bench(fs: &CachedFileSystem<'_>, counters: &CacheCounters, name: &str, passes: u32) -> Result<()> {
    for pass in 1..=passes {
        let started = Instant::now();
        let mut file = fs
            .open(name)
            .with_context(|| format!("Failed to open {}", name))?;
        let mut sink = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut sink)
            .with_context(|| format!("Failed to read {}", name))?;
        println!(
            "pass {}: {} bytes in {:.1} ms",
            pass,
            sink.len(),
            started.elapsed().as_secs_f64() * 1000.0
        );
    }

    let s = counters.snapshot();
    println!(
        "hits: {} blocks ({} bytes), misses: {} blocks ({} bytes), hit rate: {:.1}%",
        s.hit_blocks,
        s.hit_bytes,
        s.miss_blocks,
        s.miss_bytes,
        counters.hit_rate()
    );
    println!(
        "cache size: {} / {} bytes",
        fs.block_cache().cache_size(),
        fs.block_cache().max_bytes()
    );
    counters.log_metrics();
    Ok(())
}

fn run(command: Command) -> Result<()> {
    let config = load_config()?;

    match command {
        Command::Cat {
            source,
            name,
            offset,
            len,
        } => {
            let fs = CachedFileSystem::new(open_store(&source)?, &config);
            cat(&fs, &name, offset, len)
        }
        Command::Bench {
            source,
            name,
            passes,
        } => {
            let counters = CacheCounters::new();
            let fs = CachedFileSystem::new(open_store(&source)?, &config);
            fs.set_stats(&counters);
            bench(&fs, &counters, &name, passes)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Help => {
            print_help();
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    // Logs go to stderr so `cat` output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = run(command) {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
