//! query-cache-cli — 缓存键编码、解码与配置检查的命令行工具
//!
//! Usage:
//!   query-cache-cli key <json> [--config <path>]      Encode a query as a cache key
//!   query-cache-cli decode <key> [--config <path>]    Reconstruct a query from a key
//!   query-cache-cli digest <json> [--config <path>]   Show the log digest of a query's key
//!   query-cache-cli tiers [--config <path>]           Show the configured tier order

use query_tier_cache::cache::PositionalKeyCodec;
use query_tier_cache::config::CONFIG_ENV_VAR;
use query_tier_cache::{CacheConfig, KeyCodec, Query};
use std::path::PathBuf;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "key" => cmd_key(&args[2..]),
        "decode" => cmd_decode(&args[2..]),
        "digest" => cmd_digest(&args[2..]),
        "tiers" => cmd_tiers(&args[2..]),
        "version" | "--version" | "-V" => cmd_version(),
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"query-cache-cli — tiered query cache tooling

USAGE:
    query-cache-cli <COMMAND> [OPTIONS]

COMMANDS:
    key <json>          Encode a query (JSON object or scalar) as a cache key
    decode <key>        Reconstruct a structured query from a cache key
    digest <json>       Show the digest used for a query's key in logs
    tiers               Show the configured tier order and policies
    version             Show version information
    help                Show this help message

OPTIONS:
    --config <path>     YAML configuration file

ENVIRONMENT:
    QUERY_CACHE_CONFIG  Configuration file used when --config is absent
    RUST_LOG            Log filter (default: info)"#
    );
}

fn cmd_version() {
    println!("query-cache-cli {}", env!("CARGO_PKG_VERSION"));
}

fn resolve_config_path(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn load_config(args: &[String]) -> CacheConfig {
    match resolve_config_path(args) {
        Some(path) => match CacheConfig::from_path(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) => {
                eprintln!("Error: cannot load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => CacheConfig::default(),
    }
}

/// First argument that is not `--config` or its value.
fn positional(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" {
            skip_next = true;
            continue;
        }
        return Some(arg.as_str());
    }
    None
}

fn require_positional<'a>(args: &'a [String], what: &str) -> &'a str {
    match positional(args) {
        Some(value) => value,
        None => {
            eprintln!("Error: missing <{what}> argument");
            std::process::exit(1);
        }
    }
}

fn parse_query(raw: &str) -> Query {
    // Anything that is not valid JSON is treated as opaque text.
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => Query::from_json(value),
        Err(_) => Query::opaque(raw),
    }
}

fn encode(args: &[String]) -> query_tier_cache::CacheKey {
    let config = load_config(args);
    let query = parse_query(require_positional(args, "json"));
    let codec = PositionalKeyCodec::with_config(config.codec);
    match codec.generate_key(&query) {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_key(args: &[String]) {
    println!("{}", encode(args));
}

fn cmd_digest(args: &[String]) {
    println!("{}", encode(args).digest());
}

fn cmd_decode(args: &[String]) {
    let config = load_config(args);
    let key = require_positional(args, "key");
    let codec = PositionalKeyCodec::with_config(config.codec);
    match codec.reconstruct_query(key) {
        Ok(query) => match serde_json::to_string_pretty(&query) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn cmd_tiers(args: &[String]) {
    let config = load_config(args);
    if config.tiers.is_empty() {
        println!("No tiers configured.");
    } else {
        for (i, name) in config.tiers.iter().enumerate() {
            println!("  [{i}] {name}");
        }
    }
    println!("tier_errors: {:?}", config.tier_errors);
    println!("escaping: {:?}", config.codec.escaping);
    println!("malformed_pairs: {:?}", config.codec.malformed_pairs);
}
