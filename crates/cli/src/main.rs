//! # siltkv — interactive shell over the SiltKV engine
//!
//! A REPL that reads commands from stdin, runs them against the engine
//! and prints results to stdout; usable interactively or scripted by
//! piping commands in.
//!
//! ## Commands
//!
//! ```text
//! PUT key value        Insert or update a key
//! GET key              Look up a key (prints value or "(nil)")
//! DEL key              Delete a key (error if it does not exist)
//! PREFIX p [page]      Page of live keys starting with p
//! RANGE lo hi [page]   Page of live keys in [lo, hi]
//! FLUSH                Drain every memtable to level-1 tables
//! COMPACT              Re-evaluate compaction triggers now
//! STATS                Engine debug summary
//! EXIT / QUIT          Shut down
//! ```
//!
//! Data commands pass through the engine's token bucket; when the bucket
//! is empty the command is refused with a retry hint rather than blocking.
//!
//! ## Configuration
//!
//! `SILTKV_CONFIG` names the JSON config file (default `silt.json`);
//! a missing file is created with the defaults. Log verbosity follows
//! `RUST_LOG` (default `info`).

use anyhow::Result;
use config::Config;
use engine::Engine;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const PAGE_SIZE: usize = 10;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("SILTKV_CONFIG").unwrap_or_else(|_| "silt.json".to_string());
    let cfg = Config::load_or_init(&config_path)?;
    let mut engine = Engine::open(cfg)?;

    println!("siltkv ready ({:?})", engine);
    println!("Commands: PUT key value | GET key | DEL key | PREFIX p [page]");
    println!("          RANGE lo hi [page] | FLUSH | COMPACT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => with_token(&mut engine, |engine| {
                    match (parts.next(), parts.next()) {
                        (Some(k), Some(v)) => match engine.put(k, v.as_bytes()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR put failed: {e}"),
                        },
                        _ => println!("ERR usage: PUT key value"),
                    }
                }),
                "GET" => with_token(&mut engine, |engine| match parts.next() {
                    Some(k) => match engine.get(k) {
                        Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                        Ok(None) => println!("(nil)"),
                        Err(e) => println!("ERR get failed: {e}"),
                    },
                    None => println!("ERR usage: GET key"),
                }),
                "DEL" => with_token(&mut engine, |engine| match parts.next() {
                    Some(k) => match engine.delete(k) {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR del failed: {e}"),
                    },
                    None => println!("ERR usage: DEL key"),
                }),
                "PREFIX" => with_token(&mut engine, |engine| match parts.next() {
                    Some(p) => {
                        let page = parse_page(parts.next());
                        match engine.prefix_scan(p, page, PAGE_SIZE) {
                            Ok(results) => print_page(&results, page),
                            Err(e) => println!("ERR scan failed: {e}"),
                        }
                    }
                    None => println!("ERR usage: PREFIX prefix [page]"),
                }),
                "RANGE" => with_token(&mut engine, |engine| {
                    match (parts.next(), parts.next()) {
                        (Some(lo), Some(hi)) => {
                            let page = parse_page(parts.next());
                            match engine.range_scan(lo, hi, page, PAGE_SIZE) {
                                Ok(results) => print_page(&results, page),
                                Err(e) => println!("ERR scan failed: {e}"),
                            }
                        }
                        _ => println!("ERR usage: RANGE lo hi [page]"),
                    }
                }),
                "FLUSH" => match engine.flush_all() {
                    Ok(()) => println!("OK ({} tables)", engine.table_count()),
                    Err(e) => println!("ERR flush failed: {e}"),
                },
                "COMPACT" => match engine.maybe_compact() {
                    Ok(()) => println!("OK ({} tables)", engine.table_count()),
                    Err(e) => println!("ERR compact failed: {e}"),
                },
                "STATS" => println!("{:?}", engine),
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => println!("unknown command: {other}"),
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

/// Runs `body` only when the admission bucket grants a token; otherwise
/// prints a retry hint. Never blocks.
fn with_token<F: FnOnce(&mut Engine)>(engine: &mut Engine, body: F) {
    if engine.admit() {
        body(engine);
    } else {
        println!("RATE LIMITED (retry shortly)");
    }
}

fn parse_page(arg: Option<&str>) -> usize {
    arg.and_then(|p| p.parse().ok()).filter(|&p| p >= 1).unwrap_or(1)
}

fn print_page(results: &[(String, Vec<u8>)], page: usize) {
    if results.is_empty() {
        println!("(empty page {page})");
        return;
    }
    for (k, v) in results {
        println!("{} -> {}", k, String::from_utf8_lossy(v));
    }
    println!("({} entries, page {})", results.len(), page);
}
