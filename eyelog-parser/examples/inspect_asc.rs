//! Standalone log inspection tool
//!
//! Parses one text log and prints per-trial columns, trace lengths and all
//! warnings.
//!
//! Usage:
//!   inspect_asc <log_file.asc> [--downsample <n>] [--max-len <n>] [--trial-phase <name>]
//!
//! Example:
//!   inspect_asc subject_01.asc --downsample 10 --max-len 500

use eyelog_parser::{Cell, Parser, ParserConfig};
use std::env;
use std::path::PathBuf;

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <log_file.asc> [--downsample <n>] [--max-len <n>] [--trial-phase <name>]",
            args[0]
        );
        std::process::exit(1);
    }

    let log_path = PathBuf::from(&args[1]);
    let mut config = ParserConfig::new();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--downsample" if i + 1 < args.len() => {
                config = config.with_downsample(args[i + 1].parse().unwrap_or(1));
                i += 2;
            }
            "--max-len" if i + 1 < args.len() => {
                if let Ok(n) = args[i + 1].parse() {
                    config = config.with_max_trace_len(n);
                }
                i += 2;
            }
            "--trial-phase" if i + 1 < args.len() => {
                config = config.with_trial_phase(args[i + 1].clone());
                i += 2;
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                i += 1;
            }
        }
    }

    let parser = match Parser::new(config) {
        Ok(parser) => parser,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let parsed = match parser.parse_file(&log_path) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Failed to parse {:?}: {}", log_path, e);
            std::process::exit(1);
        }
    };

    println!("=== {} ===", parsed.source);
    println!("Lines read: {}", parsed.lines);
    println!("Trials: {}", parsed.rows.len());

    for (index, row) in parsed.rows.iter().enumerate() {
        println!("\nTrial #{}", index);
        for (name, cell) in row.iter() {
            match cell {
                Cell::Scalar(value) => println!("  {} = {}", name, value),
                Cell::Trace(trace) => {
                    let missing = trace.iter().filter(|v| v.is_none()).count();
                    println!("  {} [{} samples, {} missing]", name, trace.len(), missing);
                }
                Cell::Missing => println!("  {} = NA", name),
            }
        }
    }

    if !parsed.warnings.is_empty() {
        println!("\n=== WARNINGS ({}) ===", parsed.warnings.len());
        for warning in &parsed.warnings {
            println!("  {}", warning);
        }
    }
}
