//! Velour CLI
//!
//! Usage:
//!   velour [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --context <FILE>    JSON file with context bindings
//!   -s, --set <KEY=VALUE>   Bind a string value (repeatable)
//!   -h, --help              Print help

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::Parser;

use velour::{Context, RenderError, Template};

#[derive(Parser)]
#[command(name = "velour")]
#[command(about = "ERB-style template rendering")]
struct Cli {
    /// Template file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// JSON file whose top-level entries become context bindings
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Bind a string value, e.g. --set name=world (repeatable)
    #[arg(short, long, value_name = "KEY=VALUE")]
    set: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    if cli.input.is_none() && io::stdin().is_terminal() {
        eprintln!("velour: no template given; pass a file or pipe source on stdin");
        std::process::exit(2);
    }

    // Read template source
    let (source, filename) = match &cli.input {
        Some(path) => match fs::read_to_string(path) {
            Ok(content) => (content, path.display().to_string()),
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let mut buffer = String::new();
            match io::stdin().read_to_string(&mut buffer) {
                Ok(_) => (buffer, "<stdin>".to_string()),
                Err(e) => {
                    eprintln!("Error reading from stdin: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    // Build the base context: JSON file first, --set pairs on top
    let mut ctx = match &cli.context {
        Some(path) => {
            let raw = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Error reading context '{}': {}", path.display(), e);
                    std::process::exit(1);
                }
            };
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(json) => Context::from(json),
                Err(e) => {
                    eprintln!("Error parsing context '{}': {}", path.display(), e);
                    std::process::exit(1);
                }
            }
        }
        None => Context::new(),
    };

    for pair in &cli.set {
        match pair.split_once('=') {
            Some((key, value)) => ctx.set(key, value),
            None => {
                eprintln!("Invalid --set '{}': expected KEY=VALUE", pair);
                std::process::exit(1);
            }
        }
    }

    let template = match Template::new(&source) {
        Ok(template) => template,
        Err(RenderError::Parse(errors)) => {
            for error in &errors {
                eprint!("{}", error.format(&source, &filename));
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match template.exec(&ctx) {
        Ok(output) => {
            print!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
