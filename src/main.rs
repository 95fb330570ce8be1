//! Tessera CLI
//!
//! Usage:
//!   tessera render <PATH> [--root DIR] [--config FILE] [--vars FILE] [--var KEY=VALUE]...
//!   tessera check <PATH> [--root DIR] [--config FILE]
//!
//! Set `RUST_LOG=tessera=debug` to see template loads and cache hits.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tessera::{Config, Error, FileSystemLoader, Finder, Settings, Template, Value, Vars};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Render text templates with inheritance, blocks and includes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a template and print the output
    Render {
        #[command(flatten)]
        common: Common,

        /// JSON file with an object of template variables
        #[arg(long)]
        vars: Option<PathBuf>,

        /// A single variable; the value is parsed as JSON when it can be
        #[arg(long = "var", value_name = "KEY=VALUE")]
        var: Vec<String>,
    },
    /// Parse and compile a template, reporting any errors
    Check {
        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args)]
struct Common {
    /// Template path, relative to the root
    path: String,

    /// Template root directory
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Engine settings (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Common {
    fn load(&self) -> (PathBuf, Config) {
        let settings = match &self.config {
            Some(path) => match Settings::from_file(path) {
                Ok(settings) => settings,
                Err(e) => fail(&format!("Error loading config '{}': {}", path.display(), e)),
            },
            None => Settings::default(),
        };
        let root = self
            .root
            .clone()
            .or_else(|| settings.engine.root.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        match settings.into_config() {
            Ok(config) => (root, config),
            Err(e) => fail(&format!("Error: {}", e)),
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Render { common, vars, var } => render(common, vars, var).await,
        Command::Check { common } => check(common),
    }
}

async fn render(common: Common, vars_file: Option<PathBuf>, var: Vec<String>) {
    let (root, config) = common.load();
    let mut vars = match &vars_file {
        Some(path) => read_vars(path),
        None => Vars::new(),
    };
    for pair in &var {
        let Some((key, value)) = pair.split_once('=') else {
            fail(&format!("Error: --var expects KEY=VALUE, got '{}'", pair));
        };
        let value = serde_json::from_str::<serde_json::Value>(value)
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(value));
        vars.insert(key.to_string(), value);
    }

    let loader = match FileSystemLoader::new(&root) {
        Ok(loader) => loader,
        Err(e) => fail(&format!("Error opening template root: {}", e)),
    };
    let finder = Finder::new(loader, config);
    match finder.render(&common.path, vars).await {
        Ok(output) => print!("{}", output),
        Err(e) => {
            print_error(&e, &root);
            std::process::exit(1);
        }
    }
}

fn check(common: Common) {
    let (root, config) = common.load();
    let path = root.join(&common.path);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
    };
    let result = Template::from_bytes(&bytes, &common.path, Arc::new(config))
        .and_then(|template| template.compile().map(|_| template));
    match result {
        Ok(template) => {
            let blocks: Vec<&str> = template.block_names().collect();
            if blocks.is_empty() {
                println!("{}: ok", template.path());
            } else {
                println!("{}: ok (blocks: {})", template.path(), blocks.join(", "));
            }
        }
        Err(e) => {
            print_error(&e, &root);
            std::process::exit(1);
        }
    }
}

fn read_vars(path: &Path) -> Vars {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(&format!("Error reading vars '{}': {}", path.display(), e)),
    };
    match serde_json::from_str::<serde_json::Value>(&content).map(Value::from) {
        Ok(Value::Map(vars)) => vars,
        Ok(_) => fail(&format!("Error: vars file '{}' must hold an object", path.display())),
        Err(e) => fail(&format!("Error parsing vars '{}': {}", path.display(), e)),
    }
}

/// Print an error, with source context when it points into a template
fn print_error(error: &Error, root: &Path) {
    let file = match error {
        Error::Syntax { file, .. }
        | Error::UnknownStatement { file, .. }
        | Error::BlockNameConflict { file, .. } => Some(file),
        _ => None,
    };
    let report = file
        .and_then(|file| fs::read(root.join(file)).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|source| error.report(&source));
    match report {
        Some(report) => eprint!("{}", report),
        None => eprintln!("Error: {}", error),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}
