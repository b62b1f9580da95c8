//! jinja-schema CLI
//!
//! Usage:
//!   jinja-schema [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -s, --search-path <DIR>  Directory to load templates from (repeatable)
//!   -c, --config <FILE>      Settings file (TOML format)
//!   -l, --list-templates     Print the templates reachable from TEMPLATE
//!   -d, --diagnostics        Print constructs the inference could not model
//!   --descend-blocks         Walk `{% block %}` bodies
//!   -v, --verbose            More log output (repeatable)
//!   -h, --help               Print help

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jinja_schema::{infer_with_config, FileSystemSource, SchemaError, Settings};

#[derive(Parser)]
#[command(name = "jinja-schema")]
#[command(about = "Infer the data a Jinja template expects, as YAML")]
struct Cli {
    /// Template file, or a template name when search paths are given
    template: String,

    /// Directory to load templates from; may be repeated
    #[arg(short, long = "search-path", value_name = "DIR")]
    search_path: Vec<PathBuf>,

    /// Settings file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the templates reachable from TEMPLATE instead of the schema
    #[arg(short, long)]
    list_templates: bool,

    /// Print constructs the inference could not model to stderr
    #[arg(short, long)]
    diagnostics: bool,

    /// Walk `{% block %}` bodies as plain containers
    #[arg(long)]
    descend_blocks: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Load settings
    let mut settings = match &cli.config {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading settings '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };
    if cli.descend_blocks {
        settings.config.descend_blocks = true;
    }

    // Command-line search paths come first
    let mut search_paths = cli.search_path.clone();
    search_paths.extend(settings.search_paths.iter().cloned());

    let (root, search_paths) = if search_paths.is_empty() {
        split_template_path(Path::new(&cli.template))
    } else {
        (cli.template.clone(), search_paths)
    };

    let source = FileSystemSource::new(search_paths);
    tracing::debug!(
        root = %root,
        search_paths = ?source.search_paths(),
        "starting inference"
    );
    let inference = match infer_with_config(&root, &source, &settings.config) {
        Ok(inference) => inference,
        Err(SchemaError::Syntax {
            template,
            text,
            errors,
        }) => {
            for error in &errors {
                eprintln!("{}", error.format(&text, &template));
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if cli.diagnostics {
        for diagnostic in &inference.diagnostics {
            eprintln!("{}", diagnostic);
        }
    } else if !inference.diagnostics.is_empty() {
        tracing::info!(
            count = inference.diagnostics.len(),
            "some constructs were not modelled; rerun with --diagnostics to list them"
        );
    }

    if cli.list_templates {
        for name in &inference.templates {
            println!("{}", name);
        }
        return;
    }

    match inference.to_yaml_string() {
        Ok(yaml) => print!("{}", yaml),
        Err(e) => {
            eprintln!("Error rendering schema: {}", e);
            std::process::exit(1);
        }
    }
}

/// `dir/page.html` → root `page.html` searched in `dir`
fn split_template_path(path: &Path) -> (String, Vec<PathBuf>) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (name, vec![dir])
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("jinja_schema={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
