//! CLI tool to run GEDCOM filters against a GEDCOM file.

use clap::Parser;
use gedcom_filter::{
    FilterParams, FilterRegistry, apply_filter_chain, resolve_includes, split_top_level,
};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Filter a GEDCOM file through a chain of named filters.
///
/// Filters run in the order given, each one's included filters expanded
/// around it. Without any `-f` the input passes through unchanged.
#[derive(Parser)]
#[command(name = "gedcom-filter")]
struct Cli {
    /// Input GEDCOM file (or /dev/stdin)
    #[arg(required_unless_present = "list")]
    input: Option<PathBuf>,

    /// Filter to apply, by name (repeatable)
    #[arg(short = 'f', long = "filter")]
    filters: Vec<String>,

    /// Rule file defining an additional filter (repeatable)
    #[arg(short = 'r', long = "rules")]
    rule_files: Vec<PathBuf>,

    /// Filter parameter as key=value, e.g. tree=family (repeatable)
    #[arg(long = "param", value_parser = FilterParams::parse_assignment)]
    params: Vec<(String, String)>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show filters, record counts and debug logs on stderr
    #[arg(short, long)]
    verbose: bool,

    /// List the available filter names and exit
    #[arg(long)]
    list: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut registry = FilterRegistry::with_builtins();
    for path in &cli.rule_files {
        if let Err(e) = registry.load_rule_file(path) {
            eprintln!("Error loading rule file '{}': {e}", path.display());
            process::exit(1);
        }
    }

    if cli.list {
        for name in registry.names() {
            println!("{name}");
        }
        return;
    }

    let Some(input) = &cli.input else {
        eprintln!("Missing input file");
        process::exit(1);
    };

    let input_text = match fs::read_to_string(input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading input file '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let filters = match resolve_includes(&cli.filters, &registry) {
        Ok(filters) => filters,
        Err(e) => {
            eprintln!("Filter error: {e}");
            process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("Input:   {}", input.display());
        eprintln!(
            "Output:  {}",
            cli.output
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(stdout)".to_string())
        );
        eprintln!(
            "Filters: {}",
            filters.iter().map(|f| f.name()).collect::<Vec<_>>().join(", ")
        );
    }

    let params: FilterParams = cli.params.iter().cloned().collect();
    let records: Vec<String> = split_top_level(&input_text)
        .into_iter()
        .map(str::to_string)
        .collect();
    let input_count = records.len();
    let chain: Vec<_> = filters.into_iter().map(Some).collect();

    match apply_filter_chain(records, &chain, &params) {
        Ok(records) => {
            let output = records.concat();
            if let Some(out_path) = &cli.output {
                if let Some(parent) = Path::new(out_path).parent()
                    && !parent.as_os_str().is_empty()
                    && fs::create_dir_all(parent).is_err()
                {
                    eprintln!("Error creating output directory for '{}'", out_path.display());
                    process::exit(1);
                }
                if let Err(e) = fs::write(out_path, &output) {
                    eprintln!("Error writing output file '{}': {e}", out_path.display());
                    process::exit(1);
                }
            } else {
                if let Err(e) = io::stdout().write_all(output.as_bytes()) {
                    eprintln!("Error writing output: {e}");
                    process::exit(1);
                }
                if !output.is_empty() && !output.ends_with('\n') {
                    println!();
                }
            }
            if cli.verbose {
                eprintln!("Records: {input_count} -> {}", records.len());
            }
        }
        Err(e) => {
            eprintln!("Filter error: {e}");
            process::exit(1);
        }
    }
}
