//! Respec CLI - spec convention migration tool
//!
//! Converts monkey-patched assertion and stub syntax to the explicit
//! expect/allow convention. Dry-run by default; use --write to apply.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use glob::glob;
use respec::{Config, Converter, NegativeForm, Report, RuntimeData, SummaryOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "respec",
    version,
    about = "Spec convention migration tool",
    long_about = "Converts monkey-patched assertion and stub syntax (obj.should, obj.stub) \
                  to the explicit expect/allow convention. Dry-run by default."
)]
struct Cli {
    /// Files or glob patterns to convert
    files: Vec<String>,

    /// Configuration file path (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write converted sources back to the files
    #[arg(long)]
    write: bool,

    /// Print each converted source to stdout
    #[arg(long)]
    print: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Number of parallel jobs (0 = auto)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Negative form used for converted negative assertions
    #[arg(long, value_enum)]
    negative_form: Option<NegativeFormArg>,

    /// Skip dynamic analysis; rules use their static fallbacks only
    #[arg(long)]
    skip_dynamic_analysis: bool,

    /// Print the instrumented program for one file and exit (phase 1)
    #[arg(long, conflicts_with = "write")]
    emit_instrumented: bool,

    /// JSON output of an instrumented run, applied when converting one file
    #[arg(long)]
    runtime_facts: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum NegativeFormArg {
    NotTo,
    ToNot,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path).unwrap_or_else(|e| {
            eprintln!("{}: failed to load config: {}", "error".red().bold(), e);
            std::process::exit(1);
        })
    } else {
        Config::default()
    };

    if let Some(form) = cli.negative_form {
        config.negative_form = match form {
            NegativeFormArg::NotTo => NegativeForm::NotTo,
            NegativeFormArg::ToNot => NegativeForm::ToNot,
        };
    }
    if cli.skip_dynamic_analysis {
        config.skip_dynamic_analysis = true;
    }
    if cli.jobs > 0 {
        config.jobs = cli.jobs;
    }

    if cli.files.is_empty() {
        eprintln!("{}: no files specified", "error".red().bold());
        eprintln!();
        eprintln!("Usage: respec [OPTIONS] <FILES>...");
        std::process::exit(2);
    }

    // Expand glob patterns
    let mut files: Vec<PathBuf> = Vec::new();
    for pattern in &cli.files {
        match glob(pattern) {
            Ok(paths) => {
                for entry in paths.flatten() {
                    if entry.is_file() {
                        files.push(entry);
                    }
                }
            }
            Err(e) => {
                eprintln!(
                    "{}: invalid pattern '{}': {}",
                    "error".red().bold(),
                    pattern,
                    e
                );
                std::process::exit(1);
            }
        }
    }

    if files.is_empty() {
        eprintln!("{}: no files found to convert", "error".red().bold());
        std::process::exit(1);
    }

    let converter = Converter::new(config).unwrap_or_else(|e| {
        eprintln!("{}: invalid rule registration: {}", "error".red().bold(), e);
        std::process::exit(1);
    });

    if cli.emit_instrumented {
        emit_instrumented(&converter, &files);
        return;
    }

    let runtime = load_runtime_facts(&converter, &cli, &files);

    if cli.verbose {
        eprintln!("Converting {} files...", files.len());
    }

    let (conversions, report) = converter.convert_files(&files, &runtime);

    for conversion in &conversions {
        if !conversion.modified {
            continue;
        }
        if cli.write {
            if let Err(e) = std::fs::write(&conversion.path, &conversion.rewritten) {
                eprintln!(
                    "{}: failed to write {}: {}",
                    "error".red().bold(),
                    conversion.path.display(),
                    e
                );
                std::process::exit(1);
            }
            if cli.verbose {
                eprintln!("rewrote {}", conversion.path.display());
            }
        } else if cli.print {
            print!("{}", conversion.rewritten);
        }
    }

    print_report(&report, &cli);

    if !cli.write && conversions.iter().any(|c| c.modified) {
        eprintln!();
        eprintln!("{}: use --write to apply conversions", "dry-run".cyan());
    }

    std::process::exit(report.exit_code());
}

/// Phase-1 side mode: print the instrumented program for external execution
fn emit_instrumented(converter: &Converter, files: &[PathBuf]) {
    let [file] = files else {
        eprintln!(
            "{}: --emit-instrumented works on exactly one file",
            "error".red().bold()
        );
        std::process::exit(1);
    };
    let source = std::fs::read_to_string(file).unwrap_or_else(|e| {
        eprintln!(
            "{}: failed to read {}: {}",
            "error".red().bold(),
            file.display(),
            e
        );
        std::process::exit(1);
    });
    let tree = respec::parse(&source).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", "error".red().bold(), file.display(), e);
        std::process::exit(2);
    });
    print!("{}", converter.instrumentation(&tree).instrument(&source));
}

/// Ingest an instrumented run's output; facts are node-keyed so they only
/// apply when converting the single file they were compiled from
fn load_runtime_facts(converter: &Converter, cli: &Cli, files: &[PathBuf]) -> RuntimeData {
    let Some(facts_path) = &cli.runtime_facts else {
        return RuntimeData::new();
    };
    if converter.config().skip_dynamic_analysis {
        eprintln!(
            "{}: --runtime-facts ignored with --skip-dynamic-analysis",
            "warning".yellow()
        );
        return RuntimeData::new();
    }
    let [file] = files else {
        eprintln!(
            "{}: --runtime-facts applies to exactly one file",
            "error".red().bold()
        );
        std::process::exit(1);
    };

    let read = |path: &PathBuf| {
        std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!(
                "{}: failed to read {}: {}",
                "error".red().bold(),
                path.display(),
                e
            );
            std::process::exit(1);
        })
    };
    let source = read(file);
    let json = read(facts_path);

    let tree = respec::parse(&source).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", "error".red().bold(), file.display(), e);
        std::process::exit(2);
    });
    converter.instrumentation(&tree).ingest(&json).unwrap_or_else(|e| {
        eprintln!("{}: invalid runtime facts: {}", "error".red().bold(), e);
        std::process::exit(1);
    })
}

fn print_report(report: &Report, cli: &Cli) {
    let colored_output = !cli.no_color;
    let options = SummaryOptions {
        bullet: Some("-".to_string()),
        separate_by_blank_line: true,
    };

    let summary = if colored_output {
        report.colored_summary(&options)
    } else {
        report.summary(&options)
    };
    if !summary.is_empty() {
        println!("{}", summary);
    }

    for error in &report.conversion_errors {
        eprintln!("{}: {}", "incomplete".magenta(), error);
    }
    for error in &report.syntax_errors {
        eprintln!("{}: {}", "error".red().bold(), error);
    }

    println!(
        "{}",
        if colored_output {
            report.colored_stats()
        } else {
            report.stats()
        }
    );
}
