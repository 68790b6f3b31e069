//! Template Check CLI
//!
//! Usage:
//!   check-templates [OPTIONS] [MANIFEST]
//!
//! Options:
//!   -C <DIR>                Run as if started in DIR
//!   -v, --verbose           Print every checked call
//!   -o, --output <FORMAT>   Call log format: tsv or jsonl
//!   -h, --help              Print help

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use template_check::manifest::Manifest;
use template_check::{CallRecord, Report};

#[derive(Parser)]
#[command(name = "check-templates")]
#[command(about = "Statically type check Go-style templates against their data types")]
struct Cli {
    /// Manifest describing types, templates and checks
    #[arg(default_value = "templates.toml")]
    manifest: PathBuf,

    /// Run as if started in this directory
    #[arg(short = 'C', value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Print every checked render and template call to stdout
    #[arg(short, long)]
    verbose: bool,

    /// Format of the call log
    #[arg(short, long, value_enum, default_value_t = Format::Tsv)]
    output: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Tab-separated: location, template, data type
    Tsv,
    /// One JSON object per line
    Jsonl,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    let manifest_path = match &cli.directory {
        Some(dir) => dir.join(&cli.manifest),
        None => cli.manifest.clone(),
    };

    match run(&manifest_path) {
        Ok(report) => {
            for diagnostic in &report.diagnostics {
                eprintln!("{}", diagnostic.format());
            }
            if cli.verbose {
                if let Err(e) = print_calls(&report.calls, cli.output) {
                    eprintln!("Error writing call log: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            if report.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(message) => {
            eprintln!("{}", message);
            ExitCode::FAILURE
        }
    }
}

fn run(manifest_path: &Path) -> Result<Report, String> {
    let manifest = Manifest::from_file(manifest_path)
        .map_err(|e| format!("Error loading manifest '{}': {}", manifest_path.display(), e))?;
    let root = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let bundle = manifest
        .load_bundle(root)
        .map_err(|e| format!("Error loading templates: {}", e))?;
    let project = manifest.build(&bundle).map_err(|e| match e {
        template_check::ManifestError::Template(e) => e.format(),
        e => format!("Error: {}", e),
    })?;
    tracing::debug!(checks = project.checks.len(), "manifest loaded");
    Ok(project.check())
}

fn print_calls(calls: &[CallRecord], format: Format) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for call in calls {
        match format {
            Format::Tsv => writeln!(out, "{}\t{}\t{}", call.location, call.template, call.data)?,
            Format::Jsonl => {
                let line = serde_json::to_string(call).map_err(io::Error::other)?;
                writeln!(out, "{}", line)?;
            }
        }
    }
    Ok(())
}
