mod config;
mod parser;
mod pdf;
mod projection;
mod report;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use config::Config;
use parser::Extraction;
use pdf::form::PdfForm;
use pdf::PdfTextExtractor;

#[derive(Parser)]
#[command(
    name = "anmeldung_extract",
    about = "Pull labelled fields out of grid-connection PDFs and fill form templates"
)]
struct Cli {
    /// JSON file overriding the built-in header, label and form tables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a TXT report for each PDF
    Extract {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory for the reports (default: next to each PDF)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
        /// Print reports instead of writing files
        #[arg(long)]
        stdout: bool,
        /// Also dump the found sections/fields as JSON
        #[arg(long)]
        debug: bool,
    },
    /// Extract one PDF and write the values into a form template
    Fill {
        source: PathBuf,
        /// Fillable PDF template
        #[arg(short, long)]
        template: PathBuf,
        /// Where to write the filled PDF
        #[arg(short, long)]
        out: PathBuf,
        /// Also write the TXT report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// List the form fields of a template
    Fields { template: PathBuf },
    /// Print the effective configuration as JSON
    ShowConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Extract {
            files,
            out_dir,
            stdout,
            debug,
        } => run_extract(&config, &files, out_dir.as_deref(), stdout, debug),
        Commands::Fill {
            source,
            template,
            out,
            report,
        } => run_fill(&config, &source, &template, &out, report.as_deref()),
        Commands::Fields { template } => {
            let bytes = std::fs::read(&template)
                .with_context(|| format!("Failed to read {}", template.display()))?;
            let form = PdfForm::open(&bytes)
                .with_context(|| format!("Failed to open template {}", template.display()))?;
            print_fields(&form);
            Ok(())
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn extract_file(config: &Config, path: &Path) -> Result<Extraction> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let extraction = parser::process_document(&PdfTextExtractor, &bytes, config)
        .with_context(|| format!("Failed to extract {}", path.display()))?;
    info!(
        file = %path.display(),
        fields = extraction.field_count(),
        "extracted"
    );
    Ok(extraction)
}

fn run_extract(
    config: &Config,
    files: &[PathBuf],
    out_dir: Option<&Path>,
    stdout: bool,
    debug: bool,
) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    if let (Some(d), false) = (out_dir, stdout) {
        std::fs::create_dir_all(d)
            .with_context(|| format!("Failed to create {}", d.display()))?;
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    // One document per task; each is extracted start to finish on its own.
    let results: Vec<_> = files
        .par_iter()
        .map(|path| {
            let r = extract_file(config, path);
            pb.inc(1);
            (path, r)
        })
        .collect();
    pb.finish_and_clear();

    let mut failed = 0usize;
    for (path, result) in results {
        let extraction = match result {
            Ok(e) => e,
            Err(e) => {
                warn!("{:#}", e);
                failed += 1;
                continue;
            }
        };
        if extraction.is_empty() {
            warn!(file = %path.display(), "no known sections found");
        }

        let txt = report::format_as_txt(&extraction, config);
        if stdout {
            print!("{}", txt);
        } else {
            let target = report::write_report(path, out_dir, &txt)?;
            println!("{} -> {}", path.display(), target.display());
        }

        if debug {
            println!("{}", serde_json::to_string_pretty(&extraction)?);
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} documents could not be read", failed, files.len());
    }
    Ok(())
}

fn run_fill(
    config: &Config,
    source: &Path,
    template: &Path,
    out: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let extraction = extract_file(config, source)?;

    if let Some(path) = report_path {
        std::fs::write(path, report::format_as_txt(&extraction, config))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let projection = projection::build_projection(&extraction, &config.form);
    let template_bytes = std::fs::read(template)
        .with_context(|| format!("Failed to read {}", template.display()))?;
    let today = projection::today_in(config.form.timezone);
    let filled = projection::fill_pdf(&template_bytes, &projection, &config.form, today)
        .with_context(|| format!("Failed to fill template {}", template.display()))?;

    std::fs::write(out, &filled).with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Filled {} ({} values) -> {}",
        template.display(),
        projection.len(),
        out.display()
    );
    Ok(())
}

fn print_fields(form: &PdfForm) {
    let fields = form.fields();
    if fields.is_empty() {
        println!("No form fields.");
        return;
    }

    println!(
        "{:>4} | {:<40} | {:<9} | {:<10} | {}",
        "Page", "Field", "Type", "On-state", "Value"
    );
    println!("{}", "-".repeat(90));
    for w in fields {
        let dup = fields.iter().filter(|o| o.name == w.name).count() > 1;
        println!(
            "{:>4} | {:<40} | {:<9} | {:<10} | {}{}",
            w.page,
            truncate(&w.name, 40),
            w.kind.as_str(),
            w.on_state.as_deref().unwrap_or("-"),
            form.value(&w.name).unwrap_or_default(),
            if dup { "  (duplicate)" } else { "" }
        );
    }
    println!("\n{} widgets", fields.len());
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
