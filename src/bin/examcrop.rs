//! CLI binary for examcrop.
//!
//! A thin shim over the library crate that maps CLI flags to `CropConfig`,
//! wires the two operator logs to files and prints a run summary.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use examcrop::catalog::DEFAULT_START_MARKER;
use examcrop::{
    audit, discover, run, scaffold, ConfigCatalog, CropConfig, PdfJob, ProgressCallback,
    RunProgressCallback, RunSummary, CONVERSION_TARGET, PROCESS_TARGET,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const CONVERSION_LOG: &str = "conversion_log.txt";
const PROCESS_LOG: &str = "process_log.txt";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the PDFs of the run plus a log
/// line per finished PDF. PDFs may finish out of order with `--jobs > 1`.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<PathBuf, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} PDFs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Cropping");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, pdf: &Path) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(pdf))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

fn file_label(pdf: &Path) -> String {
    pdf.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string())
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pdfs: usize) {
        self.bar.set_length(total_pdfs as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Cropping questions from {total_pdfs} PDFs…"))
        ));
    }

    fn on_pdf_start(&self, pdf: &Path) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(pdf.to_path_buf(), Instant::now());
        }
        self.bar.set_message(file_label(pdf));
    }

    fn on_pdf_complete(&self, pdf: &Path, produced: usize, missing: usize) {
        let secs = self.elapsed(pdf);
        let missing_note = if missing == 0 {
            dim("complete")
        } else {
            red(&format!("{missing} missing"))
        };
        self.bar.println(format!(
            "  {} {:<48}  {:>4} images  {}  {}",
            green("✓"),
            file_label(pdf),
            produced,
            missing_note,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pdf_error(&self, pdf: &Path, error: &str) {
        let secs = self.elapsed(pdf);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<48}  {}  {}",
            red("✗"),
            file_label(pdf),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pdfs: usize, ok_pdfs: usize) {
        self.bar.finish_and_clear();
        let failed = total_pdfs.saturating_sub(ok_pdfs);
        if failed == 0 {
            eprintln!("{} {} PDFs processed", green("✔"), bold(&ok_pdfs.to_string()));
        } else {
            eprintln!(
                "{} {}/{} PDFs processed  ({} skipped)",
                if ok_pdfs == 0 { red("✘") } else { cyan("⚠") },
                bold(&ok_pdfs.to_string()),
                total_pdfs,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Crop every PDF under EXAM_PDFS/ using config.yaml
  examcrop run

  # One exam type, four PDFs at a time, JSON summary
  examcrop run --exam KPSS --jobs 4 --json > summary.json

  # A single PDF
  examcrop run --pdf "EXAM_PDFS/KPSS/2021-KPSS/2021-KPSS LİSANS GY-GK.pdf"

  # Re-check an existing output tree without rendering
  examcrop audit --output output

  # Generate a catalog skeleton to fill in by hand
  examcrop scaffold --exam-root EXAM_PDFS -o config.yaml

OUTPUT:
  {output}/{EXAM}/{YEAR}/{SECTION}/{n}.png
  Existing images are never re-rendered; delete one to redo it.

LOGS (in --log-dir, truncated each run):
  conversion_log.txt   one line per question rendered or failed
  process_log.txt      catalog errors, height anomalies, missing questions

ENVIRONMENT VARIABLES:
  EXAMCROP_CONFIG      Catalog YAML file
  EXAMCROP_EXAM_ROOT   Root of the PDF tree
  EXAMCROP_OUTPUT      Output root
  EXAMCROP_LOG_DIR     Log directory
  PDFIUM_LIB_PATH      Path to libpdfium (file or directory)
  RUST_LOG             Overrides the terminal log filter
"#;

/// Crop exam questions out of PDF booklets into PNG images.
#[derive(Parser, Debug)]
#[command(
    name = "examcrop",
    version,
    about = "Crop exam questions out of PDF booklets into PNG images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level terminal logs.
    #[arg(short, long, global = true, env = "EXAMCROP_VERBOSE")]
    verbose: bool,

    /// Suppress all terminal output except errors.
    #[arg(short, long, global = true, env = "EXAMCROP_QUIET")]
    quiet: bool,

    /// Directory for conversion_log.txt and process_log.txt.
    #[arg(long, global = true, env = "EXAMCROP_LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crop questions from every PDF in the exam tree.
    Run(RunArgs),
    /// Compare the output tree with the catalog without rendering.
    Audit(AuditArgs),
    /// Print a skeleton catalog mirroring the exam tree.
    Scaffold(ScaffoldArgs),
}

#[derive(Args, Debug)]
struct TreeArgs {
    /// Catalog YAML file.
    #[arg(short, long, env = "EXAMCROP_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Root of the `{EXAM}/{YEAR}/…/*.pdf` tree.
    #[arg(long, env = "EXAMCROP_EXAM_ROOT", default_value = "EXAM_PDFS")]
    exam_root: PathBuf,

    /// Output root for the cropped images.
    #[arg(short, long, env = "EXAMCROP_OUTPUT", default_value = "output")]
    output: PathBuf,

    /// Only process this exam-type directory.
    #[arg(long)]
    exam: Option<String>,

    /// Only process this PDF (must sit under --exam-root).
    #[arg(long, conflicts_with = "exam")]
    pdf: Option<PathBuf>,

    /// Print the structured summary as JSON on stdout.
    #[arg(long, env = "EXAMCROP_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    tree: TreeArgs,

    /// Rendering DPI (72–600).
    #[arg(long, env = "EXAMCROP_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Crop width in points from the question's left edge.
    #[arg(long, default_value_t = 247.0)]
    crop_width: f32,

    /// Points trimmed from the left of each crop.
    #[arg(long, default_value_t = 0.0)]
    x_margin: f32,

    /// Points added below the last answer block.
    #[arg(long, default_value_t = 10.0)]
    y_margin: f32,

    /// Side of the white square hiding the question number (px, 0 = off).
    #[arg(long, default_value_t = 50)]
    mask: u32,

    /// Do not wait for question 1 at section starts.
    #[arg(long)]
    no_recover: bool,

    /// PDFs processed in parallel.
    #[arg(short, long, env = "EXAMCROP_JOBS", default_value_t = 1)]
    jobs: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "EXAMCROP_PASSWORD")]
    password: Option<String>,

    /// Disable the progress bar.
    #[arg(long, env = "EXAMCROP_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct AuditArgs {
    #[command(flatten)]
    tree: TreeArgs,
}

#[derive(Args, Debug)]
struct ScaffoldArgs {
    /// Root of the exam tree to mirror.
    #[arg(long, env = "EXAMCROP_EXAM_ROOT", default_value = "EXAM_PDFS")]
    exam_root: PathBuf,

    /// Start marker written into every entry.
    #[arg(long, default_value = DEFAULT_START_MARKER)]
    start_text: String,

    /// Write to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Run(args) => {
            let show_progress = !cli.quiet && !args.no_progress && !args.tree.json;
            init_logging(&cli, show_progress, true)?;
            run_command(&cli, args, show_progress).await
        }
        Command::Audit(args) => {
            init_logging(&cli, false, true)?;
            audit_command(args)
        }
        Command::Scaffold(args) => {
            init_logging(&cli, false, false)?;
            scaffold_command(args)
        }
    }
}

// ── Logging setup ────────────────────────────────────────────────────────────

/// Terminal logs go to stderr; the conversion and process targets also go
/// to their own files in `--log-dir`.
fn init_logging(cli: &Cli, show_progress: bool, with_files: bool) -> Result<()> {
    // The progress bar already reports per-PDF progress; keep INFO noise off
    // the terminal while it is shown.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    if !with_files {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(());
    }

    std::fs::create_dir_all(&cli.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", cli.log_dir))?;
    let open = |name: &str| -> Result<File> {
        let path = cli.log_dir.join(name);
        File::create(&path).with_context(|| format!("Failed to open log file {:?}", path))
    };

    let conversion_layer = fmt::layer()
        .with_writer(Mutex::new(open(CONVERSION_LOG)?))
        .with_ansi(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == CONVERSION_TARGET));
    let process_layer = fmt::layer()
        .with_writer(Mutex::new(open(PROCESS_LOG)?))
        .with_ansi(false)
        .with_target(false)
        .without_time()
        .with_level(false)
        .with_filter(filter_fn(|meta| meta.target() == PROCESS_TARGET));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(conversion_layer)
        .with(process_layer)
        .init();
    Ok(())
}

// ── Subcommands ──────────────────────────────────────────────────────────────

fn collect_jobs(tree: &TreeArgs) -> Result<Vec<PdfJob>> {
    match &tree.pdf {
        Some(pdf) => {
            let job = PdfJob::from_path(&tree.exam_root, pdf)
                .with_context(|| format!("Cannot place {:?} in the exam tree", pdf))?;
            Ok(vec![job])
        }
        None => discover(&tree.exam_root, tree.exam.as_deref())
            .with_context(|| format!("Failed to scan exam root {:?}", tree.exam_root)),
    }
}

async fn run_command(cli: &Cli, args: &RunArgs, show_progress: bool) -> Result<()> {
    let catalog = ConfigCatalog::load(&args.tree.config)
        .with_context(|| format!("Failed to load catalog {:?}", args.tree.config))?;
    let jobs = collect_jobs(&args.tree)?;

    let mut builder = CropConfig::builder()
        .dpi(args.dpi)
        .crop_width(args.crop_width)
        .x_margin(args.x_margin)
        .y_margin(args.y_margin)
        .mask_size(Some(args.mask))
        .recover_first_question(!args.no_recover)
        .concurrency(args.jobs);
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.clone());
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new() as Arc<dyn RunProgressCallback>;
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let summary = run(jobs, Arc::new(catalog), &config, &args.tree.output).await;

    if args.tree.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_run_summary(&summary, &args.tree.output, &cli.log_dir);
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary, output: &Path, log_dir: &Path) {
    let ok = summary.reports.len();
    let total = summary.total_pdfs();
    eprintln!(
        "{}  {}/{} PDFs  {} images written  {}ms  →  {}",
        if summary.failures.is_empty() { green("✔") } else { cyan("⚠") },
        ok,
        total,
        bold(&summary.written().to_string()),
        summary.duration_ms,
        bold(&output.display().to_string()),
    );
    let missing = summary.missing();
    let anomalies = summary.anomalies();
    if missing > 0 || anomalies > 0 {
        eprintln!(
            "   {} missing questions  /  {} height anomalies  -  see {}",
            red(&missing.to_string()),
            cyan(&anomalies.to_string()),
            dim(&log_dir.join(PROCESS_LOG).display().to_string()),
        );
    }
    for f in &summary.failures {
        eprintln!("   {} {}", red("✗"), f.error);
    }
}

fn audit_command(args: &AuditArgs) -> Result<()> {
    let catalog = ConfigCatalog::load(&args.tree.config)
        .with_context(|| format!("Failed to load catalog {:?}", args.tree.config))?;
    let jobs = collect_jobs(&args.tree)?;
    let summary = audit(&jobs, &catalog, &args.tree.output);

    if args.tree.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise audit")?
        );
        return Ok(());
    }

    for a in &summary.audits {
        let mark = if a.is_complete() { green("✓") } else { red("✗") };
        println!("{} {}", mark, a.job.path.display());
        for s in &a.sections {
            let expected = s
                .expected
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string());
            let gaps = if s.missing.is_empty() {
                String::new()
            } else {
                format!("  missing {:?}", s.missing)
            };
            println!(
                "    {:<32} {:>3}/{:<3}{}",
                s.output_name,
                s.present.len(),
                expected,
                red(&gaps)
            );
        }
    }
    for f in &summary.failures {
        println!("{} {}", red("✗"), f.error);
    }
    eprintln!(
        "{} PDFs audited, {} questions missing, {} PDFs without configuration",
        summary.audits.len(),
        summary.missing(),
        summary.failures.len()
    );
    Ok(())
}

fn scaffold_command(args: &ScaffoldArgs) -> Result<()> {
    let yaml = scaffold(&args.exam_root, &args.start_text)
        .with_context(|| format!("Failed to scaffold from {:?}", args.exam_root))?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &yaml).with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!("{} catalog skeleton written to {}", green("✔"), path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
