use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use bandfilter::errors::ErrorCategory;
use bandfilter::histogram::{Channel, Histogram};
use bandfilter::profiler::with_profiler;
use bandfilter::{logging, partition, FilterError, FilterKind, Session, Settings};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bandfilter")]
#[command(version, about = "Band-parallel 5x5 image filter with before/after histograms", long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug output including per-band timings
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter an image and save the result
    Apply {
        /// Input image (BMP, JPEG or PNG)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file; defaults to <input>_processed.<ext>
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Number of worker threads (1-64)
        #[arg(short = 'j', long, value_name = "N")]
        threads: Option<u32>,

        /// Filter to apply
        #[arg(short, long, value_enum)]
        filter: Option<FilterKind>,

        /// Write histogram_before.png and histogram_after.png into this directory
        #[arg(long, value_name = "DIR")]
        histograms: Option<PathBuf>,

        /// Print a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compute the channel histogram of an image
    Histogram {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Render the histogram as a PNG chart
        #[arg(long, value_name = "FILE")]
        render: Option<PathBuf>,

        /// Print all 256 levels per channel as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show how rows would be split between workers
    Bands {
        height: u32,
        workers: u32,
    },

    /// Write the effective settings to the config directory
    SaveConfig,
}

const CHART_HEIGHT: u32 = 256;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<FilterError>() {
                Some(err) => {
                    eprintln!("Error [{}]: {}", err.error_code(), err.user_message());
                    match err.category() {
                        ErrorCategory::Input => ExitCode::from(2),
                        _ => ExitCode::FAILURE,
                    }
                }
                None => {
                    eprintln!("Error: {:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    logging::init_tracing(cli.debug);
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    let debug = cli.debug || settings.debug_logging;
    if debug && !cli.debug {
        logging::set_debug(true);
    }

    match cli.command {
        Commands::Apply { input, out, threads, filter, histograms, json } => {
            let mut settings = settings;
            if let Some(threads) = threads {
                settings.worker_count = threads;
            }
            if let Some(filter) = filter {
                settings.filter = filter;
            }
            run_apply(Session::new(settings), &input, out, histograms.as_deref(), json)?;
        }
        Commands::Histogram { input, render, json } => {
            let mut session = Session::new(settings);
            session.load(&input)?;
            let histogram = session.histogram_before()?;
            if let Some(path) = render {
                save_chart(&histogram, &path)?;
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&histogram.report())?);
            } else {
                print_histogram_summary("image", &histogram);
            }
        }
        Commands::Bands { height, workers } => {
            for (i, band) in partition(height, workers).iter().enumerate() {
                println!("worker {:>2}: rows {} ({} rows)", i, band, band.len());
            }
        }
        Commands::SaveConfig => {
            let path = settings.save()?;
            println!("Settings written to {}", path.display());
        }
    }

    if debug {
        print_profile();
    }
    Ok(())
}

fn run_apply(
    mut session: Session,
    input: &Path,
    out: Option<PathBuf>,
    histogram_dir: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let filter = session.settings().filter;
    session.load(input)?;
    let before = session.histogram_before()?;

    let result = session.apply_filter(&filter)?.clone();
    let after = session.histogram_after()?;

    let out = match out {
        Some(path) => path,
        None => session.default_output_path()?,
    };
    session.save(&out)?;

    if let Some(dir) = histogram_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        save_chart(&before, &dir.join("histogram_before.png"))?;
        save_chart(&after, &dir.join("histogram_after.png"))?;
    }

    if json {
        let summary = serde_json::json!({
            "input": input,
            "output": out,
            "filter": filter.name(),
            "workers": session.settings().worker_count(),
            "elapsed_ms": result.elapsed.as_secs_f64() * 1000.0,
            "bands": result.bands,
            "bands_completed": result.bands_completed,
            "failures": result.failures.iter().map(|f| serde_json::json!({
                "band": f.band,
                "error": f.error.to_string(),
            })).collect::<Vec<_>>(),
            "histogram_before": before.report(),
            "histogram_after": after.report(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Filter '{}' applied in {:.2} ms using {} bands",
            filter.name(),
            result.elapsed.as_secs_f64() * 1000.0,
            result.bands.len()
        );
        for failure in &result.failures {
            eprintln!("warning: {}", failure.to_error());
        }
        print_histogram_summary("before", &before);
        print_histogram_summary("after", &after);
        println!("Saved {}", out.display());
    }

    Ok(())
}

fn save_chart(histogram: &Histogram, path: &Path) -> anyhow::Result<()> {
    histogram
        .render(CHART_HEIGHT)
        .save(path)
        .with_context(|| format!("writing histogram chart {}", path.display()))
}

fn print_histogram_summary(label: &str, histogram: &Histogram) {
    let means: Vec<String> = Channel::ALL
        .iter()
        .map(|c| format!("{} {:.1}", c.name(), histogram.mean(*c).unwrap_or(0.0)))
        .collect();
    println!(
        "{:<7} {} pixels, peak {}, mean {}",
        label,
        histogram.total(Channel::Blue),
        histogram.max_count(),
        means.join(" / ")
    );
}

fn print_profile() {
    let stats = with_profiler(|p| p.get_stats());
    for (name, m) in &stats.measurements {
        eprintln!("{:<16} {:>4}x avg {:>8.2} ms", name, m.count, m.average_time.as_secs_f64() * 1000.0);
    }
    for (name, count) in &stats.counters {
        eprintln!("{:<16} {:>4}", name, count);
    }
}
