use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flagcluster::core::scanner::{FlagFile, FlagScanner};
use flagcluster::{ClusterPipeline, OutputDocument, PipelineConfig, ReportService};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(
    name = "flagcluster",
    version,
    about = "Group flag images by their average color"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute mean colors, cluster them and write the JSON document
    Run {
        #[command(flatten)]
        input: InputArgs,
        /// Output JSON document
        #[arg(short, long, value_name = "FILE", default_value = "state_flags_data.json")]
        output: PathBuf,
        /// Number of clusters
        #[arg(short = 'k', long, default_value_t = 4)]
        clusters: usize,
        /// Seed for k-means initialization
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Number of k-means restarts
        #[arg(long, default_value_t = 10)]
        n_init: usize,
        /// Maximum Lloyd iterations per restart
        #[arg(long, default_value_t = 300)]
        max_iter: usize,
        /// Decode images one at a time instead of on the thread pool
        #[arg(long)]
        sequential: bool,
        /// Print the result without writing the document
        #[arg(long)]
        dry_run: bool,
    },

    /// List the images that would be processed
    Scan {
        #[command(flatten)]
        input: InputArgs,
    },

    /// List the clusters in an existing output document
    Clusters {
        /// JSON document written by `run`
        #[arg(short, long, value_name = "FILE", default_value = "state_flags_data.json")]
        output: PathBuf,
    },

    /// Show one flag's color and how close it sits to each centroid
    Show {
        /// Display name, e.g. "new york"
        name: String,
        /// JSON document written by `run`
        #[arg(short, long, value_name = "FILE", default_value = "state_flags_data.json")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Directory of flag images
    #[arg(short, long, value_name = "DIR", default_value = "state_flags_png")]
    input: PathBuf,
    /// File extensions to include (repeatable)
    #[arg(long = "ext", value_name = "EXT", default_values_t = vec!["png".to_string()])]
    extensions: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            output,
            clusters,
            seed,
            n_init,
            max_iter,
            sequential,
            dry_run,
        } => {
            let config = PipelineConfig {
                input_dir: input.input,
                output_path: output,
                clusters,
                seed,
                n_init,
                max_iter,
                extensions: input.extensions,
                parallel: !sequential,
            };
            run(config, dry_run)?;
        }

        Commands::Scan { input } => {
            println!("▶ Scanning for flags in: {}", input.input.display());
            let files = scan_directory(&input.input, &input.extensions)?;
            println!("Found {} image(s):", files.len());
            for file in &files {
                println!("   ▶ {:<24} {}", file.name, file.path.display());
            }
        }

        Commands::Clusters { output } => {
            let document = load_document(&output)?;
            let summaries = ReportService::new().summarize(&document);
            println!(
                "🗂️  {} flag(s) in {} cluster(s):",
                document.records.len(),
                summaries.len()
            );
            for summary in summaries {
                println!(
                    "\n✨ Cluster {} ({}, {}) with {} member(s)",
                    summary.index + 1,
                    summary.centroid.to_hex(),
                    summary.centroid,
                    summary.members.len()
                );
                for name in &summary.members {
                    println!("   ▶ {}", name);
                }
            }
        }

        Commands::Show { name, output } => {
            let document = load_document(&output)?;
            let Some(placement) = ReportService::new().place(&document, &name) else {
                anyhow::bail!("No flag named '{}' in {}", name, output.display());
            };
            let record = &placement.record;
            println!("🏳️  {}", record.name);
            println!("     file:    {}", record.source_path);
            println!("     color:   {} ({})", record.color.to_hex(), record.color);
            println!(
                "     cluster: {} (distance {:.4})",
                record.cluster_id + 1,
                placement.own_distance
            );
            if let Some((other, distance)) = placement.nearest_other {
                println!(
                    "     nearest other cluster: {} (distance {:.4})",
                    other + 1,
                    distance
                );
            }
        }
    }

    Ok(())
}

fn run(config: PipelineConfig, dry_run: bool) -> Result<()> {
    println!("▶ Clustering flags in: {}", config.input_dir.display());
    let files = scan_directory(&config.input_dir, &config.extensions)?;
    if config.clusters > files.len() {
        anyhow::bail!(
            "Cluster count {} exceeds the number of images ({})",
            config.clusters,
            files.len()
        );
    }

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let bar_handle = bar.clone();

    let pipeline = ClusterPipeline::from_config(config).with_progress(Box::new(
        move |file: &FlagFile| {
            bar_handle.set_message(file.name.clone());
            bar_handle.inc(1);
        },
    ));

    println!("▶ Computing mean colors of {} image(s)…", files.len());
    let colors = benchmark("reducing images", || pipeline.reduce(&files))
        .context("Failed to compute mean colors")?;
    bar.finish_with_message("done");

    let document = benchmark("k-means clustering", || {
        pipeline.cluster(files.into_iter().zip(colors).collect())
    })
    .context("Failed to cluster colors")?;

    let sizes = document.members();
    for (i, centroid) in document.centroids.iter().enumerate() {
        println!(
            "   ✨ Cluster {}: {} ({}) × {}",
            i + 1,
            centroid.to_hex(),
            centroid,
            sizes[i].len()
        );
    }

    let output = &pipeline.config().output_path;
    if dry_run {
        println!("\n⚠️  Dry-run only; {} was not written.", output.display());
    } else {
        document
            .write(output)
            .with_context(|| format!("Failed to write {:?}", output))?;
        println!(
            "\n✅ Saved {} with {} states and {} clusters.",
            output.display(),
            document.records.len(),
            document.centroids.len()
        );
    }
    Ok(())
}

/// List images in `dir` behind a spinner.
fn scan_directory(dir: &Path, extensions: &[String]) -> Result<Vec<FlagFile>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = FlagScanner::new(extensions).scan(dir);
    spinner.finish_and_clear();
    result.with_context(|| format!("Failed to scan {:?}", dir))
}

fn load_document(path: &Path) -> Result<OutputDocument> {
    OutputDocument::read(path).with_context(|| format!("Could not load document {:?}", path))
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
