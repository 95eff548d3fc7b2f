use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use tabsort::config::Config;
use tabsort::dataset::{self, PairScan};
use tabsort::detection::{self, Detector, YoloDetector};
use tabsort::marketplace::{AssetLog, Collector, Credentials, MarketplaceClient, SearchQuery};
use tabsort::pipeline::{BatchSummary, SortPipeline};
use tabsort::web::{self, AppState};
use tabsort::{logging, sorting};

#[derive(Parser)]
#[command(name = "tabsort")]
#[command(about = "Collect beverage can photos and sort them by pull-tab presence")]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(long, env = "EBAY_APP_ID", hide_env_values = true)]
    app_id: Option<String>,

    #[arg(long, env = "EBAY_CERT_ID", hide_env_values = true)]
    cert_id: Option<String>,
}

impl CredentialArgs {
    fn credentials(&self) -> Option<Credentials> {
        match (&self.app_id, &self.cert_id) {
            (Some(app_id), Some(cert_id)) => Some(Credentials {
                app_id: app_id.clone(),
                cert_id: cert_id.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Search listings and download their images
    Fetch {
        #[arg(long)]
        keyword: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// Run the detector over a directory and move images into the two bins
    Sort {
        #[arg(long, value_name = "DIR")]
        input: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Letterbox every image under INPUT into OUTPUT
    Pad {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        size: Option<u32>,
    },
    /// Move files into numbered batch folders for labelling
    Batch {
        source: PathBuf,
        dest: PathBuf,
        #[arg(long)]
        size: Option<usize>,
    },
    /// Move sorted images back into the parent directory
    Revert {
        dir: Option<PathBuf>,
    },
    /// Copy image/label pairs into train, val and test subsets
    Split {
        #[arg(long, requires = "labels", conflicts_with_all = ["pre_batch", "post_batch"])]
        images: Option<PathBuf>,
        #[arg(long, requires = "images")]
        labels: Option<PathBuf>,
        #[arg(long, requires = "post_batch")]
        pre_batch: Option<PathBuf>,
        #[arg(long, requires = "pre_batch")]
        post_batch: Option<PathBuf>,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Serve the fetch and sort jobs over HTTP
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, value_name = "FILE")]
        model: Option<PathBuf>,
        #[command(flatten)]
        credentials: CredentialArgs,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    logging::init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Fetch {
            keyword,
            category,
            credentials,
        } => {
            let credentials = credentials
                .credentials()
                .context("EBAY_APP_ID and EBAY_CERT_ID must be set")?;
            let mut collector = build_collector(&config, credentials)?;
            let summary = collector.run(SearchQuery { keyword, category }).await?;

            println!("\n=== Fetch Results ===");
            println!("Items found: {}", summary.items);
            println!("Downloaded: {}", summary.downloaded);
            println!("Already present: {}", summary.already_present);
            println!("Failed: {}", summary.failed);
            println!("Total logged: {}", summary.total_logged);
        }
        Command::Sort {
            input,
            model,
            threshold,
            debug_out,
        } => {
            let detector = load_detector(model.as_deref().unwrap_or(&config.paths.model))?;
            let mut settings = config.sort_settings();
            if let Some(threshold) = threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    anyhow::bail!("threshold {} is outside [0, 1]", threshold);
                }
                settings.threshold = threshold;
            }

            let mut pipeline = SortPipeline::new(detector, config.sort_dirs())
                .with_settings(settings)
                .with_verbose(args.verbose);
            if let Some(debug_dir) = debug_out {
                pipeline = pipeline.with_debug(debug_dir)?;
            }

            let input = input.unwrap_or_else(|| config.paths.images_dir.clone());
            let summary = pipeline.run(&input)?;

            println!("\n=== Sort Results ===");
            println!("With tabs: {}", summary.present);
            println!("Without tabs: {}", summary.absent);
            print_batch(&summary.batch, args.verbose);
        }
        Command::Pad {
            input,
            output,
            size,
        } => {
            let size = size.unwrap_or(config.pad.size);
            let summary =
                detection::pad_directory(&input, &output, size, config.pad.filter.into())?;
            println!("\n=== Pad Results ({}x{}) ===", size, size);
            print_batch(&summary, args.verbose);
        }
        Command::Batch { source, dest, size } => {
            let size = size.unwrap_or(config.dataset.batch_size);
            let summary = dataset::create_batches(&source, &dest, size)?;
            println!("\n=== Batch Results ===");
            print_batch(&summary, args.verbose);
        }
        Command::Revert { dir } => {
            let dir = dir.unwrap_or_else(|| config.paths.sorted_dir.clone());
            let dirs =
                sorting::SortDirs::new(&dir, &config.sort.present_dir, &config.sort.absent_dir);
            let summary = sorting::revert_sorted(&dir, &dirs)?;
            println!("\n=== Revert Results ===");
            print_batch(&summary, args.verbose);
        }
        Command::Split {
            images,
            labels,
            pre_batch,
            post_batch,
            output,
            seed,
        } => {
            let scan: PairScan = match (images, labels, pre_batch, post_batch) {
                (Some(images), Some(labels), None, None) => {
                    dataset::collect_pairs(&images, &labels)?
                }
                (None, None, Some(pre), Some(post)) => {
                    dataset::collect_batched_pairs(&pre, &post)?
                }
                _ => anyhow::bail!("pass either --images/--labels or --pre-batch/--post-batch"),
            };
            let missing = scan.missing.len();
            let split = dataset::partition(
                scan.pairs,
                config.dataset.ratios(),
                seed.unwrap_or(config.dataset.seed),
            )?;
            let output = output.unwrap_or_else(|| config.dataset.output_dir.clone());
            let report = dataset::write_split(&split, &output)?;

            println!("\n=== Split Results ===");
            println!("Train: {}", report.train);
            println!("Val: {}", report.val);
            println!("Test: {}", report.test);
            println!("Images without labels: {}", missing);
            if report.failed > 0 {
                println!("Pairs that failed to copy: {}", report.failed);
            }
        }
        Command::Serve {
            bind,
            model,
            credentials,
        } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let mut state = AppState::new(config.clone());

            match load_detector(model.as_deref().unwrap_or(&config.paths.model)) {
                Ok(detector) => state = state.with_detector(detector),
                Err(e) => tracing::warn!("Sorting disabled: {:#}", e),
            }
            match credentials.credentials() {
                Some(credentials) => {
                    state = state.with_collector(build_collector(&config, credentials)?)
                }
                None => tracing::warn!("Fetching disabled: EBAY_APP_ID / EBAY_CERT_ID not set"),
            }

            web::serve(state, &bind)
                .await
                .with_context(|| format!("HTTP server on {} failed", bind))?;
        }
    }

    Ok(())
}

fn load_detector(model: &Path) -> anyhow::Result<Arc<dyn Detector>> {
    let detector = YoloDetector::load(model)
        .with_context(|| format!("Failed to load detection model {}", model.display()))?;
    Ok(Arc::new(detector))
}

fn build_collector(config: &Config, credentials: Credentials) -> anyhow::Result<Collector> {
    let client = MarketplaceClient::new(config.marketplace.clone(), credentials)?;
    let log = AssetLog::open(&config.paths.asset_log);
    Ok(Collector::new(client, log, &config.paths.images_dir))
}

fn print_batch(summary: &BatchSummary, verbose: bool) {
    println!("Processed: {}", summary.processed);
    println!("Skipped: {}", summary.skipped);
    println!("Failed: {}", summary.failed);

    if verbose && !summary.issues.is_empty() {
        println!("\nIssues:");
        for issue in &summary.issues {
            println!("  {:?} {} - {}", issue.kind, issue.path.display(), issue.message);
        }
    }
}
