use clap::{Parser, Subcommand};
use pixlift::{config, discover, output, pipeline, store};
use std::path::PathBuf;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pixlift")]
#[command(about = "Batch image optimizer and uploader for static sites")]
#[command(long_about = "\
Batch image optimizer and uploader for static sites

Pixlift walks a content directory, renders every image into a set of
resize/quality profiles encoded as AVIF, uploads each variant to your media
host, and records the hosted URLs in a local mapping store. Images already
in the store are skipped, so runs are incremental; deleting a source image
prunes its entry on the next run.

State files (under --state-dir, default .pixlift inside the source):

  mapping.json             # basename → hosted variant URLs + source analysis
  processing-report.json   # what the last run did
  cleanup-report.json      # what the last reconciliation pruned

An image either ends up in the store with every profile hosted, or not at
all: a failure in any variant drops the whole image from this run and it is
retried from scratch next time.

Configuration is read from pixlift.toml at the source root; every key is
optional. Run 'pixlift gen-config' to print a documented stock file.

The media host API key comes from --api-key or the PIXLIFT_API_KEY
environment variable.")]
#[command(version = version_string())]
struct Cli {
    /// Content directory to scan for images
    #[arg(long, default_value = "content", global = true)]
    source: PathBuf,

    /// State directory for the mapping store and reports
    /// (default: .pixlift under the source directory)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Show debug-level events (skips, per-variant progress)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize and upload every new image, then update the mapping store
    Run {
        /// Media host API key; falls back to PIXLIFT_API_KEY
        #[arg(long)]
        api_key: Option<String>,
    },
    /// List candidate images, marking those already hosted
    Discover,
    /// Prune store entries whose source image no longer exists
    Reconcile,
    /// Print a stock pixlift.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let state_dir = cli
        .state_dir
        .clone()
        .unwrap_or_else(|| cli.source.join(".pixlift"));

    match cli.command {
        Command::Run { api_key } => {
            let config = config::load_config(&cli.source)?;
            let api_key = resolve_api_key(api_key, std::env::var("PIXLIFT_API_KEY").ok())?;
            let sink = output::ConsoleSink::verbose(cli.verbose);
            let report = pipeline::run(&cli.source, &state_dir, &config, &api_key, &sink)?;
            output::print_run_summary(&report);
        }
        Command::Discover => {
            let config = config::load_config(&cli.source)?;
            let store = store::MappingStore::load(&state_dir)?;
            let candidates = discover::discover_images(&cli.source, &config.discovery)?;
            output::print_discover_listing(&candidates, &store);
        }
        Command::Reconcile => {
            let config = config::load_config(&cli.source)?;
            std::fs::create_dir_all(&state_dir)?;
            let mut store = store::MappingStore::load(&state_dir)?;
            let candidates = discover::discover_images(&cli.source, &config.discovery)?;
            let cleanup = store.reconcile(&discover::basenames(&candidates));
            store.save(&state_dir)?;
            cleanup.save(&state_dir)?;
            output::print_cleanup_summary(&cleanup);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Resolve the media host API key: the `--api-key` flag wins, then the
/// `PIXLIFT_API_KEY` environment variable. An empty value counts as unset.
fn resolve_api_key(
    flag: Option<String>,
    env: Option<String>,
) -> Result<String, pipeline::PipelineError> {
    flag.or(env)
        .filter(|key| !key.is_empty())
        .ok_or(pipeline::PipelineError::MissingApiKey)
}
