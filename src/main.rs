use clap::{Parser, Subcommand, ValueEnum};
use sitepush::build::Builder;
use sitepush::config::{self, Overrides, PublishConfig};
use sitepush::output;
use sitepush::remote::S3Store;
use sitepush::store::{DirectoryStore, DryRunStore, NullStore, ObjectStore, StoreError};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

fn version_string() -> &'static str {
    let on_tag = env!("SITEPUSH_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("SITEPUSH_GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup; called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "sitepush")]
#[command(about = "Build markdown and CSS into a static site and publish what changed")]
#[command(long_about = "\
Build markdown and CSS into a static site and publish what changed

Every markdown file becomes an HTML page at the same relative path; every
stylesheet is minified into css/ and linked from every page. Before
uploading, the store is read back and hashed, so only artifacts whose bytes
differ are written.

Source structure:

  markdown/                     build/
  ├── index.md          →       ├── index.html
  └── notes/                    ├── notes/
      └── first-post.md →       │   └── first-post.html
  css/                          └── css/
  └── site.css          →           └── site.css

Front matter (optional, must open the file):

  ---
  tags:
    - rust
  created: 2024-03-02 18:05
  ---

Run 'sitepush gen-config' to generate a documented sitepush.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./sitepush.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Markdown source directory
    #[arg(long, global = true)]
    markdown_dir: Option<PathBuf>,

    /// Stylesheet source directory
    #[arg(long, global = true)]
    css_dir: Option<PathBuf>,

    /// Output directory
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// S3 bucket to publish into
    #[arg(long, global = true)]
    bucket: Option<String>,

    /// S3 region of the bucket (default: us-east-2)
    #[arg(long, global = true)]
    region: Option<String>,

    /// Publish into a directory instead of an S3 bucket
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Build locally without writing to the store
    #[arg(long, global = true)]
    disable_upload: bool,

    /// Parallel uploads per batch
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the site and upload changed artifacts
    Build {
        /// Also write the build report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Validate sources without writing output or touching the store
    Check,
    /// Print a stock sitepush.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match &cli.command {
        Command::Build { report } => {
            let config = resolve_config(&cli)?;
            config.validate()?;
            let store = open_store(&config)?;
            let builder = Builder::new(config, store);
            install_interrupt_handler(&builder);

            info!(output = %builder.config().output_dir.display(), "building");
            let result = builder.run()?;
            output::print_build_report(&result);
            if let Some(path) = report {
                let json = serde_json::to_string_pretty(&result)?;
                std::fs::write(path, json)?;
                info!(path = %path.display(), "build report written");
            }
        }
        Command::Check => {
            let mut config = resolve_config(&cli)?;
            config.upload.enabled = false;
            config.validate()?;
            let report = Builder::new(config, Box::new(NullStore)).check()?;
            output::print_check_report(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// File config with command-line flags applied on top. Not yet validated.
fn resolve_config(cli: &Cli) -> Result<PublishConfig, config::ConfigError> {
    let overrides = Overrides {
        markdown_dir: cli.markdown_dir.clone(),
        css_dir: cli.css_dir.clone(),
        output_dir: cli.output.clone(),
        bucket: cli.bucket.clone(),
        region: cli.region.clone(),
        store_dir: cli.store_dir.clone(),
        disable_upload: cli.disable_upload,
        concurrency: cli.concurrency,
    };
    Ok(config::load_config(cli.config.as_deref())?.with_overrides(&overrides))
}

/// Pick the store once, so the build never checks whether uploading is on.
fn open_store(config: &PublishConfig) -> Result<Box<dyn ObjectStore>, StoreError> {
    let upload = &config.upload;
    let store: Box<dyn ObjectStore> = match (&upload.bucket, &upload.directory) {
        (Some(bucket), _) => {
            info!(bucket = %bucket, region = %upload.region, "using S3 bucket");
            Box::new(S3Store::open(bucket, &upload.region)?)
        }
        (None, Some(dir)) => {
            info!(directory = %dir.display(), "using directory store");
            Box::new(DirectoryStore::new(dir))
        }
        (None, None) => return Ok(Box::new(NullStore)),
    };
    if upload.enabled {
        Ok(store)
    } else {
        info!("uploading disabled; comparing against the store only");
        Ok(Box::new(DryRunStore::new(store)))
    }
}

/// Ctrl-C stops the run at the next file or upload boundary.
fn install_interrupt_handler(builder: &Builder) {
    let flag = builder.guard().interrupt_flag();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitepush=info",
        1 => "sitepush=debug",
        _ => "sitepush=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
