//! memorybox — thin CLI front-end over the library (spec section 6, "CLI
//! surface (treated as external collaborator)"). Flag/subcommand wiring here
//! is not spec-governed; its job is to exercise the library end-to-end.

use clap::{Parser, Subcommand};
use memorybox::config::{store_for_target, TargetsFile};
use memorybox::context::{Context, DEFAULT_CONCURRENCY};
use memorybox::error::Result;
use memorybox::logger::Logger;
use memorybox::ops;
use memorybox::store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn version_long() -> &'static str {
    static V: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    V.get_or_init(|| format!("{} (built {})", env!("CARGO_PKG_VERSION"), env!("MEMORYBOX_BUILD_TIME")))
}

/// memorybox — content-addressable archival tool
#[derive(Parser, Debug)]
#[command(name = "memorybox")]
#[command(version = version_long())]
#[command(author, about, long_about = None)]
struct Cli {
    /// Path to the YAML target-config file
    #[arg(long, global = true, value_name = "FILE", default_value = "memorybox.yaml")]
    config: PathBuf,

    /// Enable verbose diagnostic logging
    #[arg(long, global = true)]
    debug: bool,

    /// Bounded parallelism for multi-file operations
    #[arg(long, global = true, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
    max: usize,

    /// Target name to operate against (single-target commands)
    #[arg(long, global = true, value_name = "NAME", default_value = "default")]
    target: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the version string
    Version,
    /// Compute the content-addressed name of one or more inputs without storing them
    Hash { inputs: Vec<String> },
    /// Retrieve a datafile by prefix and write it to stdout
    Get { reference: String },
    /// Store one or more inputs (paths, URLs, or `-` for stdin)
    Put {
        inputs: Vec<String>,
        #[arg(long)]
        import_from: Option<String>,
    },
    /// Delete a datafile/metafile pair by prefix
    Delete { reference: String },
    /// Print or mutate a metafile
    Meta {
        reference: String,
        #[command(subcommand)]
        action: Option<MetaAction>,
    },
    /// Dump or rebuild the metafile index
    Index {
        #[command(subcommand)]
        action: Option<IndexAction>,
    },
    /// Bulk-import a manifest under a named source
    Import { name: String, manifest: PathBuf },
    /// Run a structural integrity check
    Check {
        #[arg(value_enum)]
        mode: CheckModeArg,
    },
    /// Copy files from one target to another
    Sync {
        #[arg(value_enum)]
        mode: SyncModeArg,
        src_target: String,
        dst_target: String,
    },
    /// Show the symmetric difference between two targets' name listings
    Diff { src_target: String, dst_target: String },
}

#[derive(Subcommand, Debug)]
enum MetaAction {
    Set { key: String, value: String },
    Delete { key: String },
}

#[derive(Subcommand, Debug)]
enum IndexAction {
    Update,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CheckModeArg {
    Pairing,
    Metafiles,
    Datafiles,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SyncModeArg {
    All,
    Metafiles,
    Datafiles,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("memorybox=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("memorybox=warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> std::process::ExitCode {
    let ctx = Context::new();
    let logger = Logger::stdio(cli.debug);

    let signal_ctx = ctx.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_ctx.cancel();
    });

    match run(&cli, &ctx, &logger).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        // A user-requested cancellation exits silently, after the grace
        // period operations need to unwind cooperatively.
        Err(e) if e.is_cancelled() => {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            logger.err(format!("error: {e}"));
            std::process::ExitCode::FAILURE
        }
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn load_store(cli: &Cli, target_name: &str) -> Result<Box<dyn Store>> {
    let text = tokio::fs::read_to_string(&cli.config).await?;
    let targets = TargetsFile::parse(&text)?;
    store_for_target(targets.target(target_name)?).await
}

async fn run(cli: &Cli, ctx: &Context, logger: &Logger) -> Result<()> {
    match &cli.command {
        Command::Version => {
            logger.out(version_long());
            Ok(())
        }

        Command::Hash { inputs } => {
            let http = reqwest::Client::new();
            for input in inputs {
                let file = memorybox::fetch::fetch_one(&http, input).await?;
                logger.out(file.name());
            }
            Ok(())
        }

        Command::Get { reference } => {
            let store = load_store(cli, &cli.target).await?;
            let mut file = ops::get::get(&store, ctx, reference).await?;
            let bytes = file.read_to_end().await?;
            use std::io::Write;
            std::io::stdout().write_all(&bytes)?;
            Ok(())
        }

        Command::Put { inputs, import_from } => {
            let store = load_store(cli, &cli.target).await?;
            let http = reqwest::Client::new();
            for input in inputs {
                let file = memorybox::fetch::fetch_one(&http, input).await?;
                let name = file.name().to_string();
                ops::put::put(&store, ctx, file, import_from.as_deref()).await?;
                logger.out(name);
            }
            Ok(())
        }

        Command::Delete { reference } => {
            let store = load_store(cli, &cli.target).await?;
            ops::delete::delete(&store, ctx, reference).await
        }

        Command::Meta { reference, action } => {
            let store = load_store(cli, &cli.target).await?;
            match action {
                None => {
                    let meta = ops::meta::meta_get(&store, ctx, reference).await?;
                    logger.out(String::from_utf8_lossy(&meta.meta_bytes()));
                    Ok(())
                }
                Some(MetaAction::Set { key, value }) => ops::meta::meta_set(&store, ctx, reference, key, value).await,
                Some(MetaAction::Delete { key }) => ops::meta::meta_delete(&store, ctx, reference, key).await,
            }
        }

        Command::Index { action } => {
            let store = load_store(cli, &cli.target).await?;
            match action {
                None => {
                    let lines = ops::index::index(&store, ctx, cli.max).await?;
                    for line in lines {
                        logger.out(String::from_utf8_lossy(&line));
                    }
                    Ok(())
                }
                Some(IndexAction::Update) => {
                    let reader = tokio::io::BufReader::new(tokio::io::stdin());
                    ops::index::index_update(&store, ctx, cli.max, reader).await
                }
            }
        }

        Command::Import { name, manifest } => {
            let store: Arc<dyn Store> = Arc::from(load_store(cli, &cli.target).await?);
            let manifest_text = tokio::fs::read_to_string(manifest).await?;
            ops::import::import(store, ctx, logger, reqwest::Client::new(), cli.max, name, &manifest_text).await
        }

        Command::Check { mode } => {
            let store = load_store(cli, &cli.target).await?;
            let mode = match mode {
                CheckModeArg::Pairing => ops::check::CheckMode::Pairing,
                CheckModeArg::Metafiles => ops::check::CheckMode::Metafiles,
                CheckModeArg::Datafiles => ops::check::CheckMode::Datafiles,
            };
            let report = ops::check::check(&store, ctx, logger, cli.max, mode).await?;
            for finding in &report.findings {
                logger.out(finding);
            }
            Ok(())
        }

        Command::Sync { mode, src_target, dst_target } => {
            let source = load_store(cli, src_target).await?;
            let dest = load_store(cli, dst_target).await?;
            let mode = match mode {
                SyncModeArg::All => ops::sync::SyncMode::All,
                SyncModeArg::Metafiles => ops::sync::SyncMode::Metafiles,
                SyncModeArg::Datafiles => ops::sync::SyncMode::Datafiles,
            };
            ops::sync::sync(&source, &dest, ctx, logger, mode, cli.max).await
        }

        Command::Diff { src_target, dst_target } => {
            let source = load_store(cli, src_target).await?;
            let dest = load_store(cli, dst_target).await?;
            let report = ops::diff::diff(&source, &dest, ctx).await?;
            for name in &report.source_only {
                logger.out(format!("< {name}"));
            }
            for name in &report.dest_only {
                logger.out(format!("> {name}"));
            }
            Ok(())
        }
    }
}
