//! blockraid CLI: `sync` drives the sole producer of valid parity over an
//! array manifest; `check` and `fix` reconstruct specified missing data or
//! parity streams, read-only and write-back respectively.

use std::path::PathBuf;

use blockraid::disk::fs::{FsDataWriteBack, FsFileHandle, FsParityContainer};
use blockraid::disk::{DiskView, FileHandle, ParityContainer};
use blockraid::error::Result;
use blockraid::hash::Blake3Hasher;
use blockraid::kernel::EngineContext;
use blockraid::manifest::{Manifest, ManifestView};
use blockraid::progress::StopFlag;
use blockraid::recovery::{check_plan_is_recoverable, RecoveryDriver, RecoveryPlan};
use blockraid::sync::SyncDriver;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BLOCKRAID_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "BLOCKRAID_LOG_JSON", global = true)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild parity for every block index that still needs it.
    Sync {
        /// Path to the array manifest.
        #[arg(long, default_value = "blockraid.yaml")]
        manifest: PathBuf,

        /// First block index to process (default: 0).
        #[arg(long, default_value_t = 0)]
        blockstart: u64,

        /// One past the last block index to process (default: the
        /// manifest's current blockmax).
        #[arg(long)]
        blockmax: Option<u64>,
    },

    /// Reconstruct specified missing data/parity streams and report
    /// whether the result matches the stored hash, without writing
    /// anything back.
    Check {
        #[arg(long, default_value = "blockraid.yaml")]
        manifest: PathBuf,

        /// Data disk index considered missing. Repeatable.
        #[arg(long = "missing-disk")]
        missing_disk: Vec<usize>,

        /// Parity level index considered missing. Repeatable.
        #[arg(long = "missing-parity")]
        missing_parity: Vec<usize>,

        #[arg(long, default_value_t = 0)]
        blockstart: u64,

        #[arg(long)]
        blockmax: Option<u64>,
    },

    /// Reconstruct specified missing data/parity streams and write the
    /// result back to disk, committing each recovered block's record.
    Fix {
        #[arg(long, default_value = "blockraid.yaml")]
        manifest: PathBuf,

        #[arg(long = "missing-disk")]
        missing_disk: Vec<usize>,

        #[arg(long = "missing-parity")]
        missing_parity: Vec<usize>,

        #[arg(long, default_value_t = 0)]
        blockstart: u64,

        #[arg(long)]
        blockmax: Option<u64>,
    },
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    let result = match &args.command {
        Command::Sync { manifest, blockstart, blockmax } => run_sync(manifest, *blockstart, *blockmax),
        Command::Check {
            manifest,
            missing_disk,
            missing_parity,
            blockstart,
            blockmax,
        } => run_recovery(manifest, missing_disk.clone(), missing_parity.clone(), *blockstart, *blockmax, false),
        Command::Fix {
            manifest,
            missing_disk,
            missing_parity,
            blockstart,
            blockmax,
        } => run_recovery(manifest, missing_disk.clone(), missing_parity.clone(), *blockstart, *blockmax, true),
    };

    if let Err(e) = result {
        error!("blockraid: {e}");
        std::process::exit(e.exit_code().max(1));
    }
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(false)).init();
    }
}

fn open_array(
    manifest_path: &std::path::Path,
) -> Result<(EngineContext, ManifestView, Vec<Box<dyn FileHandle>>, Vec<Box<dyn ParityContainer>>)> {
    let manifest = Manifest::load(manifest_path)?;
    let view = ManifestView::new(manifest);

    let mut ctx = EngineContext::new();
    ctx.set_mode(view.parity_mode());

    let handles: Vec<Box<dyn FileHandle>> = (0..view.disk_count()).map(|_| Box::new(FsFileHandle::new()) as Box<dyn FileHandle>).collect();

    let parity: Result<Vec<Box<dyn ParityContainer>>> = view
        .parity_paths()
        .iter()
        .enumerate()
        .map(|(level, path)| FsParityContainer::create_at_level(path.clone(), level).map(|c| Box::new(c) as Box<dyn ParityContainer>))
        .collect();

    Ok((ctx, view, handles, parity?))
}

fn run_sync(manifest_path: &std::path::Path, blockstart: u64, blockmax: Option<u64>) -> Result<()> {
    let (ctx, mut view, handles, parity) = open_array(manifest_path)?;
    let block_size = view.block_size();
    let blockmax = blockmax.unwrap_or_else(|| view.blockmax());

    let mut driver = SyncDriver::new(&ctx, &mut view, handles, parity, Box::new(Blake3Hasher), block_size);
    let outcome = driver.run(blockstart, blockmax, &StopFlag::new())?;

    info!(
        blocks_processed = outcome.blocks_processed,
        blocks_total = outcome.blocks_total,
        stopped_early = outcome.stopped_early,
        "sync complete"
    );

    view.save(manifest_path)?;
    Ok(())
}

fn run_recovery(
    manifest_path: &std::path::Path,
    missing_disk: Vec<usize>,
    missing_parity: Vec<usize>,
    blockstart: u64,
    blockmax: Option<u64>,
    write_back: bool,
) -> Result<()> {
    let (ctx, mut view, handles, parity) = open_array(manifest_path)?;
    let block_size = view.block_size();
    let blockmax = blockmax.unwrap_or_else(|| view.blockmax());

    let plan = RecoveryPlan::new(&ctx, missing_disk, missing_parity);
    check_plan_is_recoverable(view.parity_levels(), &plan)?;

    let indices: Vec<u64> = (blockstart..blockmax).collect();
    let mut driver = RecoveryDriver::new(&ctx, &mut view, handles, parity, Box::new(Blake3Hasher), Box::new(FsDataWriteBack::new()), block_size);

    let results = driver.recover(&indices, &plan, write_back)?;
    driver.close_all_best_effort();

    let mismatches: usize = results.iter().flat_map(|r| r.data.iter()).filter(|(_, _, matches)| !matches).count();
    info!(
        blocks = results.len(),
        mismatches,
        write_back,
        "recovery complete"
    );

    if write_back {
        view.save(manifest_path)?;
    }

    if !write_back && mismatches > 0 {
        std::process::exit(1);
    }
    Ok(())
}
