use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{bail, Context, Result};

use xfs_bulkstat::scanner::{self, types::ScanProgress};
use xfs_bulkstat::xfs::{self, BulkOptions, Bulkstat, InodeStat, Inumbers, XfsVolume};

const USAGE: &str = "usage: bulkstat-scan <path> [--start INO] [--batch N] [--ino INO | --inumbers]";

enum Mode {
    /// Walk every inode and print a summary
    Scan,
    /// Stat a single inode
    Single(u64),
    /// List inode allocation chunks
    Inumbers,
}

struct Args {
    path: PathBuf,
    options: BulkOptions,
    mode: Mode,
}

fn parse_number(flag: &str, value: Option<String>) -> Result<u64> {
    let value = value.with_context(|| format!("{flag} needs a value\n{USAGE}"))?;
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid {flag} value '{value}'"))
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut options = BulkOptions::default();
    let mut mode = Mode::Scan;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--start" => options.start_ino = parse_number("--start", args.next())?,
            "--batch" => {
                let batch = parse_number("--batch", args.next())?;
                options.batch_size = u32::try_from(batch).context("--batch does not fit in 32 bits")?;
            }
            "--ino" => mode = Mode::Single(parse_number("--ino", args.next())?),
            "--inumbers" => mode = Mode::Inumbers,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            _ if arg.starts_with('-') => bail!("unknown option '{arg}'\n{USAGE}"),
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument '{arg}'\n{USAGE}"),
        }
    }

    let path = path.with_context(|| USAGE.to_string())?;
    Ok(Args { path, options, mode })
}

fn print_stat(stat: &InodeStat) {
    println!("ino      {}", stat.ino);
    println!("type     {:?} (mode {:o})", stat.file_type(), stat.mode);
    println!("links    {}", stat.nlink);
    println!("owner    {}:{}", stat.uid, stat.gid);
    println!("size     {} bytes, {} blocks", stat.size, stat.blocks);
    println!("extents  {} data, {} attr", stat.extents, stat.aextents);
    println!("project  {}", stat.project_id());
    println!("xflags   {:?}", stat.xflags());
    println!("gen      {}", stat.gen);
    println!("mtime    {}.{:09}", stat.mtime.sec, stat.mtime.nsec);
}

fn run_scan(args: Args) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let path = args.path.clone();
    let worker = std::thread::spawn(move || scanner::scan_volume(&path, args.options, tx));

    for progress in rx {
        match progress {
            ScanProgress::Started { root, batch_size } => {
                println!("Scanning {} ({} inodes per call)", root.display(), batch_size);
            }
            ScanProgress::Batch { batch, inodes_scanned, cursor } => {
                tracing::debug!("batch {}: {} inodes so far, cursor {}", batch, inodes_scanned, cursor);
            }
            ScanProgress::Completed(_) => {}
            ScanProgress::Error { path, message } => {
                tracing::error!("Scan of {} failed: {}", path.display(), message);
            }
        }
    }

    let summary = worker
        .join()
        .map_err(|_| anyhow::anyhow!("scan thread panicked"))??;

    println!();
    println!("  Inodes:     {}", summary.inodes);
    println!("  Dirs:       {}", summary.dirs);
    println!("  Files:      {}", summary.files);
    println!("  Symlinks:   {}", summary.symlinks);
    println!("  Other:      {}", summary.other);
    println!("  Bytes:      {:.2} GB", summary.total_bytes as f64 / 1_073_741_824.0);
    println!("  Blocks:     {} (512 B)", summary.total_blocks);
    println!("  Highest:    ino {}", summary.highest_ino);
    println!("  Batches:    {} in {:.2}s", summary.batches, summary.elapsed_ms as f64 / 1000.0);
    Ok(())
}

fn run_single(args: Args, ino: u64) -> Result<()> {
    let mut req = Bulkstat::<XfsVolume>::open(&args.path, args.options)?;
    let stat = req.stat_one(ino);
    req.release();
    print_stat(&stat.with_context(|| format!("Failed to stat inode {ino}"))?);
    Ok(())
}

fn run_inumbers(args: Args) -> Result<()> {
    let mut req = Inumbers::<XfsVolume>::open(&args.path, args.options)?;
    let mut chunks = 0u64;
    let mut allocated = 0i64;
    for group in req.records() {
        let group = group?;
        println!("{:>20} {:>3} {:#018x}", group.startino, group.alloccount, group.allocmask);
        chunks += 1;
        allocated += i64::from(group.alloccount);
    }
    req.release();
    println!("{chunks} chunks, {allocated} allocated inodes");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xfs_bulkstat=info".parse().unwrap()),
        )
        .init();

    xfs::verify_layout().context("Refusing to issue bulkstat with a mismatched record layout")?;

    let args = parse_args()?;
    match args.mode {
        Mode::Scan => run_scan(args),
        Mode::Single(ino) => run_single(args, ino),
        Mode::Inumbers => run_inumbers(args),
    }
}
