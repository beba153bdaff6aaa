pub mod types;

use std::path::Path;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::xfs::{BulkOptions, Bulkstat, ControlHandle, XfsVolume};

use self::types::{ScanProgress, ScanSummary};

/// Bulkstat every inode on the XFS volume mounted at (or containing) `path`.
pub fn scan_volume(
    path: &Path,
    options: BulkOptions,
    progress_tx: mpsc::Sender<ScanProgress>,
) -> Result<ScanSummary> {
    tracing::info!("Opening XFS volume: {}", path.display());

    let req = match Bulkstat::<XfsVolume>::open(path, options) {
        Ok(req) => req,
        Err(e) => {
            let _ = progress_tx.send(ScanProgress::Error {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
            return Err(e).with_context(|| format!("Failed to open {} for bulkstat", path.display()));
        }
    };

    scan_bulkstat(req, path, progress_tx)
}

/// Drive an already-bound enumeration to exhaustion. The handle is released
/// before returning, whether or not the walk succeeded.
pub fn scan_bulkstat<H: ControlHandle>(
    mut req: Bulkstat<H>,
    root: &Path,
    progress_tx: mpsc::Sender<ScanProgress>,
) -> Result<ScanSummary> {
    let start = Instant::now();
    let mut summary = ScanSummary::default();

    let _ = progress_tx.send(ScanProgress::Started {
        root: root.to_path_buf(),
        batch_size: req.batch_size(),
    });

    let walked = loop {
        let batch = match req.next() {
            Ok(batch) => batch,
            Err(e) => break Err(e),
        };
        if batch.is_empty() {
            break Ok(());
        }

        for stat in &batch {
            summary.record(stat);
        }

        let _ = progress_tx.send(ScanProgress::Batch {
            batch: req.batches(),
            inodes_scanned: summary.inodes,
            cursor: req.cursor(),
        });
    };

    let cursor = req.cursor();
    summary.batches = req.batches();
    req.release();

    if let Err(e) = walked {
        tracing::warn!(
            "Bulkstat of {} stopped after {} inodes at cursor {}: {}",
            root.display(),
            summary.inodes,
            cursor,
            e
        );
        let _ = progress_tx.send(ScanProgress::Error {
            path: root.to_path_buf(),
            message: e.to_string(),
        });
        return Err(e).with_context(|| {
            format!("Bulkstat of {} failed after ino {}", root.display(), cursor)
        });
    }

    summary.elapsed_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "Bulkstat complete: {} inodes ({} dirs, {} files, {} symlinks, {} other), {:.2} GB in {} batches, {:.2}s",
        summary.inodes,
        summary.dirs,
        summary.files,
        summary.symlinks,
        summary.other,
        summary.total_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
        summary.batches,
        summary.elapsed_ms as f64 / 1000.0
    );

    let _ = progress_tx.send(ScanProgress::Completed(summary.clone()));
    Ok(summary)
}
