use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::bbox::LngLatBbox;
use crate::fetch::{JobGenerator, TileWorker};
use crate::writer::TileWriter;
use crate::TilePackResult;

/// Capacity of the job and result queues. Full queues block the enumerator
/// and the workers respectively, keeping memory bounded for any run size.
pub const QUEUE_CAPACITY: usize = 2000;

/// Default number of fetch workers.
pub const DEFAULT_WORKERS: usize = 25;

/// Called with the running count of saved tiles after each save.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

pub struct PipelineOptions {
    pub workers: usize,
    pub progress: Option<ProgressFn>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            progress: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSummary {
    /// Tiles handed to the writer and saved without error.
    pub saved: u64,
}

/// Drives a full harvest: enumerate jobs, fetch them on a worker pool, and
/// funnel the results through a single consumer into the writer.
///
/// Shutdown is sequenced by channel closure: the job queue closes when
/// enumeration returns, the workers drain it and exit, the result queue
/// closes when the last worker is gone, and the consumer finishes the
/// remainder before assigning spatial metadata and closing the writer.
pub async fn run<G: JobGenerator>(
    generator: &G,
    mut writer: Box<dyn TileWriter + Send>,
    bounds: LngLatBbox,
    zooms: &[u8],
    options: PipelineOptions,
) -> TilePackResult<PipelineSummary> {
    writer.create_tiles()?;

    let (job_tx, job_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (result_tx, result_rx) = mpsc::channel(QUEUE_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));

    let mut workers = JoinSet::new();
    for id in 0..options.workers.max(1) {
        let worker = generator.create_worker()?;
        workers.spawn(worker.run(id, Arc::clone(&job_rx), result_tx.clone()));
    }
    drop(result_tx);

    let min_zoom = zooms.iter().copied().min();
    let max_zoom = zooms.iter().copied().max();
    let progress = options.progress;
    let consumer = tokio::task::spawn_blocking(move || -> TilePackResult<u64> {
        let mut results = result_rx;
        let mut saved = 0u64;
        while let Some(response) = results.blocking_recv() {
            if let Err(err) = writer.save(response.tile, &response.data) {
                log::warn!("couldn't save tile {}: {err}", response.tile);
                continue;
            }
            saved += 1;
            if let Some(progress) = &progress {
                progress(saved);
            }
        }

        if let (Some(min), Some(max)) = (min_zoom, max_zoom) {
            writer.assign_spatial_metadata(&bounds, min, max)?;
        }
        writer.close()?;
        Ok(saved)
    });

    // The job sender moves into the enumerator and drops when it returns,
    // which is what closes the queue for the workers.
    generator.create_jobs(job_tx).await?;
    log::info!("job queue closed");

    while let Some(joined) = workers.join_next().await {
        joined?;
    }
    log::info!("finished making tile requests");

    let saved = consumer.await??;
    log::info!("processed {saved} tiles");

    Ok(PipelineSummary { saved })
}
