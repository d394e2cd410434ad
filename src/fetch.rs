use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use rand::Rng;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, USER_AGENT};
use reqwest::{Client, StatusCode};
use tokio::sync::{mpsc, Mutex};

use crate::bbox::{generate_ranges, LngLatBbox};
use crate::tile::{Tile, MAX_ZOOM};
use crate::{TilePackError, TilePackResult};

const HTTP_USER_AGENT: &str = "go-tilepacks/1.0";
const MAX_RETRIES: u32 = 30;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A tile to fetch. Carrier only; no payload.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub tile: Tile,
    pub url: String,
}

/// A fetched tile payload with the elapsed fetch time.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub tile: Tile,
    pub data: Vec<u8>,
    pub elapsed: Duration,
}

/// The job queue side handed to each worker.
pub type JobQueue = Arc<Mutex<mpsc::Receiver<TileRequest>>>;

/// Per-worker fetch loop: drains the job queue until it closes, emitting
/// zero or one result per job.
pub trait TileWorker: Send + 'static {
    fn run(
        self,
        id: usize,
        jobs: JobQueue,
        results: mpsc::Sender<TileResponse>,
    ) -> impl Future<Output = ()> + Send;
}

/// Produces tile-request descriptors for a run and the workers that fetch
/// them.
pub trait JobGenerator: Send + Sync {
    type Worker: TileWorker;

    /// Creates one worker's fetch state.
    fn create_worker(&self) -> TilePackResult<Self::Worker>;

    /// Enumerates every tile request into `jobs`, returning once enumeration
    /// is complete. The queue is closed by the pipeline driver, not here.
    fn create_jobs(
        &self,
        jobs: mpsc::Sender<TileRequest>,
    ) -> impl Future<Output = TilePackResult<()>> + Send;
}

/// Substitutes every `{z}`, `{x}`, and `{y}` token in the template.
#[must_use]
pub fn render_url(template: &str, tile: Tile) -> String {
    template
        .replace("{z}", &tile.z.to_string())
        .replace("{x}", &tile.x.to_string())
        .replace("{y}", &tile.y.to_string())
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

#[derive(Debug, Clone)]
enum Transport {
    Http,
    File { root: PathBuf },
}

/// One HTTP GET per tile, honoring a `{z}/{x}/{y}` URL template.
pub struct XyzJobGenerator {
    client: Client,
    transport: Transport,
    url_template: String,
    bounds: LngLatBbox,
    zooms: Vec<u8>,
    inverted_y: bool,
    ensure_gzip: bool,
}

impl XyzJobGenerator {
    /// Creates a generator fetching over HTTP.
    pub fn new(
        url_template: impl Into<String>,
        bounds: LngLatBbox,
        zooms: Vec<u8>,
        timeout: Duration,
        inverted_y: bool,
        ensure_gzip: bool,
    ) -> TilePackResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(500)
            .build()?;

        Self::with_transport(
            client,
            Transport::Http,
            url_template.into(),
            bounds,
            zooms,
            inverted_y,
            ensure_gzip,
        )
    }

    /// Creates a generator resolving `file://` templates against `root`.
    pub fn with_file_transport(
        root: impl AsRef<Path>,
        url_template: impl Into<String>,
        bounds: LngLatBbox,
        zooms: Vec<u8>,
        timeout: Duration,
        inverted_y: bool,
        ensure_gzip: bool,
    ) -> TilePackResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(TilePackError::RootNotADirectory(root));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Self::with_transport(
            client,
            Transport::File { root },
            url_template.into(),
            bounds,
            zooms,
            inverted_y,
            ensure_gzip,
        )
    }

    fn with_transport(
        client: Client,
        transport: Transport,
        url_template: String,
        bounds: LngLatBbox,
        zooms: Vec<u8>,
        inverted_y: bool,
        ensure_gzip: bool,
    ) -> TilePackResult<Self> {
        if bounds.south > bounds.north {
            return Err(TilePackError::InvalidBounds(format!(
                "south {} exceeds north {}",
                bounds.south, bounds.north
            )));
        }
        if let Some(&bad) = zooms.iter().find(|&&z| z > MAX_ZOOM) {
            return Err(TilePackError::InvalidZoom(bad));
        }

        Ok(Self {
            client,
            transport,
            url_template,
            bounds,
            zooms,
            inverted_y,
            ensure_gzip,
        })
    }
}

impl JobGenerator for XyzJobGenerator {
    type Worker = TileFetcher;

    fn create_worker(&self) -> TilePackResult<Self::Worker> {
        Ok(TileFetcher {
            client: self.client.clone(),
            transport: self.transport.clone(),
            ensure_gzip: self.ensure_gzip,
            compress_buf: Vec::new(),
        })
    }

    async fn create_jobs(&self, jobs: mpsc::Sender<TileRequest>) -> TilePackResult<()> {
        let mut ranges = Vec::new();
        generate_ranges(&self.bounds, &self.zooms, |range| ranges.push(range));

        for range in ranges {
            for x in range.min.x..=range.max.x {
                for y in range.min.y..=range.max.y {
                    let mut tile = Tile::new(range.min.z, x, y);
                    if self.inverted_y {
                        tile = Tile::new(tile.z, tile.x, tile.flipped_y());
                    }

                    let request = TileRequest {
                        url: render_url(&self.url_template, tile),
                        tile,
                    };
                    if jobs.send(request).await.is_err() {
                        // Pipeline shut down early; nothing left to enumerate into.
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

/// One worker's fetch state: a handle on the shared HTTP pool plus a
/// reusable gzip buffer.
pub struct TileFetcher {
    client: Client,
    transport: Transport,
    ensure_gzip: bool,
    compress_buf: Vec<u8>,
}

impl TileWorker for TileFetcher {
    async fn run(mut self, id: usize, jobs: JobQueue, results: mpsc::Sender<TileResponse>) {
        loop {
            let request = {
                let mut jobs = jobs.lock().await;
                jobs.recv().await
            };
            let Some(request) = request else {
                break;
            };

            let start = Instant::now();
            let data = match self.fetch(&request).await {
                Ok(data) => data,
                Err(err) => {
                    log::warn!("worker {id}: skipping {}: {err}", request.tile);
                    continue;
                }
            };
            let elapsed = start.elapsed();
            log::debug!(
                "worker {id}: fetched {} ({} bytes in {elapsed:?})",
                request.tile,
                data.len()
            );

            let response = TileResponse {
                tile: request.tile,
                data,
                elapsed,
            };
            if results.send(response).await.is_err() {
                break;
            }

            // Tiny random pause to keep the workers from thundering in step.
            let jitter = rand::thread_rng().gen_range(0..50);
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }
}

impl TileFetcher {
    async fn fetch(&mut self, request: &TileRequest) -> TilePackResult<Vec<u8>> {
        let file_root = match &self.transport {
            Transport::File { root } => Some(root.clone()),
            Transport::Http => None,
        };

        if let Some(root) = file_root {
            let relative = request
                .url
                .trim_start_matches("file://")
                .trim_start_matches('/');
            let data = tokio::fs::read(root.join(relative)).await?;
            return if self.ensure_gzip {
                self.gzip(&data)
            } else {
                Ok(data)
            };
        }

        let response = self.get_with_retry(&request.url).await?;

        let already_gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|value| value.to_str().ok())
            == Some("gzip");

        let body = response.bytes().await?;

        if already_gzipped || !self.ensure_gzip {
            Ok(body.to_vec())
        } else {
            self.gzip(&body)
        }
    }

    async fn get_with_retry(&self, url: &str) -> TilePackResult<reqwest::Response> {
        let mut backoff = INITIAL_BACKOFF;

        for _ in 0..MAX_RETRIES {
            let response = self
                .client
                .get(url)
                .header(USER_AGENT, HTTP_USER_AGENT)
                .header(ACCEPT_ENCODING, "gzip")
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if !is_retryable(status) {
                return Err(TilePackError::HttpStatus {
                    code: status.as_u16(),
                    status: status.to_string(),
                });
            }

            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }

        Err(TilePackError::RetriesExhausted(url.to_string()))
    }

    fn gzip(&mut self, data: &[u8]) -> TilePackResult<Vec<u8>> {
        self.compress_buf.clear();
        let mut encoder = GzEncoder::new(&mut self.compress_buf, flate2::Compression::default());
        encoder.write_all(data)?;
        encoder.finish()?;
        Ok(self.compress_buf.clone())
    }
}
