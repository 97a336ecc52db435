use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::MultiProgress;
use thiserror::Error;
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::accumulator::Accumulator;
use crate::partitioner::{self, PartitionError};
use crate::progress_reporter::ProgressReporter;
use crate::records::{self, RecordError, TrailingPolicy};
use crate::reducer::{self, ReduceError};
use crate::sequential::{self, ReadError, ReadOptions, DEFAULT_BUFFER_SIZE};
use crate::shared_types::{ByteCount, ByteRange};
use crate::worker::{self, MappedFile, RangeStrategy, WorkerError};

/// Execution strategy for [`aggregate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Stream the whole file through one reader.
    #[default]
    Sequential,
    /// Split the file into record-aligned ranges and fold them concurrently.
    Parallel,
}

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot size {}: {source}", path.display())]
    Config { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Reduce(#[from] ReduceError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("worker {index} failed: {source}")]
    Worker { index: usize, source: WorkerError },
    #[error("worker task did not complete: {0}")]
    WorkerFailed(#[from] JoinError),
}

impl From<ReadError> for AggregateError {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => AggregateError::Io(e),
            ReadError::Record(e) => AggregateError::Record(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AggregatePreferences {
    pub path: PathBuf,
    pub mode: Mode,
    /// Worker count for [`Mode::Parallel`]; `None` uses the host's available parallelism.
    pub workers: Option<usize>,
    pub strategy: RangeStrategy,
    pub trailing: TrailingPolicy,
    pub buffer_size: usize,
}

impl AggregatePreferences {
    pub fn new(path: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            path: path.into(),
            mode,
            workers: None,
            strategy: RangeStrategy::default(),
            trailing: TrailingPolicy::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            buffer_size: self.buffer_size,
            trailing: self.trailing,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AggregateReport {
    pub accumulator: Accumulator,
    pub elapsed: Duration,
    pub mode: Mode,
    pub workers: usize,
}

type WorkerOutcome = (usize, Result<Accumulator, WorkerError>);

pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Computes sum, min and max over every record of `prefs.path`.
///
/// Blocks (asynchronously) until the final result is known; any I/O or worker
/// failure fails the whole call and no partial result is returned. When
/// `progress` is given, a progress bar tracks scanned bytes.
pub async fn aggregate(
    prefs: AggregatePreferences,
    progress: Option<MultiProgress>,
) -> Result<AggregateReport, AggregateError> {
    let started = Instant::now();
    debug!("aggregating {} with {:?}", prefs.path.display(), prefs);

    let (accumulator, workers) = match prefs.mode {
        Mode::Sequential => (aggregate_sequential(&prefs, progress).await?, 1),
        Mode::Parallel => {
            let workers = prefs.workers.unwrap_or_else(default_worker_count);
            (aggregate_parallel(&prefs, workers, progress).await?, workers)
        }
    };

    let elapsed = started.elapsed();
    info!(
        "{:?} aggregation of {} records finished in {:.2?}",
        prefs.mode, accumulator.records, elapsed
    );
    Ok(AggregateReport {
        accumulator,
        elapsed,
        mode: prefs.mode,
        workers,
    })
}

async fn aggregate_sequential(
    prefs: &AggregatePreferences,
    progress: Option<MultiProgress>,
) -> Result<Accumulator, AggregateError> {
    let file = File::open(&prefs.path).await?;
    let (s_progress, reporter) = match progress {
        Some(multi) => start_reporter(multi, file.metadata().await?.len()),
        None => (None, None),
    };

    let result = sequential::fold_reader(file, prefs.read_options(), s_progress.as_ref()).await;
    finish_reporter(s_progress, reporter, result.is_ok()).await;
    Ok(result?)
}

async fn aggregate_parallel(
    prefs: &AggregatePreferences,
    workers: usize,
    progress: Option<MultiProgress>,
) -> Result<Accumulator, AggregateError> {
    let size_err = |source: io::Error| sizing_error(&prefs.path, source);
    let file = File::open(&prefs.path).await.map_err(size_err)?;
    let file_len = file.metadata().await.map_err(size_err)?.len();

    // Everything that can be rejected up front is, before any worker starts.
    records::check_trailing(file_len, prefs.trailing)?;
    let ranges = partitioner::partition(file_len, workers)?;

    let (s_progress, reporter) = match progress {
        Some(multi) => start_reporter(multi, file_len),
        None => (None, None),
    };

    let set = match prefs.strategy {
        RangeStrategy::Mapped => {
            let map = Arc::new(MappedFile::map(&file.into_std().await)?);
            spawn_mapped_workers(map, ranges, &s_progress)
        }
        RangeStrategy::Seek => {
            spawn_seek_workers(&prefs.path, prefs.buffer_size, ranges, &s_progress)
        }
    };
    debug!("dispatched {workers} {:?} workers", prefs.strategy);

    let partials = collect_partials(set).await;
    finish_reporter(s_progress, reporter, partials.is_ok()).await;
    Ok(reducer::reduce(partials?)?)
}

/// A file that does not exist cannot be sized, which is a configuration
/// problem; any other failure to open or stat it is plain I/O.
fn sizing_error(path: &Path, source: io::Error) -> AggregateError {
    match source.kind() {
        io::ErrorKind::NotFound => AggregateError::Config {
            path: path.to_path_buf(),
            source,
        },
        _ => AggregateError::Io(source),
    }
}

fn spawn_mapped_workers(
    map: Arc<MappedFile>,
    ranges: Vec<ByteRange>,
    s_progress: &Option<mpsc::UnboundedSender<ByteCount>>,
) -> JoinSet<WorkerOutcome> {
    let mut set = JoinSet::new();
    for (index, range) in ranges.into_iter().enumerate() {
        let map = map.clone();
        let s_progress = s_progress.clone();
        set.spawn_blocking(move || {
            let result = worker::fold_mapped(&map, range, s_progress.as_ref());
            (index, result)
        });
    }
    set
}

fn spawn_seek_workers(
    path: &Path,
    buffer_size: usize,
    ranges: Vec<ByteRange>,
    s_progress: &Option<mpsc::UnboundedSender<ByteCount>>,
) -> JoinSet<WorkerOutcome> {
    let path: Arc<Path> = Arc::from(path);
    let mut set = JoinSet::new();
    for (index, range) in ranges.into_iter().enumerate() {
        let path = path.clone();
        let s_progress = s_progress.clone();
        set.spawn(async move {
            let result = worker::fold_seek(&path, range, buffer_size, s_progress.as_ref()).await;
            (index, result)
        });
    }
    set
}

/// Join barrier: waits for every worker, in completion order. The first
/// failure aborts the remaining workers and becomes the overall result.
async fn collect_partials(
    mut set: JoinSet<WorkerOutcome>,
) -> Result<Vec<Accumulator>, AggregateError> {
    let mut partials = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        let failure = match joined {
            Ok((index, Ok(acc))) => {
                debug!("worker {index} done: {acc}");
                partials.push(acc);
                continue;
            }
            Ok((index, Err(source))) => AggregateError::Worker { index, source },
            Err(e) => AggregateError::WorkerFailed(e),
        };
        error!("{failure}; cancelling {} outstanding worker(s)", set.len());
        set.abort_all();
        return Err(failure);
    }
    Ok(partials)
}

fn start_reporter(
    multi: MultiProgress,
    total_size: ByteCount,
) -> (Option<mpsc::UnboundedSender<ByteCount>>, Option<JoinHandle<()>>) {
    let (s_progress, r_progress) = mpsc::unbounded_channel();
    let reporter = ProgressReporter::new(r_progress, total_size, multi).spawn();
    (Some(s_progress), Some(reporter))
}

async fn finish_reporter(
    s_progress: Option<mpsc::UnboundedSender<ByteCount>>,
    reporter: Option<JoinHandle<()>>,
    succeeded: bool,
) {
    drop(s_progress);
    if let Some(reporter) = reporter {
        // Aborted blocking workers may still hold senders, so only wait on success.
        if succeeded {
            reporter.await.ok();
        } else {
            reporter.abort();
        }
    }
}
