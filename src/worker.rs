use std::fs;
use std::io::{self, SeekFrom};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;

use crate::accumulator::Accumulator;
use crate::records;
use crate::sequential;
use crate::shared_types::{ByteCount, ByteRange, RECORD_WIDTH};

/// Bytes folded between two progress updates of a mapped worker.
const PROGRESS_STRIDE: usize = 4 * 1024 * 1024;

/// How workers get at their slice of the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RangeStrategy {
    /// Map the file once and hand every worker a borrowed slice of it.
    #[default]
    Mapped,
    /// Every worker opens its own handle, seeks to its range and streams it.
    Seek,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("I/O error reading {range:?}: {source}")]
    Io { range: ByteRange, source: io::Error },
    #[error("range {range:?} lies outside the {len}-byte mapping")]
    OutOfBounds { range: ByteRange, len: usize },
    #[error("range {range:?} ended after {read} bytes; file shrank while reading")]
    ShortRead { range: ByteRange, read: ByteCount },
}

/// Read-only mapping of the whole input, shared by all mapped workers.
#[derive(Debug)]
pub struct MappedFile {
    mmap: Option<Mmap>,
}

impl MappedFile {
    /// Maps `file`. Empty files are not mapped at all, since several
    /// platforms refuse zero-length mappings.
    pub fn map(file: &fs::File) -> io::Result<Self> {
        if file.metadata()?.len() == 0 {
            return Ok(Self { mmap: None });
        }
        // Safety: the mapping is only ever read. Another process truncating
        // the file underneath us is outside what we can guard against.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap: Some(mmap) })
    }

    pub fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Folds the records of `range` straight out of the mapping. CPU bound; run
/// it on a blocking thread.
pub fn fold_mapped(
    map: &MappedFile,
    range: ByteRange,
    s_progress: Option<&mpsc::UnboundedSender<ByteCount>>,
) -> Result<Accumulator, WorkerError> {
    let out_of_bounds = || WorkerError::OutOfBounds {
        range,
        len: map.len(),
    };
    let start = usize::try_from(range.start).map_err(|_| out_of_bounds())?;
    let end = usize::try_from(range.end).map_err(|_| out_of_bounds())?;
    let bytes = map.bytes().get(start..end).ok_or_else(out_of_bounds)?;

    let stride = PROGRESS_STRIDE - PROGRESS_STRIDE % RECORD_WIDTH as usize;
    let mut acc = Accumulator::EMPTY;
    for block in bytes.chunks(stride) {
        acc = records::fold_slice(block, acc).0;
        if let Some(s_progress) = s_progress {
            s_progress.send(block.len() as ByteCount).ok();
        }
    }
    Ok(acc)
}

/// Folds the records of `range` through a private file handle, using the
/// sequential reader limited to the range.
pub async fn fold_seek(
    path: &Path,
    range: ByteRange,
    buffer_size: usize,
    s_progress: Option<&mpsc::UnboundedSender<ByteCount>>,
) -> Result<Accumulator, WorkerError> {
    let io_err = |source: io::Error| WorkerError::Io { range, source };
    if range.is_empty() {
        return Ok(Accumulator::EMPTY);
    }

    let mut file = File::open(path).await.map_err(io_err)?;
    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(io_err)?;
    let summary = sequential::fold_stream(file.take(range.len()), buffer_size, s_progress)
        .await
        .map_err(io_err)?;

    if summary.bytes_read < range.len() {
        return Err(WorkerError::ShortRead {
            range,
            read: summary.bytes_read,
        });
    }
    Ok(summary.accumulator)
}
