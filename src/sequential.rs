use std::cmp;
use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::accumulator::Accumulator;
use crate::records::{self, RecordError, TrailingPolicy};
use crate::shared_types::{ByteCount, RECORD_WIDTH};

const MB_TO_BYTES: usize = 1024 * 1024;
pub const DEFAULT_BUFFER_SIZE: usize = MB_TO_BYTES;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
}

#[derive(Clone, Copy, Debug)]
pub struct ReadOptions {
    pub buffer_size: usize,
    pub trailing: TrailingPolicy,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            trailing: TrailingPolicy::default(),
        }
    }
}

/// Result of streaming a reader to EOF, before any trailing-data policy is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSummary {
    pub accumulator: Accumulator,
    pub bytes_read: ByteCount,
    pub trailing: usize,
}

/// Rounds a requested buffer size down to whole records, never below one record.
pub fn record_aligned(buffer_size: usize) -> usize {
    let width = RECORD_WIDTH as usize;
    cmp::max(buffer_size - buffer_size % width, width)
}

/// Streams `reader` to EOF in bounded buffers, folding every complete record.
///
/// A record split across two reads is carried over to the next read, so the
/// result does not depend on how the underlying source chunks its data.
pub async fn fold_stream<R: AsyncRead + Unpin>(
    mut reader: R,
    buffer_size: usize,
    s_progress: Option<&mpsc::UnboundedSender<ByteCount>>,
) -> io::Result<StreamSummary> {
    let width = RECORD_WIDTH as usize;
    let mut buffer = vec![0u8; record_aligned(buffer_size)];
    let mut accumulator = Accumulator::EMPTY;
    let mut filled = 0;
    let mut bytes_read: ByteCount = 0;

    loop {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        bytes_read += n as ByteCount;
        if let Some(s_progress) = s_progress {
            s_progress.send(n as ByteCount).ok();
        }

        filled += n;
        let whole = filled - filled % width;
        accumulator = records::fold_slice(&buffer[..whole], accumulator).0;
        buffer.copy_within(whole..filled, 0);
        filled -= whole;
    }

    Ok(StreamSummary {
        accumulator,
        bytes_read,
        trailing: filled,
    })
}

/// Sequential reader: folds every record of `reader` in order, applying the
/// trailing-data policy once EOF is reached. No partial result on failure.
pub async fn fold_reader<R: AsyncRead + Unpin>(
    reader: R,
    options: ReadOptions,
    s_progress: Option<&mpsc::UnboundedSender<ByteCount>>,
) -> Result<Accumulator, ReadError> {
    let summary = fold_stream(reader, options.buffer_size, s_progress).await?;
    debug!(
        "sequential read finished: {} bytes, {} records",
        summary.bytes_read, summary.accumulator.records
    );
    records::check_trailing(summary.bytes_read, options.trailing)?;
    Ok(summary.accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    fn encode(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// Hands out at most `step` bytes per read, then optionally fails.
    struct Dribble {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        fail_at_end: bool,
    }

    impl AsyncRead for Dribble {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.pos == self.data.len() {
                if self.fail_at_end {
                    return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk gone")));
                }
                return Poll::Ready(Ok(()));
            }
            let n = self.step.min(self.data.len() - self.pos).min(buf.remaining());
            let start = self.pos;
            buf.put_slice(&self.data[start..start + n]);
            self.pos += n;
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn buffer_sizes_round_to_records() {
        assert_eq!(record_aligned(0), 4);
        assert_eq!(record_aligned(7), 4);
        assert_eq!(record_aligned(4096), 4096);
    }

    #[tokio::test]
    async fn reads_two_records() {
        let data = encode(&[10, u32::MAX]);
        let acc = fold_reader(&data[..], ReadOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(acc.total, 4_294_967_305);
        assert_eq!(acc.min, 10);
        assert_eq!(acc.max, u32::MAX as u64);
    }

    #[tokio::test]
    async fn records_straddling_reads_are_reassembled() {
        let values: Vec<u32> = (0..257).map(|i| i * 7919).collect();
        let reader = Dribble {
            data: encode(&values),
            pos: 0,
            step: 3,
            fail_at_end: false,
        };
        let options = ReadOptions {
            buffer_size: 8,
            ..Default::default()
        };
        let acc = fold_reader(reader, options, None).await.unwrap();
        assert_eq!(acc, values.into_iter().collect::<Accumulator>());
    }

    #[tokio::test]
    async fn empty_source_yields_identity() {
        let acc = fold_reader(&b""[..], ReadOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(acc, Accumulator::EMPTY);
    }

    #[tokio::test]
    async fn trailing_bytes_truncated_or_rejected() {
        let mut data = encode(&[42]);
        data.extend_from_slice(&[1, 2]);

        let acc = fold_reader(&data[..], ReadOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(acc, Accumulator::of(42));

        let strict = ReadOptions {
            trailing: TrailingPolicy::Reject,
            ..Default::default()
        };
        let err = fold_reader(&data[..], strict, None).await.unwrap_err();
        assert!(matches!(
            err,
            ReadError::Record(RecordError::MalformedTrailingData {
                file_len: 6,
                trailing: 2
            })
        ));
    }

    #[tokio::test]
    async fn mid_stream_failure_returns_no_result() {
        let reader = Dribble {
            data: encode(&[1, 2, 3]),
            pos: 0,
            step: 4,
            fail_at_end: true,
        };
        let err = fold_reader(reader, ReadOptions::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadError::Io(_)));
    }

    #[tokio::test]
    async fn progress_counts_every_byte() {
        let data = encode(&[1, 2, 3, 4, 5]);
        let (s_progress, mut r_progress) = mpsc::unbounded_channel();
        let options = ReadOptions {
            buffer_size: 8,
            ..Default::default()
        };
        fold_reader(&data[..], options, Some(&s_progress))
            .await
            .unwrap();
        drop(s_progress);

        let mut seen = 0;
        while let Some(n) = r_progress.recv().await {
            seen += n;
        }
        assert_eq!(seen, 20);
    }
}
