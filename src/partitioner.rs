use thiserror::Error;

use crate::shared_types::{ByteRange, RECORD_WIDTH};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PartitionError {
    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),
    #[error("worker count {workers} exceeds the limit of {max}")]
    TooManyWorkers { workers: usize, max: usize },
}

/// Upper bound on ranges per file; each one becomes a task.
pub const MAX_WORKERS: usize = 1 << 16;

/// Splits `file_len` bytes into exactly `workers` contiguous, record-aligned ranges.
///
/// Every range but the last is `base_chunk` bytes, where `base_chunk` is
/// `file_len / workers` rounded down to a whole record. The last range runs to
/// the end of the file and absorbs the rounding remainder (and any trailing
/// partial record). When the file holds fewer records than there are workers,
/// the leading ranges are empty.
pub fn partition(file_len: u64, workers: usize) -> Result<Vec<ByteRange>, PartitionError> {
    if workers == 0 {
        return Err(PartitionError::InvalidWorkerCount(workers));
    }
    if workers > MAX_WORKERS {
        return Err(PartitionError::TooManyWorkers {
            workers,
            max: MAX_WORKERS,
        });
    }
    let n = workers as u64;
    let base_chunk = (file_len / n) & !(RECORD_WIDTH - 1);

    let ranges = (0..n)
        .map(|i| {
            let start = i * base_chunk;
            let end = if i == n - 1 { file_len } else { start + base_chunk };
            ByteRange::new(start, end)
        })
        .collect::<Vec<_>>();

    debug!(
        "partitioned {file_len} bytes into {workers} ranges of {} records, last {}",
        base_chunk / RECORD_WIDTH,
        ranges.last().map(ByteRange::record_count).unwrap_or(0)
    );
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_records_two_workers() {
        assert_eq!(
            partition(8, 2).unwrap(),
            vec![ByteRange::new(0, 4), ByteRange::new(4, 8)]
        );
    }

    #[test]
    fn empty_file_gives_empty_ranges() {
        let ranges = partition(0, 3).unwrap();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(ByteRange::is_empty));
    }

    #[test]
    fn small_file_lands_on_last_worker() {
        let ranges = partition(8, 4).unwrap();
        assert_eq!(ranges[..3], [ByteRange::new(0, 0); 3]);
        assert_eq!(ranges[3], ByteRange::new(0, 8));
    }

    #[test]
    fn remainder_goes_to_last_worker() {
        // 10 records over 3 workers: base chunk 12 bytes (3 records).
        let ranges = partition(40, 3).unwrap();
        assert_eq!(
            ranges,
            vec![
                ByteRange::new(0, 12),
                ByteRange::new(12, 24),
                ByteRange::new(24, 40)
            ]
        );
    }

    #[test]
    fn oversized_worker_count_rejected() {
        assert_eq!(
            partition(8, usize::MAX >> 4),
            Err(PartitionError::TooManyWorkers {
                workers: usize::MAX >> 4,
                max: MAX_WORKERS
            })
        );
        assert_eq!(partition(8, MAX_WORKERS).unwrap().len(), MAX_WORKERS);
    }

    #[test]
    fn record_counts_follow_chunking() {
        let counts = partition(44, 3)
            .unwrap()
            .iter()
            .map(ByteRange::record_count)
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![3, 3, 5]);
        // trailing partial record is not counted
        assert_eq!(partition(46, 1).unwrap()[0].record_count(), 11);
    }

    #[test]
    fn zero_workers_rejected() {
        assert_eq!(partition(16, 0), Err(PartitionError::InvalidWorkerCount(0)));
    }

    proptest! {
        #[test]
        fn ranges_cover_file_exactly(file_len in 0u64..1_000_000, workers in 1usize..64) {
            let ranges = partition(file_len, workers).unwrap();
            prop_assert_eq!(ranges.len(), workers);
            prop_assert_eq!(ranges[0].start, 0);
            prop_assert_eq!(ranges[workers - 1].end, file_len);
            for pair in ranges.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
            for range in &ranges[..workers - 1] {
                prop_assert_eq!(range.start % RECORD_WIDTH, 0);
                prop_assert_eq!(range.len() % RECORD_WIDTH, 0);
            }
            prop_assert_eq!(ranges[workers - 1].start % RECORD_WIDTH, 0);
        }
    }
}
