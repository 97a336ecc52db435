use thiserror::Error;

use crate::accumulator::Accumulator;
use crate::shared_types::RECORD_WIDTH;

/// What to do with a file whose length is not a whole number of records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TrailingPolicy {
    /// Ignore the partial record at the end of the file.
    #[default]
    Truncate,
    /// Fail the whole aggregation.
    Reject,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("file length {file_len} leaves {trailing} trailing byte(s) after the last record")]
    MalformedTrailingData { file_len: u64, trailing: u64 },
}

/// Decodes one big-endian record. `bytes` must be exactly one record wide.
#[inline]
pub fn decode(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Folds every complete record of `bytes` into `acc`. Returns the updated
/// accumulator and the number of leftover bytes that did not form a record.
pub fn fold_slice(bytes: &[u8], mut acc: Accumulator) -> (Accumulator, usize) {
    let records = bytes.chunks_exact(RECORD_WIDTH as usize);
    let trailing = records.remainder().len();
    for record in records {
        acc.fold(decode(record));
    }
    (acc, trailing)
}

pub fn check_trailing(file_len: u64, policy: TrailingPolicy) -> Result<(), RecordError> {
    let trailing = file_len % RECORD_WIDTH;
    if trailing == 0 {
        return Ok(());
    }
    match policy {
        TrailingPolicy::Truncate => {
            warn!("ignoring {trailing} trailing byte(s) after the last complete record");
            Ok(())
        }
        TrailingPolicy::Reject => Err(RecordError::MalformedTrailingData { file_len, trailing }),
    }
}
