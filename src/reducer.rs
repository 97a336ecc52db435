use thiserror::Error;

use crate::accumulator::Accumulator;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReduceError {
    #[error("nothing to reduce: no partial results were produced")]
    EmptyInput,
}

/// Combines partial results into one. Order does not matter.
pub fn reduce<I>(partials: I) -> Result<Accumulator, ReduceError>
where
    I: IntoIterator<Item = Accumulator>,
{
    partials
        .into_iter()
        .reduce(Accumulator::merge)
        .ok_or(ReduceError::EmptyInput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(reduce(Vec::new()), Err(ReduceError::EmptyInput));
    }

    #[test]
    fn combines_worker_outputs() {
        let combined = reduce([Accumulator::of(10), Accumulator::of(u32::MAX)]).unwrap();
        assert_eq!(combined.total, 4_294_967_305);
        assert_eq!(combined.min, 10);
        assert_eq!(combined.max, u32::MAX as u64);
    }

    #[test]
    fn all_empty_partials_reduce_to_identity() {
        assert_eq!(reduce([Accumulator::EMPTY; 3]).unwrap(), Accumulator::EMPTY);
    }

    #[test]
    fn order_independent() {
        let parts = [
            Accumulator::of(5),
            Accumulator::of(1),
            Accumulator::EMPTY,
            Accumulator::of(9),
        ];
        let mut reversed = parts;
        reversed.reverse();
        assert_eq!(reduce(parts), reduce(reversed));
    }
}
