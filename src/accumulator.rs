use std::fmt;

/// Sentinel minimum for an accumulator that has seen no records: one past `u32::MAX`.
pub const EMPTY_MIN: u64 = u32::MAX as u64 + 1;

/// Running `(total, min, max)` over a set of records.
///
/// `min` and `max` are widened to `u64` so the empty sentinel ([`EMPTY_MIN`])
/// stays distinguishable from a real `u32::MAX` record. `total` is `u128`
/// because 2^32 maximal records already exhaust a `u64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Accumulator {
    pub total: u128,
    pub min: u64,
    pub max: u64,
    pub records: u64,
}

impl Accumulator {
    pub const EMPTY: Accumulator = Accumulator {
        total: 0,
        min: EMPTY_MIN,
        max: 0,
        records: 0,
    };

    pub fn of(value: u32) -> Self {
        let mut acc = Self::EMPTY;
        acc.fold(value);
        acc
    }

    #[inline]
    pub fn fold(&mut self, value: u32) {
        let value = value as u64;
        self.total += value as u128;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.records += 1;
    }

    /// Combines two partial results. Associative and commutative, with
    /// [`Accumulator::EMPTY`] as identity.
    pub fn merge(self, other: Accumulator) -> Accumulator {
        Accumulator {
            total: self.total + other.total,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            records: self.records + other.records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn min_value(&self) -> Option<u32> {
        u32::try_from(self.min).ok().filter(|_| !self.is_empty())
    }

    pub fn max_value(&self) -> Option<u32> {
        u32::try_from(self.max).ok().filter(|_| !self.is_empty())
    }
}

impl Default for Accumulator {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl FromIterator<u32> for Accumulator {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut acc = Self::EMPTY;
        iter.into_iter().for_each(|v| acc.fold(v));
        acc
    }
}

impl fmt::Display for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "total={} min={} max={}", self.total, self.min, self.max)
    }
}
