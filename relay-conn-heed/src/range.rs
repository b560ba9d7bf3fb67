use std::ops::Bound::{self, Excluded, Included, Unbounded};

use relay_conn::OrderDirection;

/// A window over the key space, the accessor of [`crate::HeedConnector`].
///
/// Bounds are always in ascending key order; `direction` decides which end
/// the offset and limit count from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    lower: Bound<u64>,
    upper: Bound<u64>,
    direction: OrderDirection,
    offset: usize,
    limit: Option<usize>,
}

impl Default for KeyRange {
    fn default() -> Self {
        Self::all()
    }
}

impl KeyRange {
    pub fn all() -> Self {
        Self::between(Unbounded, Unbounded)
    }

    pub fn between(lower: Bound<u64>, upper: Bound<u64>) -> Self {
        Self {
            lower,
            upper,
            direction: OrderDirection::Asc,
            offset: 0,
            limit: None,
        }
    }

    pub fn bounds(&self) -> (Bound<u64>, Bound<u64>) {
        (self.lower, self.upper)
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// True when no key can satisfy both bounds or the window is closed.
    pub fn is_empty(&self) -> bool {
        if self.limit == Some(0) {
            return true;
        }
        match (self.lower, self.upper) {
            (_, Excluded(0)) => true,
            (Unbounded, _) | (_, Unbounded) => false,
            (Included(lo), Included(hi)) => lo > hi,
            (Included(lo), Excluded(hi)) | (Excluded(lo), Included(hi)) => lo >= hi,
            (Excluded(lo), Excluded(hi)) => lo.saturating_add(1) >= hi,
        }
    }

    pub(crate) fn set_direction(&mut self, direction: OrderDirection) {
        self.direction = direction;
    }

    pub(crate) fn raise_lower(&mut self, bound: Bound<u64>) {
        self.lower = match (self.lower, bound) {
            (Unbounded, b) | (b, Unbounded) => b,
            (Included(a), Included(b)) => Included(a.max(b)),
            (Excluded(a), Excluded(b)) => Excluded(a.max(b)),
            (Included(a), Excluded(b)) | (Excluded(b), Included(a)) => {
                if b >= a {
                    Excluded(b)
                } else {
                    Included(a)
                }
            }
        };
    }

    pub(crate) fn lower_upper(&mut self, bound: Bound<u64>) {
        self.upper = match (self.upper, bound) {
            (Unbounded, b) | (b, Unbounded) => b,
            (Included(a), Included(b)) => Included(a.min(b)),
            (Excluded(a), Excluded(b)) => Excluded(a.min(b)),
            (Included(a), Excluded(b)) | (Excluded(b), Included(a)) => {
                if b <= a {
                    Excluded(b)
                } else {
                    Included(a)
                }
            }
        };
    }

    pub(crate) fn skip(&mut self, amount: usize) {
        self.offset += amount;
        self.limit = self.limit.map(|limit| limit.saturating_sub(amount));
    }

    pub(crate) fn set_limit(&mut self, limit: usize) {
        self.limit = Some(self.limit.map_or(limit, |current| current.min(limit)));
    }
}
