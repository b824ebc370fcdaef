//! Range policy: which slice of a log two peers reconcile.
//!
//! Pure functions over local and remote have-ranges. Adapters pick a
//! strategy; the session never reasons about ranges beyond emptiness.

use dagsync_core::Range;

use crate::error::{Result, SyncError};

/// Which way a common range extends when local and remote extents differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Newer data only: `[max(mins), max(maxes)]`.
    Forward,
    /// Older data only: `[min(mins), min(maxes)]`.
    Backward,
    /// Union of both extents: `[min(mins), max(maxes)]`.
    Both,
}

/// Range both sides should cover, given their have-ranges.
///
/// An empty remote range yields the remote range; an empty local range
/// yields the local range. Either way the result is empty.
pub fn common_range(local: Range, remote: Range, direction: Direction) -> Range {
    if remote.is_empty() {
        return remote;
    }
    if local.is_empty() {
        return local;
    }
    match direction {
        Direction::Forward => Range::new(local.min.max(remote.min), local.max.max(remote.max)),
        Direction::Backward => Range::new(local.min.min(remote.min), local.max.min(remote.max)),
        Direction::Both => Range::new(local.min.min(remote.min), local.max.max(remote.max)),
    }
}

/// Bounded-window strategy, used for feeds.
///
/// Wants nothing unless the remote is ahead. Otherwise wants up to the
/// remote's newest item, starting no earlier than the item after our newest
/// and no earlier than the remote's oldest.
///
/// Holding nothing there is no continuation to extend, so the window is the
/// remote's newest `limit` items.
pub fn bounded_window_want(local_have: Range, remote_have: Range, limit: u64) -> Range {
    if remote_have.is_empty() {
        return Range::EMPTY;
    }
    let max_want = remote_have.max;
    if local_have.is_empty() {
        let min_want = max_want
            .saturating_sub(limit.max(1) - 1)
            .max(remote_have.min);
        return Range::new(min_want, max_want);
    }
    let local_max = local_have.max;
    if remote_have.max <= local_max {
        return Range::EMPTY;
    }
    let size = (max_want - local_max).max(limit);
    let min_want = max_want
        .saturating_sub(size)
        .max(local_max + 1)
        .max(remote_have.min);
    Range::new(min_want, max_want)
}

/// Symmetric-merge strategy, used for threads.
///
/// Both sides converge on `[0, max(local, remote)]`. Thread ranges always
/// start at the root, so a non-empty remote range with a nonzero origin
/// breaks the contract.
pub fn symmetric_want(local_have: Range, remote_have: Range) -> Result<Range> {
    if remote_have.is_empty() {
        return Ok(Range::EMPTY);
    }
    if remote_have.min != 0 {
        return Err(SyncError::RangeContract(format!(
            "remote range {:?} does not start at 0",
            remote_have
        )));
    }
    if local_have.is_empty() {
        return Ok(remote_have);
    }
    Ok(common_range(local_have, remote_have, Direction::Both))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_common_range_directions() {
        let local = Range::new(5, 20);
        let remote = Range::new(10, 30);
        assert_eq!(common_range(local, remote, Direction::Forward), Range::new(10, 30));
        assert_eq!(common_range(local, remote, Direction::Backward), Range::new(5, 20));
        assert_eq!(common_range(local, remote, Direction::Both), Range::new(5, 30));
    }

    #[test]
    fn test_common_range_with_empty_local() {
        let got = common_range(Range::EMPTY, Range::new(1, 3), Direction::Both);
        assert!(got.is_empty());
    }

    #[test]
    fn test_window_continues_after_local_newest() {
        // we hold 6..8, they hold 1..10
        let want = bounded_window_want(Range::new(6, 8), Range::new(1, 10), 1000);
        assert_eq!(want, Range::new(9, 10));
    }

    #[test]
    fn test_window_empty_when_remote_not_ahead() {
        assert!(bounded_window_want(Range::new(1, 10), Range::new(6, 8), 1000).is_empty());
        assert!(bounded_window_want(Range::new(1, 10), Range::new(1, 10), 1000).is_empty());
    }

    #[test]
    fn test_window_respects_remote_oldest() {
        // they only hold 12..15; nothing before 12 can be fetched
        let want = bounded_window_want(Range::new(6, 8), Range::new(12, 15), 1000);
        assert_eq!(want, Range::new(12, 15));
    }

    #[test]
    fn test_window_from_nothing() {
        let want = bounded_window_want(Range::EMPTY, Range::new(1, 10_000), 1000);
        assert_eq!(want, Range::new(9001, 10_000));
        assert_eq!(want.len(), 1000);

        // short feeds come whole
        let want = bounded_window_want(Range::EMPTY, Range::new(1, 40), 1000);
        assert_eq!(want, Range::new(1, 40));
        let want = bounded_window_want(Range::EMPTY, Range::new(30, 40), 1000);
        assert_eq!(want, Range::new(30, 40));
    }

    #[test]
    fn test_symmetric_union() {
        let want = symmetric_want(Range::new(0, 40), Range::new(0, 90)).unwrap();
        assert_eq!(want, Range::new(0, 90));
        let want = symmetric_want(Range::EMPTY, Range::new(0, 15)).unwrap();
        assert_eq!(want, Range::new(0, 15));
    }

    #[test]
    fn test_symmetric_rejects_nonzero_origin() {
        let err = symmetric_want(Range::new(0, 10), Range::new(3, 10)).unwrap_err();
        assert!(matches!(err, SyncError::RangeContract(_)));
        assert!(err.is_fatal());
    }

    fn any_range() -> impl Strategy<Value = Range> {
        (0u64..10_000, 0u64..10_000).prop_map(|(a, b)| Range::new(a, b))
    }

    proptest! {
        #[test]
        fn prop_empty_remote_wants_nothing(local in any_range(), limit in 1u64..5000) {
            prop_assert!(bounded_window_want(local, Range::EMPTY, limit).is_empty());
            prop_assert!(symmetric_want(local, Range::EMPTY).unwrap().is_empty());
            for direction in [Direction::Forward, Direction::Backward, Direction::Both] {
                prop_assert!(common_range(local, Range::EMPTY, direction).is_empty());
            }
        }

        #[test]
        fn prop_window_never_overlaps_local(
            local_min in 1u64..5000,
            local_len in 0u64..5000,
            remote in any_range(),
            limit in 1u64..5000,
        ) {
            let local = Range::new(local_min, local_min + local_len);
            let want = bounded_window_want(local, remote, limit);
            if !want.is_empty() {
                prop_assert!(want.min > local.max);
                prop_assert!(want.max <= remote.max);
                prop_assert!(want.min >= remote.min);
            }
        }

        #[test]
        fn prop_window_from_nothing_is_bounded(remote in any_range(), limit in 1u64..5000) {
            let want = bounded_window_want(Range::EMPTY, remote, limit);
            if remote.is_empty() {
                prop_assert!(want.is_empty());
            } else {
                prop_assert_eq!(want.max, remote.max);
                prop_assert!(want.min >= remote.min);
                prop_assert!(want.len() <= limit);
            }
        }
    }
}
