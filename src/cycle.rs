//! Circular nearest-neighbour lookups over sorted line indices.
//!
//! Line cycling, hunk cycling, hunk extraction and viewport focus all reduce
//! to "find the nearest value before/after X in a sorted list, wrapping around
//! the ends". [`cyclic_index`] does that with a binary search and reports
//! whether the lookup had to wrap.

/// Which way to look from the probe value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Whether an element equal to the probe value counts as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exclusive,
    Inclusive,
}

/// Result of a cyclic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Index into the searched slice
    pub index: usize,
    /// True when nothing matched on the requested side and the lookup
    /// wrapped to the opposite end
    pub wrapped: bool,
}

/// Find the element nearest to `value` in `direction`, wrapping around.
///
/// `sorted` must be in ascending order. Returns `None` only for an empty slice.
///
/// # Examples
///
/// ```
/// use git_line_stager::cycle::{Bound, Direction, cyclic_index};
///
/// let lines = [4, 7, 9];
/// let next = cyclic_index(&lines, &7, Direction::Forward, Bound::Exclusive).unwrap();
/// assert_eq!(next.index, 2);
///
/// let wrapped = cyclic_index(&lines, &9, Direction::Forward, Bound::Exclusive).unwrap();
/// assert_eq!(wrapped.index, 0);
/// assert!(wrapped.wrapped);
/// ```
pub fn cyclic_index<T: Ord>(
    sorted: &[T],
    value: &T,
    direction: Direction,
    bound: Bound,
) -> Option<Position> {
    let last = sorted.len().checked_sub(1)?;

    // Number of leading elements that sit strictly "before" the match window
    let split = match bound {
        Bound::Exclusive => match direction {
            Direction::Forward => sorted.partition_point(|x| x <= value),
            Direction::Backward => sorted.partition_point(|x| x < value),
        },
        Bound::Inclusive => match direction {
            Direction::Forward => sorted.partition_point(|x| x < value),
            Direction::Backward => sorted.partition_point(|x| x <= value),
        },
    };

    let position = match direction {
        Direction::Forward if split > last => Position {
            index: 0,
            wrapped: true,
        },
        Direction::Forward => Position {
            index: split,
            wrapped: false,
        },
        Direction::Backward if split == 0 => Position {
            index: last,
            wrapped: true,
        },
        Direction::Backward => Position {
            index: split - 1,
            wrapped: false,
        },
    };

    Some(position)
}

/// Index of the first element strictly greater than `value`, wrapping to 0.
pub fn next_index<T: Ord>(sorted: &[T], value: &T) -> Option<usize> {
    cyclic_index(sorted, value, Direction::Forward, Bound::Exclusive).map(|p| p.index)
}

/// Index of the last element strictly less than `value`, wrapping to the end.
pub fn prev_index<T: Ord>(sorted: &[T], value: &T) -> Option<usize> {
    cyclic_index(sorted, value, Direction::Backward, Bound::Exclusive).map(|p| p.index)
}
