//! "Largest wins" selection.
//!
//! The direction classifier, the route-consistency filter and the route
//! builder all keep the biggest partition. They share this helper so ties
//! resolve identically everywhere: the lowest index wins.

/// Index of the item with the greatest size, ties broken by lowest index.
///
/// Returns `None` for an empty input.
///
/// # Example
/// ```
/// use route_skeleton::selection::largest_by;
///
/// let clusters = vec![vec![1, 2], vec![3, 4, 5], vec![6, 7, 8]];
/// assert_eq!(largest_by(&clusters, |c| c.len()), Some(1));
/// ```
pub fn largest_by<T, F>(items: &[T], size: F) -> Option<usize>
where
    F: Fn(&T) -> usize,
{
    let mut best: Option<(usize, usize)> = None;
    for (idx, item) in items.iter().enumerate() {
        let s = size(item);
        match best {
            Some((_, best_size)) if s <= best_size => {}
            _ => best = Some((idx, s)),
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let empty: Vec<Vec<u8>> = vec![];
        assert_eq!(largest_by(&empty, |v| v.len()), None);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        let sizes = [3usize, 5, 5, 1];
        assert_eq!(largest_by(&sizes, |s| *s), Some(1));
    }

    #[test]
    fn test_all_zero_picks_first() {
        let sizes = [0usize, 0, 0];
        assert_eq!(largest_by(&sizes, |s| *s), Some(0));
    }
}
