//! Near-equal splitting of an integer range into contiguous partitions.

/// Clamp a requested partition count to `max(min(requested, n), 1)`.
///
/// A table never has more partitions than rows, and always has at least one
/// partition even when empty.
pub fn clamp_partitions(n: usize, requested: usize) -> usize {
    requested.min(n).max(1)
}

/// Split `n` elements into `k` contiguous segment sizes.
///
/// Sizes differ by at most one (the first `n % k` segments take the extra
/// element) and sum to `n`. `k` is expected to have been clamped via
/// [`clamp_partitions`]; a zero `k` yields no segments.
pub fn partition(n: usize, k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    let quot = n / k;
    let rem = n % k;
    (0..k).map(|i| quot + usize::from(i < rem)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_near_equally() {
        assert_eq!(partition(10, 3), vec![4, 3, 3]);
        assert_eq!(partition(9, 3), vec![3, 3, 3]);
        assert_eq!(partition(1, 1), vec![1]);
        assert_eq!(partition(0, 1), vec![0]);
    }

    #[test]
    fn clamps_requested_partitions() {
        assert_eq!(clamp_partitions(10, 3), 3);
        assert_eq!(clamp_partitions(5, 10), 5);
        assert_eq!(clamp_partitions(0, 7), 1);
        assert_eq!(clamp_partitions(3, 0), 1);
    }

    #[test]
    fn sizes_sum_and_balance_over_a_grid() {
        for n in 0..40 {
            for requested in 1..10 {
                let k = clamp_partitions(n, requested);
                let sizes = partition(n, k);
                assert_eq!(sizes.len(), k);
                assert_eq!(sizes.iter().sum::<usize>(), n);
                let max = sizes.iter().max().copied().unwrap_or(0);
                let min = sizes.iter().min().copied().unwrap_or(0);
                assert!(max - min <= 1, "unbalanced split for n={n} k={k}: {sizes:?}");
            }
        }
    }
}
