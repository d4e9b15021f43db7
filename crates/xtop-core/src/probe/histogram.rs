//! Log2 latency histogram percentile extraction. Kernel-side BPF
//! maps bucket samples by `floor(log2(microseconds))`; this turns the bucket
//! counts into p50/p95/p99 estimates in nanoseconds.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Percentiles {
    pub p50_ns: f64,
    pub p95_ns: f64,
    pub p99_ns: f64,
}

/// Bucket `i` covers `[2^i, 2^(i+1))` microseconds; its value is taken as the
/// midpoint `1.5 * 2^i` microseconds. `buckets[i]` is the sample count in
/// that bucket.
fn bucket_midpoint_ns(i: usize) -> f64 {
    1.5 * 2f64.powi(i as i32) * 1000.0
}

/// Smallest bucket whose cumulative count reaches `target`, or the last
/// non-empty bucket if `target` exceeds the total.
fn bucket_for_target(buckets: &[u64], target: u64) -> Option<usize> {
    let mut cumulative = 0u64;
    for (i, count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return Some(i);
        }
    }
    buckets.iter().rposition(|&c| c > 0)
}

/// `n = 0` yields all-zero percentiles.
pub fn percentiles(buckets: &[u64]) -> Percentiles {
    let n: u64 = buckets.iter().sum();
    if n == 0 {
        return Percentiles::default();
    }
    let p50_target = (n + 1) / 2;
    let p95_target = n * 95 / 100 + 1;
    let p99_target = n * 99 / 100 + 1;

    let p50 = bucket_for_target(buckets, p50_target).map(bucket_midpoint_ns).unwrap_or(0.0);
    let p95 = bucket_for_target(buckets, p95_target).map(bucket_midpoint_ns).unwrap_or(0.0);
    let p99 = bucket_for_target(buckets, p99_target).map(bucket_midpoint_ns).unwrap_or(0.0);
    Percentiles { p50_ns: p50, p95_ns: p95, p99_ns: p99 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_yields_zero_percentiles() {
        assert_eq!(percentiles(&[]), Percentiles::default());
    }

    #[test]
    fn single_bucket_all_percentiles_equal_its_midpoint() {
        let mut buckets = vec![0u64; 10];
        buckets[4] = 100;
        let p = percentiles(&buckets);
        let expected = bucket_midpoint_ns(4);
        assert_eq!(p.p50_ns, expected);
        assert_eq!(p.p95_ns, expected);
        assert_eq!(p.p99_ns, expected);
    }

    #[test]
    fn skewed_histogram_places_tail_percentiles_in_higher_buckets() {
        let mut buckets = vec![0u64; 10];
        buckets[0] = 95;
        buckets[8] = 5;
        let p = percentiles(&buckets);
        assert_eq!(p.p50_ns, bucket_midpoint_ns(0));
        assert_eq!(p.p99_ns, bucket_midpoint_ns(8));
    }

    #[test]
    fn target_beyond_total_falls_back_to_last_nonempty_bucket() {
        let mut buckets = vec![0u64; 3];
        buckets[1] = 1;
        let p = percentiles(&buckets);
        assert_eq!(p.p99_ns, bucket_midpoint_ns(1));
    }
}
