//! Data preparation primitives the training core needs in-process:
//! fixed-width age binning for the stratification bucket column, and the
//! per-bucket count-matched subsample used when fitting the distribution
//! mapper.

use std::collections::BTreeMap;

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::Frame;
use crate::error::PredageError;

/// Bin `col` into left-closed fixed-width bins and append the bucket column
/// `{col}_group` holding each bin's lower edge.
pub fn bin_ages(
    frame: &mut Frame,
    col: &str,
    min_val: f64,
    max_val: f64,
    step: f64,
) -> Result<(), PredageError> {
    let values = frame.column(col)?;
    let mut buckets = Vec::with_capacity(values.len());
    for &v in values.iter() {
        if v < min_val || v >= max_val + step {
            return Err(PredageError::OutOfDomain {
                column: col.to_string(),
                lo: min_val,
                hi: max_val + step,
            });
        }
        buckets.push(min_val + ((v - min_val) / step).floor() * step);
    }
    frame.push_column(&format!("{}_group", col), Array1::from_vec(buckets))
}

/// Subsample so both cohorts contribute comparably per stratification bucket.
///
/// For every bucket observed in the true group (`cat_col` nonzero), rows are
/// drawn without replacement from the false group in the same bucket to match
/// the true group's count; if the false group has fewer rows in that bucket,
/// all of them are used. The full true group is always kept. With
/// `match_nsamples` off, the frame is merely restricted to buckets present in
/// the true group.
pub fn matched_subsample(
    frame: &Frame,
    cat_col: &str,
    sample_col: &str,
    match_nsamples: bool,
    seed: u64,
) -> Result<Frame, PredageError> {
    let cat = frame.column(cat_col)?;
    let sample = frame.column(sample_col)?;

    let is_true = |i: usize| cat[i] > 0.5;

    // true-group row counts per bucket, keyed by bit pattern for exactness
    let mut true_counts: BTreeMap<u64, usize> = BTreeMap::new();
    for i in 0..frame.nrows() {
        if is_true(i) {
            *true_counts.entry(sample[i].to_bits()).or_insert(0) += 1;
        }
    }

    let mut keep: Vec<usize> = Vec::new();
    if match_nsamples {
        let mut rng = StdRng::seed_from_u64(seed);
        for (&bucket, &needed) in &true_counts {
            let mut candidates: Vec<usize> = (0..frame.nrows())
                .filter(|&i| !is_true(i) && sample[i].to_bits() == bucket)
                .collect();
            candidates.shuffle(&mut rng);
            candidates.truncate(needed);
            candidates.sort_unstable();
            keep.extend(candidates);
        }
        keep.extend((0..frame.nrows()).filter(|&i| is_true(i)));
    } else {
        keep.extend(
            (0..frame.nrows()).filter(|&i| true_counts.contains_key(&sample[i].to_bits())),
        );
    }

    Ok(frame.select_rows(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn cohort_frame() -> Frame {
        // 4 true rows (buckets 60, 60, 62.5, 65) and 6 false rows
        let rows = vec![
            vec![1.0, 60.0],
            vec![1.0, 61.0],
            vec![1.0, 63.0],
            vec![1.0, 66.0],
            vec![0.0, 60.5],
            vec![0.0, 61.2],
            vec![0.0, 62.0],
            vec![0.0, 63.9],
            vec![0.0, 70.0],
            vec![0.0, 71.0],
        ];
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let mut frame = Frame::new(
            (0..10).collect(),
            vec!["tracer".to_string(), "chron_age".to_string()],
            Array2::from_shape_vec((10, 2), flat).unwrap(),
        )
        .unwrap();
        bin_ages(&mut frame, "chron_age", 0.0, 100.0, 2.5).unwrap();
        frame
    }

    #[test]
    fn bin_ages_uses_left_closed_edges() {
        let frame = cohort_frame();
        let groups = frame.column("chron_age_group").unwrap();
        assert_eq!(groups[0], 60.0);
        assert_eq!(groups[1], 60.0);
        assert_eq!(groups[2], 62.5);
        assert_eq!(groups[3], 65.0);
    }

    #[test]
    fn bin_ages_rejects_out_of_range() {
        let mut frame = Frame::new(
            vec![0],
            vec!["chron_age".to_string()],
            Array2::from_shape_vec((1, 1), vec![120.0]).unwrap(),
        )
        .unwrap();
        assert!(bin_ages(&mut frame, "chron_age", 0.0, 100.0, 2.5).is_err());
    }

    #[test]
    fn matched_subsample_balances_buckets() {
        let frame = cohort_frame();
        let matched =
            matched_subsample(&frame, "tracer", "chron_age_group", true, 0).unwrap();

        // true bucket 60.0 has two rows, false bucket 60.0 offers three:
        // exactly two are drawn. Bucket 62.5: one of one. Bucket 65.0 has no
        // false rows at all, which is fine.
        let cat = matched.column("tracer").unwrap();
        let n_true = cat.iter().filter(|&&v| v > 0.5).count();
        let n_false = cat.iter().filter(|&&v| v <= 0.5).count();
        assert_eq!(n_true, 4);
        assert_eq!(n_false, 3);
    }

    #[test]
    fn matched_subsample_is_seed_deterministic() {
        let frame = cohort_frame();
        let a = matched_subsample(&frame, "tracer", "chron_age_group", true, 9).unwrap();
        let b = matched_subsample(&frame, "tracer", "chron_age_group", true, 9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unmatched_keeps_only_shared_buckets() {
        let frame = cohort_frame();
        let restricted =
            matched_subsample(&frame, "tracer", "chron_age_group", false, 0).unwrap();
        // the two false rows in bucket 70.0 are not covered by the true group
        assert_eq!(restricted.nrows(), 8);
    }
}
