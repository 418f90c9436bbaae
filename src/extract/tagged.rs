//! Bucketing of tagged result rows.

use crate::domain::{LimitRecord, Method, Quantile, ToyRow};

/// Map a continuous quantile tag onto a quantile bucket.
///
/// Negative tags mark the observed limit. The lower bound of each expected
/// bucket is inclusive: `0.03 -> m1s`, `0.2 -> med`, `0.6 -> p1s`, `0.9 -> p2s`.
pub fn bucket(q: f64) -> Quantile {
    if q < 0.0 {
        Quantile::Obs
    } else if q < 0.03 {
        Quantile::M2s
    } else if q < 0.2 {
        Quantile::M1s
    } else if q < 0.6 {
        Quantile::Med
    } else if q < 0.9 {
        Quantile::P1s
    } else {
        Quantile::P2s
    }
}

/// Classify rows into quantiles. The last row in a bucket wins.
///
/// Rows with a non-positive (or NaN) limit or without a tag are dropped first.
pub fn classify_tagged(rows: &[ToyRow], method: Method) -> LimitRecord {
    let mut record = LimitRecord::new(method);
    for row in rows {
        let Some(q) = row.quantile else { continue };
        if q.is_nan() || !(row.limit > 0.0) || !row.limit.is_finite() {
            continue;
        }
        record.set(bucket(q), row.limit);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_resolve_to_upper_bucket() {
        assert_eq!(bucket(-1.0), Quantile::Obs);
        assert_eq!(bucket(-1e-12), Quantile::Obs);
        assert_eq!(bucket(0.0), Quantile::M2s);
        assert_eq!(bucket(0.03), Quantile::M1s);
        assert_eq!(bucket(0.2), Quantile::Med);
        assert_eq!(bucket(0.6), Quantile::P1s);
        assert_eq!(bucket(0.9), Quantile::P2s);
        assert_eq!(bucket(f64::INFINITY), Quantile::P2s);
        assert_eq!(bucket(f64::NEG_INFINITY), Quantile::Obs);
    }

    #[test]
    fn every_tag_lands_in_exactly_one_bucket() {
        // Buckets are monotone in q: walking q upwards never moves backwards.
        let mut last = Quantile::Obs;
        let mut q = -0.5;
        while q < 1.5 {
            let b = bucket(q);
            assert!(b >= last, "bucket moved backwards at q={q}");
            last = b;
            q += 0.001;
        }
    }

    #[test]
    fn last_row_wins_and_garbage_is_dropped() {
        let rows = vec![
            ToyRow { quantile: Some(0.5), limit: 2.0, toy: None },
            ToyRow { quantile: Some(0.45), limit: 2.2, toy: None },
            ToyRow { quantile: Some(0.16), limit: f64::NAN, toy: None },
            ToyRow { quantile: Some(0.84), limit: -1.0, toy: None },
            ToyRow { quantile: None, limit: 9.0, toy: Some(3) },
        ];
        let record = classify_tagged(&rows, Method::FullCls);
        assert_eq!(record.get(Quantile::Med), Some(2.2));
        assert_eq!(record.get(Quantile::M1s), None);
        assert_eq!(record.get(Quantile::P1s), None);
        assert_eq!(record.values.len(), 1);
    }
}
