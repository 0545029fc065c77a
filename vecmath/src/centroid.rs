use crate::VecMathError;
use crate::reconcile::{decimate, strides};

/// Tolerance under which a component counts as zero.
const ZERO_EPS: f32 = 1e-8;

/// True for empty vectors and vectors whose components are all (near) zero.
pub fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| x.abs() <= ZERO_EPS)
}

/// Arithmetic mean of one or more vectors.
///
/// The output has the narrowest input width; inputs exactly twice that
/// width are stride-2 decimated first.
pub fn mean<V: AsRef<[f32]>>(vectors: &[V]) -> Result<Vec<f32>, VecMathError> {
    let width = vectors
        .iter()
        .map(|v| v.as_ref().len())
        .min()
        .ok_or(VecMathError::EmptyInput)?;

    let mut sum = vec![0.0f64; width];
    for v in vectors {
        let v = v.as_ref();
        let (step, _) = strides(v.len(), width)?;
        for (acc, &x) in sum.iter_mut().zip(v.iter().step_by(step)) {
            *acc += x as f64;
        }
    }
    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|s| (s / n) as f32).collect())
}

/// Count-weighted mean of two vectors: `(a·wa + b·wb) / (wa + wb)`.
///
/// With `wb == 1` this is the incremental update of a centroid that gains
/// one member.
pub fn weighted_mean(a: &[f32], wa: u64, b: &[f32], wb: u64) -> Result<Vec<f32>, VecMathError> {
    let total = wa + wb;
    if total == 0 {
        return Err(VecMathError::EmptyInput);
    }
    let (sa, sb) = strides(a.len(), b.len())?;
    let (wa, wb, total) = (wa as f64, wb as f64, total as f64);
    Ok(decimate(a, sa)
        .iter()
        .zip(decimate(b, sb).iter())
        .map(|(&x, &y)| ((x as f64 * wa + y as f64 * wb) / total) as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero() {
        assert!(is_zero(&[]));
        assert!(is_zero(&[0.0, -0.0, 1e-9]));
        assert!(!is_zero(&[0.0, 0.01]));
    }

    #[test]
    fn test_mean_simple() {
        let m = mean(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 2.0]]).unwrap();
        assert_eq!(m, vec![1.0, 1.0]);
    }

    #[test]
    fn test_mean_mixed_widths() {
        let m = mean(&[vec![2.0, 9.0, 4.0, 9.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(m, vec![1.0, 2.0]);
    }

    #[test]
    fn test_mean_errors() {
        let empty: Vec<Vec<f32>> = Vec::new();
        assert_eq!(mean(&empty).unwrap_err(), VecMathError::EmptyInput);
        assert!(mean(&[vec![1.0, 2.0, 3.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_weighted_mean_incremental_update() {
        // Centroid of 3 members plus one new vector.
        let c = weighted_mean(&[1.0, 1.0], 3, &[5.0, -3.0], 1).unwrap();
        assert_eq!(c, vec![2.0, 0.0]);
    }

    #[test]
    fn test_weighted_mean_reconciles() {
        let c = weighted_mean(&[1.0, 7.0, 1.0, 7.0], 1, &[3.0, 3.0], 1).unwrap();
        assert_eq!(c, vec![2.0, 2.0]);
        assert!(weighted_mean(&[1.0], 0, &[1.0], 0).is_err());
    }
}
