use crate::VecMathError;

/// Keeps every `step`-th element starting at index 0.
pub fn decimate(v: &[f32], step: usize) -> Vec<f32> {
    v.iter().step_by(step.max(1)).copied().collect()
}

/// Decimation steps that bring `a` and `b` to the same width, or an error.
pub(crate) fn strides(a: usize, b: usize) -> Result<(usize, usize), VecMathError> {
    if a == b {
        Ok((1, 1))
    } else if a == b * 2 {
        Ok((2, 1))
    } else if b == a * 2 {
        Ok((1, 2))
    } else {
        Err(VecMathError::DimensionMismatch { a, b })
    }
}

/// Brings two vectors to a common width before arithmetic.
///
/// Equal widths pass through. If one vector is exactly twice as long as the
/// other, the longer one is stride-2 decimated. Deterministic: the same pair
/// always yields the same output.
pub fn reconcile_dimensions(a: &[f32], b: &[f32]) -> Result<(Vec<f32>, Vec<f32>), VecMathError> {
    let (sa, sb) = strides(a.len(), b.len())?;
    Ok((decimate(a, sa), decimate(b, sb)))
}

/// How [`normalize_width`] arrived at its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthFix {
    /// Already the requested width.
    Exact,
    /// Reconciled against the template (stride-2), or kept because the
    /// template would have been the one decimated.
    Reconciled,
    /// Reconciliation failed; decimated with this step and truncated.
    Strided(usize),
    /// Too short to fix; returned unchanged.
    Unfit,
}

/// Normalizes a vector to a fixed persisted `width`.
///
/// Mirrors reconciling against a zero template of `width`; when that fails
/// a vector longer than `width` is decimated with step `len / width` and
/// truncated, and a shorter one is returned as-is.
pub fn normalize_width(v: &[f32], width: usize) -> (Vec<f32>, WidthFix) {
    if v.len() == width || width == 0 {
        return (v.to_vec(), WidthFix::Exact);
    }
    match strides(v.len(), width) {
        Ok((step, _)) => (decimate(v, step), WidthFix::Reconciled),
        Err(_) if v.len() > width => {
            let step = v.len() / width;
            let mut out = decimate(v, step);
            out.truncate(width);
            (out, WidthFix::Strided(step))
        }
        Err(_) => (v.to_vec(), WidthFix::Unfit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_widths_pass_through() {
        let (a, b) = reconcile_dimensions(&[1.0, 2.0], &[3.0, 4.0]).unwrap();
        assert_eq!(a, vec![1.0, 2.0]);
        assert_eq!(b, vec![3.0, 4.0]);
    }

    #[test]
    fn test_longer_is_decimated_either_side() {
        let long = [1.0, 9.0, 2.0, 9.0, 3.0, 9.0];
        let short = [0.0, 0.0, 0.0];
        let (a, b) = reconcile_dimensions(&long, &short).unwrap();
        assert_eq!(a, vec![1.0, 2.0, 3.0]);
        assert_eq!(b, short.to_vec());

        let (a, b) = reconcile_dimensions(&short, &long).unwrap();
        assert_eq!(a, short.to_vec());
        assert_eq!(b, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let long: Vec<f32> = (0..16).map(|i| i as f32 * 0.5).collect();
        let short: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let first = reconcile_dimensions(&long, &short).unwrap();
        let second = reconcile_dimensions(&long, &short).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_other_mismatch_is_an_error() {
        let err = reconcile_dimensions(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err, VecMathError::DimensionMismatch { a: 3, b: 2 });
    }

    #[test]
    fn test_normalize_width_paths() {
        let v: Vec<f32> = (0..8).map(|i| i as f32).collect();
        assert_eq!(normalize_width(&v, 8), (v.clone(), WidthFix::Exact));

        let (half, fix) = normalize_width(&v, 4);
        assert_eq!(half, vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(fix, WidthFix::Reconciled);

        let (third, fix) = normalize_width(&v, 3);
        assert_eq!(third, vec![0.0, 2.0, 4.0]);
        assert_eq!(fix, WidthFix::Strided(2));

        let (short, fix) = normalize_width(&v[..3], 8);
        assert_eq!(short, vec![0.0, 1.0, 2.0]);
        assert_eq!(fix, WidthFix::Unfit);
    }

    #[test]
    fn test_normalize_width_keeps_half_width_vectors() {
        let v = vec![1.0; 4];
        let (out, fix) = normalize_width(&v, 8);
        assert_eq!(out.len(), 4);
        assert_eq!(fix, WidthFix::Reconciled);
    }
}
