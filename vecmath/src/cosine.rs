use crate::VecMathError;
use crate::reconcile::strides;

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value in `[-1, 1]`. Empty inputs and zero-norm vectors yield
/// `0.0` rather than an error. If one vector is exactly twice as long as the
/// other, the longer one is read with stride 2; any other width mismatch is
/// an error.
///
/// Uses f64 intermediate precision.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, VecMathError> {
    if a.is_empty() || b.is_empty() {
        return Ok(0.0);
    }
    let (sa, sb) = strides(a.len(), b.len())?;

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;

    for (&x, &y) in a.iter().step_by(sa).zip(b.iter().step_by(sb)) {
        let x = x as f64;
        let y = y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    // Clamp to [-1, 1] to handle floating point errors.
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let s = cosine_similarity(&[0.3, -1.2, 4.0], &[0.3, -1.2, 4.0]).unwrap();
        assert!((s - 1.0).abs() < 1e-6, "identical: got {s}");
    }

    #[test]
    fn test_orthogonal() {
        let s = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).unwrap();
        assert!(s.abs() < 1e-6, "orthogonal: got {s}");
    }

    #[test]
    fn test_opposite() {
        let s = cosine_similarity(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]).unwrap();
        assert!((s + 1.0).abs() < 1e-6, "opposite: got {s}");
    }

    #[test]
    fn test_symmetric() {
        let a = [0.2, 0.7, -0.1, 0.4];
        let b = [0.9, -0.3, 0.5, 0.05];
        assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    #[test]
    fn test_zero_and_empty_are_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[1.0, 0.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[2.0], &[0.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_double_width_is_decimated() {
        // Odd positions are noise that stride-2 reading drops.
        let long = [1.0, 50.0, 0.0, -50.0, 0.0, 7.0];
        let short = [1.0, 0.0, 0.0];
        let s = cosine_similarity(&long, &short).unwrap();
        assert!((s - 1.0).abs() < 1e-6, "decimated: got {s}");
        assert_eq!(s, cosine_similarity(&short, &long).unwrap());
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        assert_eq!(err, VecMathError::DimensionMismatch { a: 2, b: 3 });
    }
}
