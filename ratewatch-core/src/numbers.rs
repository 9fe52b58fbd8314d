//! Numeric conversion helpers centralizing safe numeric casts.

use num_traits::cast::cast;

/// Convert a sample count to f64, allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usize_conversion_is_exact_for_small_counts() {
        assert!((usize_to_f64(30) - 30.0).abs() < f64::EPSILON);
        assert!(usize_to_f64(0).abs() < f64::EPSILON);
    }
}
