//! Argument checks.
//!
//! Each check returns `AdError::InvalidArgument` naming the calling function
//! and the offending argument, so failures can be reported before any node
//! is recorded.

use crate::error::{AdError, AdResult};

fn invalid(
    function: &'static str,
    argument: &'static str,
    value: f64,
    requirement: impl Into<String>,
) -> AdError {
    AdError::InvalidArgument {
        function,
        argument,
        value: value.to_string(),
        requirement: requirement.into(),
    }
}

/// Rejects NaN and infinite values.
///
/// # Examples
///
/// ```
/// use adjoint_core::validate::check_finite;
///
/// assert!(check_finite("demo", "x", 1.0).is_ok());
/// assert!(check_finite("demo", "x", f64::INFINITY).is_err());
/// ```
pub fn check_finite(function: &'static str, argument: &'static str, value: f64) -> AdResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(function, argument, value, "finite"))
    }
}

/// Rejects NaN.
pub fn check_not_nan(function: &'static str, argument: &'static str, value: f64) -> AdResult<()> {
    if value.is_nan() {
        Err(invalid(function, argument, value, "not nan"))
    } else {
        Ok(())
    }
}

/// Requires `value > 0`.
pub fn check_positive(function: &'static str, argument: &'static str, value: f64) -> AdResult<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(function, argument, value, "positive"))
    }
}

/// Requires `value >= 0`.
pub fn check_nonnegative(
    function: &'static str,
    argument: &'static str,
    value: f64,
) -> AdResult<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(function, argument, value, "nonnegative"))
    }
}

/// Requires `low <= value <= high`.
pub fn check_bounded(
    function: &'static str,
    argument: &'static str,
    value: f64,
    low: f64,
    high: f64,
) -> AdResult<()> {
    if (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(invalid(
            function,
            argument,
            value,
            format!("in the interval [{}, {}]", low, high),
        ))
    }
}

/// Requires two sequences to have the same length.
pub fn check_consistent_sizes(
    function: &'static str,
    argument: &'static str,
    len: usize,
    expected: usize,
) -> AdResult<()> {
    if len == expected {
        Ok(())
    } else {
        Err(AdError::InvalidArgument {
            function,
            argument,
            value: format!("of length {}", len),
            requirement: format!("of length {}", expected),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_finite() {
        assert!(check_finite("f", "x", 0.0).is_ok());
        assert!(check_finite("f", "x", f64::NAN).is_err());
        assert!(check_finite("f", "x", f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_check_not_nan_accepts_infinity() {
        assert!(check_not_nan("f", "x", f64::INFINITY).is_ok());
        assert!(check_not_nan("f", "x", f64::NAN).is_err());
    }

    #[test]
    fn test_check_positive_and_nonnegative() {
        assert!(check_positive("f", "x", 1e-300).is_ok());
        assert!(check_positive("f", "x", 0.0).is_err());
        assert!(check_nonnegative("f", "x", 0.0).is_ok());
        assert!(check_nonnegative("f", "x", -1e-300).is_err());
        assert!(check_nonnegative("f", "x", f64::NAN).is_err());
    }

    #[test]
    fn test_check_bounded_message() {
        let err = check_bounded("logit", "p", 1.5, 0.0, 1.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "logit: p is 1.5, but must be in the interval [0, 1]"
        );
    }

    #[test]
    fn test_check_consistent_sizes() {
        assert!(check_consistent_sizes("dot", "rhs", 3, 3).is_ok());
        let err = check_consistent_sizes("dot", "rhs", 2, 3).unwrap_err();
        assert_eq!(err.to_string(), "dot: rhs is of length 2, but must be of length 3");
    }
}
