//! Memory budget for arena growth.
//!
//! A budget caps the bytes an [`Arena`](super::Arena) may reserve from the
//! system and defines a warning threshold below that cap.

/// Memory budget for arena storage.
///
/// # Example
///
/// ```rust
/// use adjoint_core::arena::MemoryBudget;
///
/// // 64 MB budget, warn at 90%
/// let budget = MemoryBudget::from_mb(64).with_warning_threshold(0.9);
///
/// assert!(budget.is_within_budget(32 * 1024 * 1024));
/// assert!(!budget.is_warning(32 * 1024 * 1024));
/// assert!(budget.is_warning(60 * 1024 * 1024));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryBudget {
    /// Maximum reserved memory in bytes
    max_bytes: usize,

    /// Warning threshold as a fraction (0.0 to 1.0)
    warning_threshold: f64,
}

impl MemoryBudget {
    /// Creates a new memory budget with the specified maximum in bytes.
    ///
    /// The warning threshold defaults to 80% of the maximum.
    ///
    /// # Example
    ///
    /// ```rust
    /// use adjoint_core::arena::MemoryBudget;
    ///
    /// let budget = MemoryBudget::new(8 * 1024 * 1024);
    /// assert_eq!(budget.max_bytes(), 8 * 1024 * 1024);
    /// assert_eq!(budget.warning_threshold(), 0.8);
    /// ```
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            warning_threshold: 0.8,
        }
    }

    /// Creates a memory budget from megabytes.
    #[inline]
    pub fn from_mb(mb: usize) -> Self {
        Self::new(mb * 1024 * 1024)
    }

    /// Creates a memory budget from gigabytes.
    #[inline]
    pub fn from_gb(gb: usize) -> Self {
        Self::new(gb * 1024 * 1024 * 1024)
    }

    /// Sets the warning threshold as a fraction of maximum.
    ///
    /// # Panics
    ///
    /// Panics if threshold is not in [0.0, 1.0].
    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&threshold),
            "Warning threshold must be between 0.0 and 1.0"
        );
        self.warning_threshold = threshold;
        self
    }

    /// Returns the maximum memory in bytes.
    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the warning threshold.
    #[inline]
    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    /// Checks if the given reservation fits in the budget.
    #[inline]
    pub fn is_within_budget(&self, reserved: usize) -> bool {
        reserved <= self.max_bytes
    }

    /// Checks if the given reservation exceeds the warning threshold.
    #[inline]
    pub fn is_warning(&self, reserved: usize) -> bool {
        let threshold_bytes = (self.max_bytes as f64 * self.warning_threshold) as usize;
        reserved > threshold_bytes
    }

    /// Bytes still available before the cap is reached.
    #[inline]
    pub fn remaining(&self, reserved: usize) -> usize {
        self.max_bytes.saturating_sub(reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_from_units() {
        assert_eq!(MemoryBudget::from_mb(2).max_bytes(), 2 * 1024 * 1024);
        assert_eq!(MemoryBudget::from_gb(1).max_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn test_budget_warning_threshold() {
        let budget = MemoryBudget::new(1000).with_warning_threshold(0.5);
        assert!(!budget.is_warning(500));
        assert!(budget.is_warning(501));
        assert!(budget.is_within_budget(1000));
        assert!(!budget.is_within_budget(1001));
    }

    #[test]
    fn test_budget_remaining_saturates() {
        let budget = MemoryBudget::new(100);
        assert_eq!(budget.remaining(40), 60);
        assert_eq!(budget.remaining(400), 0);
    }

    #[test]
    #[should_panic(expected = "Warning threshold must be between 0.0 and 1.0")]
    fn test_budget_rejects_threshold_above_one() {
        let _ = MemoryBudget::new(100).with_warning_threshold(1.5);
    }
}
