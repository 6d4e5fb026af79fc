//! Arithmetic operators and comparisons.
//!
//! Each operator records one node. Mixing a `Var` with an `f64` treats the
//! scalar as a constant and records a unary node, so no leaf is created for
//! it.

use super::Var;
use num_traits::{One, Pow, Zero};
use std::cmp::Ordering;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

// =============================================================================
// Var ∘ Var
// =============================================================================

impl Add for Var {
    type Output = Var;

    /// ∂(a + b)/∂a = 1, ∂(a + b)/∂b = 1
    #[inline]
    fn add(self, rhs: Var) -> Var {
        self.map_binary(rhs, |a, b| (a + b, 1.0, 1.0))
    }
}

impl Sub for Var {
    type Output = Var;

    /// ∂(a - b)/∂a = 1, ∂(a - b)/∂b = -1
    #[inline]
    fn sub(self, rhs: Var) -> Var {
        self.map_binary(rhs, |a, b| (a - b, 1.0, -1.0))
    }
}

impl Mul for Var {
    type Output = Var;

    /// ∂(a × b)/∂a = b, ∂(a × b)/∂b = a
    #[inline]
    fn mul(self, rhs: Var) -> Var {
        self.map_binary(rhs, |a, b| (a * b, b, a))
    }
}

impl Div for Var {
    type Output = Var;

    /// ∂(a / b)/∂a = 1/b, ∂(a / b)/∂b = -a/b²
    #[inline]
    fn div(self, rhs: Var) -> Var {
        self.map_binary(rhs, |a, b| {
            let v = a / b;
            (v, 1.0 / b, -v / b)
        })
    }
}

impl Neg for Var {
    type Output = Var;

    #[inline]
    fn neg(self) -> Var {
        self.map_unary(|a| (-a, -1.0))
    }
}

// =============================================================================
// Var ∘ f64 and f64 ∘ Var
// =============================================================================

impl Add<f64> for Var {
    type Output = Var;

    #[inline]
    fn add(self, rhs: f64) -> Var {
        self.map_unary(|a| (a + rhs, 1.0))
    }
}

impl Add<Var> for f64 {
    type Output = Var;

    #[inline]
    fn add(self, rhs: Var) -> Var {
        rhs.map_unary(|b| (self + b, 1.0))
    }
}

impl Sub<f64> for Var {
    type Output = Var;

    #[inline]
    fn sub(self, rhs: f64) -> Var {
        self.map_unary(|a| (a - rhs, 1.0))
    }
}

impl Sub<Var> for f64 {
    type Output = Var;

    #[inline]
    fn sub(self, rhs: Var) -> Var {
        rhs.map_unary(|b| (self - b, -1.0))
    }
}

impl Mul<f64> for Var {
    type Output = Var;

    #[inline]
    fn mul(self, rhs: f64) -> Var {
        self.map_unary(|a| (a * rhs, rhs))
    }
}

impl Mul<Var> for f64 {
    type Output = Var;

    #[inline]
    fn mul(self, rhs: Var) -> Var {
        rhs.map_unary(|b| (self * b, self))
    }
}

impl Div<f64> for Var {
    type Output = Var;

    #[inline]
    fn div(self, rhs: f64) -> Var {
        self.map_unary(|a| (a / rhs, 1.0 / rhs))
    }
}

impl Div<Var> for f64 {
    type Output = Var;

    /// ∂(c / b)/∂b = -c/b²
    #[inline]
    fn div(self, rhs: Var) -> Var {
        rhs.map_unary(|b| {
            let v = self / b;
            (v, -v / b)
        })
    }
}

// =============================================================================
// Compound assignment
// =============================================================================

// Rebinds the handle to the result node; the old node is left untouched.
macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<Var> for Var {
            #[inline]
            fn $method(&mut self, rhs: Var) {
                *self = *self $op rhs;
            }
        }

        impl $trait<f64> for Var {
            #[inline]
            fn $method(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, +);
impl_assign_op!(SubAssign, sub_assign, -);
impl_assign_op!(MulAssign, mul_assign, *);
impl_assign_op!(DivAssign, div_assign, /);

// =============================================================================
// Comparisons on forward values
// =============================================================================

impl PartialEq for Var {
    fn eq(&self, other: &Var) -> bool {
        self.value() == other.value()
    }
}

impl PartialEq<f64> for Var {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialEq<Var> for f64 {
    fn eq(&self, other: &Var) -> bool {
        *self == other.value()
    }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl PartialOrd<f64> for Var {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value().partial_cmp(other)
    }
}

impl PartialOrd<Var> for f64 {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        self.partial_cmp(&other.value())
    }
}

// =============================================================================
// num-traits and iterator integration
// =============================================================================

impl Zero for Var {
    fn zero() -> Self {
        Var::new(0.0)
    }

    fn is_zero(&self) -> bool {
        self.value() == 0.0
    }
}

impl One for Var {
    fn one() -> Self {
        Var::new(1.0)
    }
}

impl Pow<f64> for Var {
    type Output = Var;

    fn pow(self, exponent: f64) -> Var {
        self.powf(exponent)
    }
}

impl Pow<i32> for Var {
    type Output = Var;

    fn pow(self, exponent: i32) -> Var {
        self.powi(exponent)
    }
}

impl Pow<Var> for Var {
    type Output = Var;

    fn pow(self, exponent: Var) -> Var {
        Var::pow(self, exponent)
    }
}

impl Sum for Var {
    /// Records a single n-ary node over all terms.
    fn sum<I: Iterator<Item = Var>>(iter: I) -> Var {
        let terms: Vec<Var> = iter.collect();
        super::sum(&terms)
    }
}

impl<'a> Sum<&'a Var> for Var {
    fn sum<I: Iterator<Item = &'a Var>>(iter: I) -> Var {
        let terms: Vec<Var> = iter.copied().collect();
        super::sum(&terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grad_of(x: &[f64], f: impl Fn(&[Var]) -> Var) -> (f64, Vec<f64>) {
        let vars: Vec<Var> = x.iter().map(|&v| Var::new(v)).collect();
        let y = f(&vars);
        y.grad().unwrap();
        (y.value(), vars.iter().map(Var::adjoint).collect())
    }

    #[test]
    fn test_var_var_arithmetic() {
        let (v, g) = grad_of(&[6.0, 2.0], |x| x[0] + x[1]);
        assert_eq!((v, g), (8.0, vec![1.0, 1.0]));

        let (v, g) = grad_of(&[6.0, 2.0], |x| x[0] - x[1]);
        assert_eq!((v, g), (4.0, vec![1.0, -1.0]));

        let (v, g) = grad_of(&[6.0, 2.0], |x| x[0] * x[1]);
        assert_eq!((v, g), (12.0, vec![2.0, 6.0]));

        let (v, g) = grad_of(&[6.0, 2.0], |x| x[0] / x[1]);
        assert_eq!((v, g), (3.0, vec![0.5, -1.5]));
    }

    #[test]
    fn test_scalar_mixes() {
        let (v, g) = grad_of(&[2.0], |x| 3.0 * x[0] - 1.0);
        assert_eq!((v, g), (5.0, vec![3.0]));

        let (v, g) = grad_of(&[2.0], |x| 1.0 - x[0] / 4.0);
        assert_eq!((v, g), (0.5, vec![-0.25]));

        let (v, g) = grad_of(&[2.0], |x| 8.0 / x[0] + x[0] * 0.5);
        assert_eq!(v, 5.0);
        assert_relative_eq!(g[0], -2.0 + 0.5);

        let (v, g) = grad_of(&[2.0], |x| 1.0 + (-x[0]));
        assert_eq!((v, g), (-1.0, vec![-1.0]));
    }

    #[test]
    fn test_compound_assignment_rebinds() {
        let x = Var::new(2.0);
        let mut acc = x;
        acc += x;
        acc *= 3.0;
        acc -= 1.0;
        acc /= x;
        // acc = (6x - 1) / x = 6 - 1/x
        assert_relative_eq!(acc.value(), 5.5);
        assert_eq!(x.value(), 2.0);
        acc.grad().unwrap();
        assert_relative_eq!(x.adjoint(), 0.25);
    }

    #[test]
    fn test_comparisons_use_forward_values() {
        let a = Var::new(1.0);
        let b = Var::new(2.0);
        assert!(a < b);
        assert!(b > 1.5);
        assert!(0.5 < a);
        assert!(a == 1.0);
        assert!(2.0 == b);
        assert!(a != b);
        assert!(Var::new(f64::NAN).partial_cmp(&a).is_none());
    }

    #[test]
    fn test_zero_one_and_sum() {
        assert!(Var::zero().is_zero());
        assert_eq!(Var::one().value(), 1.0);

        let xs: Vec<Var> = [1.0, 2.0, 3.0].iter().map(|&v| Var::new(v)).collect();
        let total: Var = xs.iter().sum();
        let total_owned: Var = xs.iter().copied().sum();
        assert_eq!(total.value(), 6.0);
        assert_eq!(total_owned.value(), 6.0);
        total.grad().unwrap();
        for x in &xs {
            assert_eq!(x.adjoint(), 1.0);
        }
    }

    #[test]
    fn test_pow_trait() {
        let x = Var::new(2.0);
        let y = Pow::pow(x, 3i32);
        let z = Pow::pow(x, 0.5f64);
        assert_eq!(y.value(), 8.0);
        assert_relative_eq!(z.value(), 2f64.sqrt(), epsilon = 1e-15);
        y.grad().unwrap();
        assert_eq!(x.adjoint(), 12.0);
    }
}
