//! Elementary functions on tracked scalars.
//!
//! Each function records one node whose partial is the analytic derivative
//! at the forward value. Non-differentiable points use the conventions
//! below:
//!
//! | Function | Point | Partial |
//! |----------|-------|---------|
//! | `abs` | 0 | 0 |
//! | `floor`, `ceil` | everywhere | 0 |
//! | `fmax`, `fmin` | ties | left operand |
//! | `fdim` | `a <= b` | 0 for both |
//! | `hypot` | (0, 0) | 0 for both |
//! | `pow` | base 0 | 0 for the exponent |

use super::Var;
use std::f64::consts::{LN_10, LN_2};

#[inline]
fn inv_logit(a: f64) -> f64 {
    if a >= 0.0 {
        1.0 / (1.0 + (-a).exp())
    } else {
        let e = a.exp();
        e / (1.0 + e)
    }
}

#[inline]
fn log1p_exp(a: f64) -> f64 {
    if a > 0.0 {
        a + (-a).exp().ln_1p()
    } else {
        a.exp().ln_1p()
    }
}

impl Var {
    // =========================================================================
    // Exponentials and logarithms
    // =========================================================================

    /// Exponential: d(eᵃ)/da = eᵃ
    pub fn exp(self) -> Var {
        self.map_unary(|a| {
            let v = a.exp();
            (v, v)
        })
    }

    /// Base-2 exponential: d(2ᵃ)/da = 2ᵃ ln 2
    pub fn exp2(self) -> Var {
        self.map_unary(|a| {
            let v = a.exp2();
            (v, v * LN_2)
        })
    }

    /// `eᵃ - 1`, accurate near zero.
    pub fn expm1(self) -> Var {
        self.map_unary(|a| (a.exp_m1(), a.exp()))
    }

    /// Natural logarithm: d(ln a)/da = 1/a
    pub fn ln(self) -> Var {
        self.map_unary(|a| (a.ln(), 1.0 / a))
    }

    /// Base-2 logarithm.
    pub fn log2(self) -> Var {
        self.map_unary(|a| (a.log2(), 1.0 / (a * LN_2)))
    }

    /// Base-10 logarithm.
    pub fn log10(self) -> Var {
        self.map_unary(|a| (a.log10(), 1.0 / (a * LN_10)))
    }

    /// `ln(1 + a)`, accurate near zero.
    pub fn log1p(self) -> Var {
        self.map_unary(|a| (a.ln_1p(), 1.0 / (1.0 + a)))
    }

    /// Logistic sigmoid `1 / (1 + e⁻ᵃ)`: derivative `v (1 - v)`
    pub fn inv_logit(self) -> Var {
        self.map_unary(|a| {
            let v = inv_logit(a);
            (v, v * (1.0 - v))
        })
    }

    /// `ln(1 + eᵃ)` without overflow for large `a`: derivative `inv_logit(a)`
    pub fn log1p_exp(self) -> Var {
        self.map_unary(|a| (log1p_exp(a), inv_logit(a)))
    }

    // =========================================================================
    // Powers and roots
    // =========================================================================

    /// Square root: d(√a)/da = 1/(2√a)
    pub fn sqrt(self) -> Var {
        self.map_unary(|a| {
            let v = a.sqrt();
            (v, 0.5 / v)
        })
    }

    /// Cube root: d(∛a)/da = 1/(3 ∛a²)
    pub fn cbrt(self) -> Var {
        self.map_unary(|a| {
            let v = a.cbrt();
            (v, 1.0 / (3.0 * v * v))
        })
    }

    /// `a²`
    pub fn square(self) -> Var {
        self.map_unary(|a| (a * a, 2.0 * a))
    }

    /// `1/a`: derivative `-1/a²`
    pub fn recip(self) -> Var {
        self.map_unary(|a| {
            let v = 1.0 / a;
            (v, -v * v)
        })
    }

    /// Integer power: d(aⁿ)/da = n aⁿ⁻¹
    pub fn powi(self, n: i32) -> Var {
        self.map_unary(|a| {
            let partial = if n == 0 {
                0.0
            } else {
                f64::from(n) * a.powi(n - 1)
            };
            (a.powi(n), partial)
        })
    }

    /// Constant real power: d(aᶜ)/da = c aᶜ⁻¹
    pub fn powf(self, c: f64) -> Var {
        self.map_unary(|a| {
            let partial = if c == 0.0 { 0.0 } else { c * a.powf(c - 1.0) };
            (a.powf(c), partial)
        })
    }

    /// Tracked power `aᵇ`: ∂/∂a = b aᵇ⁻¹, ∂/∂b = aᵇ ln a
    pub fn pow(self, exponent: Var) -> Var {
        self.map_binary(exponent, |a, b| {
            let v = a.powf(b);
            let da = if b == 0.0 { 0.0 } else { b * a.powf(b - 1.0) };
            let db = if a == 0.0 { 0.0 } else { v * a.ln() };
            (v, da, db)
        })
    }

    /// `√(a² + b²)` without intermediate overflow.
    pub fn hypot(self, other: Var) -> Var {
        self.map_binary(other, |a, b| {
            let v = a.hypot(b);
            if v == 0.0 {
                (v, 0.0, 0.0)
            } else {
                (v, a / v, b / v)
            }
        })
    }

    // =========================================================================
    // Trigonometric and hyperbolic
    // =========================================================================

    /// Sine: d(sin a)/da = cos a
    pub fn sin(self) -> Var {
        self.map_unary(|a| (a.sin(), a.cos()))
    }

    /// Cosine: d(cos a)/da = -sin a
    pub fn cos(self) -> Var {
        self.map_unary(|a| (a.cos(), -a.sin()))
    }

    /// Tangent: d(tan a)/da = 1 + tan² a
    pub fn tan(self) -> Var {
        self.map_unary(|a| {
            let v = a.tan();
            (v, 1.0 + v * v)
        })
    }

    /// Arcsine: 1/√(1 - a²)
    pub fn asin(self) -> Var {
        self.map_unary(|a| (a.asin(), 1.0 / (1.0 - a * a).sqrt()))
    }

    /// Arccosine: -1/√(1 - a²)
    pub fn acos(self) -> Var {
        self.map_unary(|a| (a.acos(), -1.0 / (1.0 - a * a).sqrt()))
    }

    /// Arctangent: 1/(1 + a²)
    pub fn atan(self) -> Var {
        self.map_unary(|a| (a.atan(), 1.0 / (1.0 + a * a)))
    }

    /// Four-quadrant arctangent of `self / x`.
    ///
    /// ∂/∂y = x/(x² + y²), ∂/∂x = -y/(x² + y²)
    pub fn atan2(self, x: Var) -> Var {
        self.map_binary(x, |y, x| {
            let r2 = x * x + y * y;
            (y.atan2(x), x / r2, -y / r2)
        })
    }

    /// Hyperbolic sine: d(sinh a)/da = cosh a
    pub fn sinh(self) -> Var {
        self.map_unary(|a| (a.sinh(), a.cosh()))
    }

    /// Hyperbolic cosine: d(cosh a)/da = sinh a
    pub fn cosh(self) -> Var {
        self.map_unary(|a| (a.cosh(), a.sinh()))
    }

    /// Hyperbolic tangent: 1 - tanh² a
    pub fn tanh(self) -> Var {
        self.map_unary(|a| {
            let v = a.tanh();
            (v, 1.0 - v * v)
        })
    }

    /// Inverse hyperbolic sine: 1/√(a² + 1)
    pub fn asinh(self) -> Var {
        self.map_unary(|a| (a.asinh(), 1.0 / (a * a + 1.0).sqrt()))
    }

    /// Inverse hyperbolic cosine: 1/√(a² - 1)
    pub fn acosh(self) -> Var {
        self.map_unary(|a| (a.acosh(), 1.0 / (a * a - 1.0).sqrt()))
    }

    /// Inverse hyperbolic tangent: 1/(1 - a²)
    pub fn atanh(self) -> Var {
        self.map_unary(|a| (a.atanh(), 1.0 / (1.0 - a * a)))
    }

    // =========================================================================
    // Piecewise
    // =========================================================================

    /// Absolute value, with derivative 0 at 0.
    pub fn abs(self) -> Var {
        self.map_unary(|a| {
            let partial = if a > 0.0 {
                1.0
            } else if a < 0.0 {
                -1.0
            } else {
                0.0
            };
            (a.abs(), partial)
        })
    }

    /// Largest integer not above `a`. Derivative is 0.
    pub fn floor(self) -> Var {
        self.map_unary(|a| (a.floor(), 0.0))
    }

    /// Smallest integer not below `a`. Derivative is 0.
    pub fn ceil(self) -> Var {
        self.map_unary(|a| (a.ceil(), 0.0))
    }

    /// Larger of two values. Ties select `self`.
    pub fn fmax(self, other: Var) -> Var {
        self.map_binary(other, |a, b| {
            if a >= b || b.is_nan() {
                (a, 1.0, 0.0)
            } else {
                (b, 0.0, 1.0)
            }
        })
    }

    /// Smaller of two values. Ties select `self`.
    pub fn fmin(self, other: Var) -> Var {
        self.map_binary(other, |a, b| {
            if a <= b || b.is_nan() {
                (a, 1.0, 0.0)
            } else {
                (b, 0.0, 1.0)
            }
        })
    }

    /// Positive difference `max(a - b, 0)`.
    pub fn fdim(self, other: Var) -> Var {
        self.map_binary(other, |a, b| {
            if a > b {
                (a - b, 1.0, -1.0)
            } else {
                (0.0, 0.0, 0.0)
            }
        })
    }
}
