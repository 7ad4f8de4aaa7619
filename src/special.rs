//! Modified Bessel functions of the first kind.
//!
//! The von Mises distribution needs `I0`, `I1` and `I2` for its pdf
//! normaliser and for the Newton solve of the concentration parameter.
//! The evaluations use the Abramowitz & Stegun rational approximations
//! (9.8.1-9.8.4), accurate to roughly 1e-7 relative error, which is far
//! below the tolerances of the fitting procedure.

/// Modified Bessel function of the first kind, order zero.
///
/// Overflows to `f64::INFINITY` for arguments beyond ~709; callers that
/// may pass large concentrations must check for a finite result.
pub fn bessel_i0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.75 {
        let t = (x / 3.75) * (x / 3.75);
        1.0 + t
            * (3.5156229
                + t * (3.0899424
                    + t * (1.2067492 + t * (0.2659732 + t * (0.0360768 + t * 0.0045813)))))
    } else {
        let t = 3.75 / ax;
        (ax.exp() / ax.sqrt())
            * (0.39894228
                + t * (0.01328592
                    + t * (0.00225319
                        + t * (-0.00157565
                            + t * (0.00916281
                                + t * (-0.02057706
                                    + t * (0.02635537
                                        + t * (-0.01647633 + t * 0.00392377))))))))
    }
}

/// Modified Bessel function of the first kind, order one.
pub fn bessel_i1(x: f64) -> f64 {
    let ax = x.abs();
    let result = if ax < 3.75 {
        let t = (x / 3.75) * (x / 3.75);
        ax * (0.5
            + t * (0.87890594
                + t * (0.51498869
                    + t * (0.15084934 + t * (0.02658733 + t * (0.00301532 + t * 0.00032411))))))
    } else {
        let t = 3.75 / ax;
        let poly = 0.39894228
            + t * (-0.03988024
                + t * (-0.00362018
                    + t * (0.00163801
                        + t * (-0.01031555
                            + t * (0.02282967
                                + t * (-0.02895312 + t * (0.01787654 + t * -0.00420059)))))));
        (ax.exp() / ax.sqrt()) * poly
    };
    if x < 0.0 {
        -result
    } else {
        result
    }
}

/// Modified Bessel function of the first kind, order two.
///
/// Uses the recurrence `I2(x) = I0(x) - (2/x) * I1(x)`; near zero the
/// recurrence loses precision, so the leading series term `x^2/8` is used
/// instead.
pub fn bessel_i2(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 1e-4 {
        x * x / 8.0
    } else {
        bessel_i0(x) - (2.0 / x) * bessel_i1(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Reference values from Abramowitz & Stegun tables.
    #[test]
    fn i0_reference_values() {
        assert_relative_eq!(bessel_i0(0.0), 1.0, max_relative = 1e-7);
        assert_relative_eq!(bessel_i0(1.0), 1.2660658, max_relative = 1e-6);
        assert_relative_eq!(bessel_i0(2.0), 2.2795853, max_relative = 1e-6);
        assert_relative_eq!(bessel_i0(5.0), 27.239872, max_relative = 1e-6);
    }

    #[test]
    fn i1_reference_values() {
        assert_relative_eq!(bessel_i1(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(bessel_i1(1.0), 0.5651591, max_relative = 1e-6);
        assert_relative_eq!(bessel_i1(2.0), 1.5906369, max_relative = 1e-6);
        assert_relative_eq!(bessel_i1(5.0), 24.335642, max_relative = 1e-6);
    }

    #[test]
    fn i2_recurrence_consistency() {
        for &x in &[0.5, 1.0, 3.0, 10.0, 25.0] {
            let lhs = bessel_i2(x);
            let rhs = bessel_i0(x) - (2.0 / x) * bessel_i1(x);
            assert_relative_eq!(lhs, rhs, max_relative = 1e-10);
        }
    }

    #[test]
    fn i2_small_argument_series() {
        let x = 1e-6;
        assert_relative_eq!(bessel_i2(x), x * x / 8.0, max_relative = 1e-6);
    }

    #[test]
    fn i0_overflows_for_huge_arguments() {
        assert!(bessel_i0(800.0).is_infinite());
        assert!(bessel_i0(500.0).is_finite());
    }

    #[test]
    fn negative_symmetry() {
        assert_relative_eq!(bessel_i0(-2.0), bessel_i0(2.0), max_relative = 1e-12);
        assert_relative_eq!(bessel_i1(-2.0), -bessel_i1(2.0), max_relative = 1e-12);
    }
}
