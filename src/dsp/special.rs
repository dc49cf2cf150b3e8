//! Special functions needed by the MMSE gain rules.
//!
//! - `expint_e1`: exponential integral E1, series below 1, continued fraction
//!   (modified Lentz) above.
//! - `bessel_i0` / `bessel_i1`: modified Bessel functions of the first kind,
//!   Abramowitz & Stegun 9.8.1-9.8.4.
//! - `bessel_i0_scaled` / `bessel_i1_scaled`: the same multiplied by `e^-x`,
//!   which is what the STSA rule actually consumes and stays finite for large
//!   arguments.

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const SERIES_MAX_TERMS: usize = 60;
const CF_MAX_ITERS: usize = 100;
const CF_TINY: f64 = 1e-30;
const CONVERGENCE: f64 = 1e-9;

/// Exponential integral `E1(x) = ∫_x^∞ e^-t / t dt` for `x > 0`.
/// Returns a large finite value for `x <= 0`.
pub fn expint_e1(x: f32) -> f32 {
    if !(x > 0.0) {
        return f32::MAX;
    }
    let x = x as f64;

    if x < 1.0 {
        // E1(x) = -γ - ln x - Σ (-x)^k / (k·k!)
        let mut sum = 0.0;
        let mut term = 1.0;
        for k in 1..=SERIES_MAX_TERMS {
            term *= -x / k as f64;
            let add = term / k as f64;
            sum += add;
            if add.abs() < CONVERGENCE * sum.abs().max(1e-300) {
                break;
            }
        }
        return (-EULER_GAMMA - x.ln() - sum) as f32;
    }

    // Continued fraction: E1(x) = e^-x / (x + 1 - 1/(x + 3 - 4/(x + 5 - ...)))
    let mut b = x + 1.0;
    let mut c = 1.0 / CF_TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=CF_MAX_ITERS {
        let an = -((i * i) as f64);
        b += 2.0;
        d = 1.0 / (an * d + b);
        c = b + an / c;
        let del = c * d;
        h *= del;
        if (del - 1.0).abs() < CONVERGENCE {
            break;
        }
    }
    (h * (-x).exp()) as f32
}

pub fn bessel_i0(x: f32) -> f32 {
    let ax = x.abs();
    if ax < 3.75 {
        small_i0(ax)
    } else {
        large_i0_scaled(ax) * ax.exp()
    }
}

pub fn bessel_i1(x: f32) -> f32 {
    let ax = x.abs();
    let v = if ax < 3.75 {
        small_i1(ax)
    } else {
        large_i1_scaled(ax) * ax.exp()
    };
    if x < 0.0 {
        -v
    } else {
        v
    }
}

/// `e^-|x| · I0(x)`
pub fn bessel_i0_scaled(x: f32) -> f32 {
    let ax = x.abs();
    if ax < 3.75 {
        small_i0(ax) * (-ax).exp()
    } else {
        large_i0_scaled(ax)
    }
}

/// `e^-|x| · I1(x)`
pub fn bessel_i1_scaled(x: f32) -> f32 {
    let ax = x.abs();
    let v = if ax < 3.75 {
        small_i1(ax) * (-ax).exp()
    } else {
        large_i1_scaled(ax)
    };
    if x < 0.0 {
        -v
    } else {
        v
    }
}

fn small_i0(ax: f32) -> f32 {
    let t = (ax / 3.75) * (ax / 3.75);
    1.0 + t
        * (3.515_622_9
            + t * (3.089_942_4
                + t * (1.206_749_2 + t * (0.265_973_2 + t * (0.036_076_8 + t * 0.004_581_3)))))
}

fn small_i1(ax: f32) -> f32 {
    let t = (ax / 3.75) * (ax / 3.75);
    ax * (0.5
        + t * (0.878_905_94
            + t * (0.514_988_69
                + t * (0.150_849_34 + t * (0.026_587_33 + t * (0.003_015_32 + t * 0.000_324_11))))))
}

fn large_i0_scaled(ax: f32) -> f32 {
    let t = 3.75 / ax;
    (0.398_942_28
        + t * (0.013_285_92
            + t * (0.002_253_19
                + t * (-0.001_575_65
                    + t * (0.009_162_81
                        + t * (-0.020_577_06
                            + t * (0.026_355_37 + t * (-0.016_476_33 + t * 0.003_923_77))))))))
        / ax.sqrt()
}

fn large_i1_scaled(ax: f32) -> f32 {
    let t = 3.75 / ax;
    (0.398_942_28
        + t * (-0.039_880_24
            + t * (-0.003_620_18
                + t * (0.001_638_01
                    + t * (-0.010_315_55
                        + t * (0.022_829_67
                            + t * (-0.028_953_12 + t * (0.017_876_54 - t * 0.004_200_59))))))))
        / ax.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel_err(a: f32, b: f32) -> f32 {
        (a - b).abs() / b.abs().max(1e-12)
    }

    #[test]
    fn test_expint_reference_values() {
        // Abramowitz & Stegun table 5.1
        let cases = [
            (0.01f32, 4.037_929_6f32),
            (0.1, 1.822_923_9),
            (0.5, 0.559_773_6),
            (1.0, 0.219_383_9),
            (2.0, 0.048_900_5),
            (5.0, 0.001_148_3),
            (10.0, 4.156_969e-6),
        ];
        for &(x, want) in &cases {
            let got = expint_e1(x);
            assert!(rel_err(got, want) < 1e-3, "E1({}) = {} want {}", x, got, want);
        }
    }

    #[test]
    fn test_expint_non_positive_is_finite() {
        assert!(expint_e1(0.0).is_finite());
        assert!(expint_e1(-1.0).is_finite());
    }

    #[test]
    fn test_bessel_reference_values() {
        let i0 = [(0.0f32, 1.0f32), (1.0, 1.266_065_9), (2.0, 2.279_585_3), (5.0, 27.239_872)];
        for &(x, want) in &i0 {
            assert!(rel_err(bessel_i0(x), want) < 1e-4, "I0({})", x);
        }
        let i1 = [
            (0.5f32, 0.257_894_3f32),
            (1.0, 0.565_159_1),
            (2.0, 1.590_636_9),
            (5.0, 24.335_642),
        ];
        for &(x, want) in &i1 {
            assert!(rel_err(bessel_i1(x), want) < 1e-4, "I1({})", x);
        }
        assert_eq!(bessel_i1(0.0), 0.0);
    }

    #[test]
    fn test_scaled_bessel_stays_finite() {
        let a = bessel_i0_scaled(500.0);
        let b = bessel_i1_scaled(500.0);
        assert!(a.is_finite() && a > 0.0);
        assert!(b.is_finite() && b > 0.0);
        assert!(rel_err(bessel_i0_scaled(2.0), 2.279_585_3 * (-2.0f32).exp()) < 1e-4);
    }
}
