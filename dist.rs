//! Distribution samplers built on [`Xorshift32`](crate::rng::Xorshift32).
//!
//! Every sampler here takes `&mut Xorshift32` explicitly — there is no hidden
//! RNG, and no sampler ever falls back to `rand::thread_rng`. Invalid
//! parameters (shape/scale ≤ 0) fail with `EngineError::InvalidParameter`
//! rather than panicking, since they cross a component boundary and the
//! caller (the posterior model) needs to turn them into a tick-scoped error.

use crate::errors::EngineError;
use crate::rng::Xorshift32;

type SampleResult = Result<f64, EngineError>;

fn require_positive(name: &'static str, value: f64) -> Result<(), EngineError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EngineError::InvalidParameter { name, value })
    }
}

/// Standard normal draw via Box–Muller, then affine-transformed to `N(mean, variance)`.
pub fn normal(rng: &mut Xorshift32, mean: f64, variance: f64) -> SampleResult {
    require_positive("variance", variance)?;
    let u1 = rng.next_f64().max(f64::MIN_POSITIVE); // avoid ln(0)
    let u2 = rng.next_f64();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    Ok(mean + z * variance.sqrt())
}

/// Gamma(shape, scale=1) via Marsaglia–Tsang for shape ≥ 1, with the standard
/// boost-by-one-and-correct trick for shape < 1.
pub fn gamma(rng: &mut Xorshift32, shape: f64) -> SampleResult {
    require_positive("shape", shape)?;

    if shape < 1.0 {
        let g = gamma(rng, shape + 1.0)?;
        let u = rng.next_f64().max(f64::MIN_POSITIVE);
        return Ok(g * u.powf(1.0 / shape));
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    loop {
        let mut x;
        let mut v;
        loop {
            x = normal(rng, 0.0, 1.0)?;
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        v = v * v * v;
        let u = rng.next_f64();
        let x2 = x * x;

        if u < 1.0 - 0.0331 * x2 * x2 {
            return Ok(d * v);
        }
        if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
            return Ok(d * v);
        }
    }
}

/// Beta(alpha, beta) via two independent Gamma draws, `X/(X+Y)`.
/// `Beta(1,1)` short-circuits to a plain uniform draw.
pub fn beta(rng: &mut Xorshift32, alpha: f64, beta_param: f64) -> SampleResult {
    require_positive("alpha", alpha)?;
    require_positive("beta", beta_param)?;

    if (alpha - 1.0).abs() < f64::EPSILON && (beta_param - 1.0).abs() < f64::EPSILON {
        return Ok(rng.next_f64());
    }

    let x = gamma(rng, alpha)?;
    let y = gamma(rng, beta_param)?;
    Ok(x / (x + y))
}

/// Inverse-Gamma(alpha, beta): `beta / Gamma(alpha, 1)`.
pub fn inverse_gamma(rng: &mut Xorshift32, alpha: f64, beta_param: f64) -> SampleResult {
    require_positive("alpha", alpha)?;
    require_positive("beta", beta_param)?;
    let g = gamma(rng, alpha)?;
    Ok(beta_param / g)
}
