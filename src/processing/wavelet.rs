//! Wavelet shrinkage denoising with a periodized Daubechies-6 transform.
//!
//! - multi-level DWT, level count capped by signal length and `max_level`
//! - universal threshold `sigma * sqrt(2 * log2(n))`, soft-applied to detail bands only
//! - signal is symmetrically extended to a multiple of `2^levels`, output truncated back to `n`

/// Daubechies-6 decomposition low-pass filter.
pub const DB6_LOW: [f64; 12] = [
    0.11154074335008017,
    0.4946238903983854,
    0.7511339080215775,
    0.3152503517092432,
    -0.22626469396516913,
    -0.12976686756709563,
    0.09750160558707936,
    0.02752286553001629,
    -0.031582039318031156,
    0.0005538422009938016,
    0.004777257511010651,
    -0.00107730108499558,
];

const TAPS: usize = DB6_LOW.len();

fn db6_high() -> [f64; TAPS] {
    let mut g = [0.0; TAPS];
    for (k, v) in g.iter_mut().enumerate() {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        *v = sign * DB6_LOW[TAPS - 1 - k];
    }
    g
}

/// Number of decomposition levels applied to a signal of length `n`.
pub fn decomposition_levels(n: usize, max_level: usize) -> usize {
    if n < TAPS - 1 {
        return 0;
    }
    let ratio = n as f64 / (TAPS - 1) as f64;
    (ratio.log2().floor() as usize).min(max_level)
}

/// One analysis step on a periodic signal of even length.
fn analyze(x: &[f64], g: &[f64; TAPS]) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    let half = n / 2;
    let mut approx = vec![0.0; half];
    let mut detail = vec![0.0; half];

    for i in 0..half {
        let (mut a, mut d) = (0.0, 0.0);
        for k in 0..TAPS {
            let v = x[(2 * i + k) % n];
            a += DB6_LOW[k] * v;
            d += g[k] * v;
        }
        approx[i] = a;
        detail[i] = d;
    }
    (approx, detail)
}

/// Inverse of `analyze`.
fn synthesize(approx: &[f64], detail: &[f64], g: &[f64; TAPS]) -> Vec<f64> {
    let n = approx.len() * 2;
    let mut x = vec![0.0; n];

    for i in 0..approx.len() {
        for k in 0..TAPS {
            x[(2 * i + k) % n] += DB6_LOW[k] * approx[i] + g[k] * detail[i];
        }
    }
    x
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    let mag = v.abs() - t;
    if mag > 0.0 { mag.copysign(v) } else { 0.0 }
}

/// Denoises `signal` with noise level `sigma`.
///
/// Signals too short for a single level are returned unchanged, as is any
/// signal when `sigma <= 0`.
pub fn wavelet_denoise(signal: &[f64], sigma: f64, max_level: usize) -> Vec<f64> {
    let n = signal.len();
    let levels = decomposition_levels(n, max_level);
    if levels == 0 || !(sigma > 0.0) {
        return signal.to_vec();
    }

    let block = 1usize << levels;
    let padded_len = n.div_ceil(block) * block;
    let mut x: Vec<f64> = Vec::with_capacity(padded_len);
    x.extend_from_slice(signal);
    for i in n..padded_len {
        // Mirror extension; padding never exceeds n for levels >= 1.
        x.push(signal[2 * n - 1 - i]);
    }

    let g = db6_high();
    let threshold = sigma * (2.0 * (n as f64).log2()).sqrt();

    let mut details: Vec<Vec<f64>> = Vec::with_capacity(levels);
    let mut approx = x;
    for _ in 0..levels {
        let (a, mut d) = analyze(&approx, &g);
        for v in d.iter_mut() {
            *v = soft_threshold(*v, threshold);
        }
        details.push(d);
        approx = a;
    }

    for d in details.iter().rev() {
        approx = synthesize(&approx, d, &g);
    }

    approx.truncate(n);
    approx
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn mse(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>() / a.len() as f64
    }

    #[test]
    fn level_count_follows_length() {
        assert_eq!(decomposition_levels(10, 5), 0);
        assert_eq!(decomposition_levels(11, 5), 0);
        assert_eq!(decomposition_levels(22, 5), 1);
        assert_eq!(decomposition_levels(110, 5), 3);
        assert_eq!(decomposition_levels(503, 5), 5);
        assert_eq!(decomposition_levels(503, 2), 2);
    }

    #[test]
    fn filter_is_orthonormal() {
        let energy: f64 = DB6_LOW.iter().map(|h| h * h).sum();
        let sum: f64 = DB6_LOW.iter().sum();
        assert!((energy - 1.0).abs() < 1e-10);
        assert!((sum - std::f64::consts::SQRT_2).abs() < 1e-10);
    }

    #[test]
    fn analysis_then_synthesis_is_lossless() {
        let g = db6_high();
        let x: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin() + 0.01 * i as f64).collect();
        let (a, d) = analyze(&x, &g);
        let y = synthesize(&a, &d, &g);
        assert!(mse(&x, &y) < 1e-20);
    }

    #[test]
    fn zero_sigma_returns_input() {
        let x: Vec<f64> = (0..503).map(|i| (i as f64 * 0.05).cos()).collect();
        assert_eq!(wavelet_denoise(&x, 0.0, 5), x);
    }

    #[test]
    fn short_signal_is_unchanged() {
        let x = vec![1.0, -2.0, 3.0, 0.5, 0.0, 9.0, 1.0, 1.0, 2.0, 3.0];
        assert_eq!(wavelet_denoise(&x, 1.0, 5), x);
    }

    #[test]
    fn constant_signal_is_preserved() {
        let x = vec![3.25; 503];
        let y = wavelet_denoise(&x, 0.5, 5);
        assert_eq!(y.len(), 503);
        assert!(y.iter().all(|v| (v - 3.25).abs() < 1e-9));
    }

    #[test]
    fn reduces_noise_on_smooth_signal() {
        let mut rng = StdRng::seed_from_u64(42);
        let clean: Vec<f64> = (0..503).map(|i| (i as f64 * 0.02).sin()).collect();
        let noisy: Vec<f64> = clean
            .iter()
            .map(|v| v + rng.random_range(-0.5..0.5))
            .collect();

        let denoised = wavelet_denoise(&noisy, 0.29, 5);

        assert_eq!(denoised.len(), noisy.len());
        assert!(mse(&denoised, &clean) < mse(&noisy, &clean) * 0.5);
    }
}
