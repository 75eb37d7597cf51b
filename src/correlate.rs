//! Secondary analyses that relate pixel levels across exposures: photon
//! transfer gain, flux ratios between exposure times, and overscan drift
//! against boundary flux.

use ndarray::{ArrayView2, Zip, s};
use serde::{Deserialize, Serialize};

use crate::ccd::amplifier::BoundaryColumns;
use crate::ccd::mask::{POLICY_MASK, usable_mask};
use crate::ccd::sensor::Exposure;
use crate::ccd::{AmpGeometry, SensorGeometry};
use crate::error::{AnalysisError, Result};
use crate::stats::{SigmaClip, masked_values, median_of_sorted, sorted_finite};

/// `y = slope * x + intercept`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
}

/// Ordinary least squares over the finite (x, y) pairs.
///
/// `None` with fewer than two usable points or no spread in x.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<LineFit> {
    let pts: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .map(|(&a, &b)| (a, b))
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect();
    if pts.len() < 2 {
        return None;
    }
    let n = pts.len() as f64;
    let mx = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = pts.iter().map(|p| (p.0 - mx) * (p.0 - mx)).sum();
    let sxy: f64 = pts.iter().map(|p| (p.0 - mx) * (p.1 - my)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some(LineFit {
        slope,
        intercept: my - slope * mx,
    })
}

/// Gain in e-/ADU from a variance-vs-signal fit (`1 / slope`).
pub fn photon_transfer_gain(signal: &[f64], variance: &[f64]) -> Option<f64> {
    let fit = fit_line(signal, variance)?;
    (fit.slope > 0.0).then(|| 1.0 / fit.slope)
}

/// Medians of `x` and `y` within one bin of `x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub lo: f64,
    pub hi: f64,
    pub x_median: f64,
    pub y_median: f64,
    pub count: usize,
}

fn bin_count(lo: f64, hi: f64, binsize: f64) -> usize {
    let n = (hi - lo) / binsize;
    // 3.0 / 0.2 is 15.000000000000002
    if (n - n.round()).abs() < 1e-9 {
        n.round() as usize
    } else {
        n.ceil() as usize
    }
}

/// Bin `(x, y)` pairs on `x` over `[lo, hi)` and report per-bin medians.
///
/// Bins holding fewer than `min_count` pairs are left out. Pairs with a
/// non-finite member are ignored.
pub fn binned_medians(
    x: &[f64],
    y: &[f64],
    lo: f64,
    hi: f64,
    binsize: f64,
    min_count: usize,
) -> Vec<Bin> {
    if !(binsize > 0.0) || !(hi > lo) {
        return Vec::new();
    }
    let nbins = bin_count(lo, hi, binsize);
    let mut xs: Vec<Vec<f64>> = vec![Vec::new(); nbins];
    let mut ys: Vec<Vec<f64>> = vec![Vec::new(); nbins];
    for (&a, &b) in x.iter().zip(y) {
        if !(a.is_finite() && b.is_finite()) || a < lo || a >= hi {
            continue;
        }
        let idx = (((a - lo) / binsize).floor() as usize).min(nbins - 1);
        xs[idx].push(a);
        ys[idx].push(b);
    }
    xs.into_iter()
        .zip(ys)
        .enumerate()
        .filter(|(_, (bx, _))| !bx.is_empty() && bx.len() >= min_count)
        .map(|(i, (bx, by))| Bin {
            lo: lo + i as f64 * binsize,
            hi: (lo + (i + 1) as f64 * binsize).min(hi),
            x_median: median_of_sorted(&sorted_finite(bx.iter().copied())),
            y_median: median_of_sorted(&sorted_finite(by)),
            count: bx.len(),
        })
        .collect()
}

/// Settings for `amp_gain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GainParams {
    pub mask_bits: u32,
    /// Signal bin width (ADU).
    pub bin_width: f64,
    pub min_count: usize,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            mask_bits: POLICY_MASK,
            bin_width: 50.0,
            min_count: 20,
        }
    }
}

/// Photon-transfer gain of one amplifier from its processed image and
/// variance plane. `Ok(None)` when the binned points admit no positive fit.
pub fn amp_gain(
    exposure: &Exposure,
    amp: &AmpGeometry,
    params: &GainParams,
) -> Result<Option<f64>> {
    let variance = exposure
        .variance()
        .ok_or_else(|| AnalysisError::missing("variance plane"))?;
    let image = amp.bbox.view(exposure.image())?;
    let variance = amp.bbox.view(variance)?;
    let usable = usable_mask(amp.bbox.view(exposure.mask())?, params.mask_bits);

    let signal = masked_values(image, Some(usable.view()));
    let var = masked_values(variance, Some(usable.view()));
    let sorted = sorted_finite(signal.iter().copied());
    let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
        return Ok(None);
    };
    // nudge the top edge so the brightest pixels land inside the last bin
    let top = hi + params.bin_width * 1e-6;
    let bins = binned_medians(&signal, &var, lo, top, params.bin_width, params.min_count);
    let x: Vec<f64> = bins.iter().map(|b| b.x_median).collect();
    let y: Vec<f64> = bins.iter().map(|b| b.y_median).collect();
    Ok(photon_transfer_gain(&x, &y))
}

/// Settings for `flux_ratio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FluxRatioParams {
    /// Rows and columns trimmed from each side before measuring the background.
    pub background_margin: (usize, usize),
    pub clip: SigmaClip,
    /// Background-subtracted long-exposure level a pixel must exceed.
    pub min_signal: f64,
    pub bin_lo: f64,
    pub bin_hi: f64,
    pub bin_step: f64,
}

impl Default for FluxRatioParams {
    fn default() -> Self {
        Self {
            background_margin: (1000, 500),
            clip: SigmaClip::default(),
            min_signal: 10.0,
            bin_lo: 1.0,
            bin_hi: 4.0,
            bin_step: 0.2,
        }
    }
}

/// Per-pixel and binned ratio of time-scaled short-exposure flux to
/// long-exposure flux.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxRatio {
    pub time_ratio: f64,
    pub lo_background: f64,
    pub hi_background: f64,
    /// `log10` of the background-subtracted long-exposure level.
    pub log_counts: Vec<f64>,
    pub ratios: Vec<f64>,
    pub bins: Vec<Bin>,
}

fn background(data: ArrayView2<f32>, margin: (usize, usize), clip: &SigmaClip) -> Result<f64> {
    let (rows, cols) = data.dim();
    if 2 * margin.0 >= rows || 2 * margin.1 >= cols {
        return Err(AnalysisError::Geometry(format!(
            "background margin {margin:?} leaves nothing of a {rows}x{cols} image"
        )));
    }
    let centre = data.slice(s![margin.0..rows - margin.0, margin.1..cols - margin.1]);
    Ok(clip.apply_masked(centre, None).median)
}

/// Compare two processed exposures of the same field taken with different
/// exposure times. `offset = (dx, dy)` shifts the long exposure so that its
/// pixel `(y + dy, x + dx)` lines up with the short exposure's `(y, x)`.
pub fn flux_ratio(
    lo: &Exposure,
    hi: &Exposure,
    lo_time: f64,
    hi_time: f64,
    offset: (usize, usize),
    params: &FluxRatioParams,
) -> Result<FluxRatio> {
    if !(lo_time > 0.0 && hi_time > 0.0) {
        return Err(AnalysisError::Configuration(format!(
            "exposure times must be positive, got {lo_time} and {hi_time}"
        )));
    }
    if lo.dim() != hi.dim() {
        return Err(AnalysisError::Shape(format!("{:?} vs {:?}", lo.dim(), hi.dim())));
    }
    let (rows, cols) = lo.dim();
    let (dx, dy) = offset;
    if dx >= cols || dy >= rows {
        return Err(AnalysisError::Geometry(format!(
            "offset {offset:?} exceeds {rows}x{cols} image"
        )));
    }
    let lo_image = lo.image().slice_move(s![..rows - dy, ..cols - dx]);
    let lo_mask = lo.mask().slice_move(s![..rows - dy, ..cols - dx]);
    let hi_image = hi.image().slice_move(s![dy.., dx..]);
    let hi_mask = hi.mask().slice_move(s![dy.., dx..]);

    let lo_background = background(lo_image, params.background_margin, &params.clip)?;
    let hi_background = background(hi_image, params.background_margin, &params.clip)?;
    let time_ratio = hi_time / lo_time;

    let mut log_counts = Vec::new();
    let mut ratios = Vec::new();
    Zip::from(&lo_image)
        .and(&lo_mask)
        .and(&hi_image)
        .and(&hi_mask)
        .for_each(|&l, &lm, &h, &hm| {
            let l = l as f64 - lo_background;
            let h = h as f64 - hi_background;
            if h > params.min_signal && lm == 0 && hm == 0 {
                log_counts.push(h.log10());
                ratios.push(l * time_ratio / h);
            }
        });
    log::debug!(
        "flux ratio: {} pixels above {} ADU, backgrounds {lo_background:.2} / {hi_background:.2}",
        ratios.len(),
        params.min_signal
    );

    let bins = binned_medians(
        &log_counts,
        &ratios,
        params.bin_lo,
        params.bin_hi,
        params.bin_step,
        1,
    );
    Ok(FluxRatio {
        time_ratio,
        lo_background,
        hi_background,
        log_counts,
        ratios,
        bins,
    })
}

/// Settings for `overscan_delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverscanDeltaParams {
    /// Data columns taken next to the overscan edge.
    pub width: usize,
    /// Exclusive flux limits for a usable pixel (ADU).
    pub flux_limits: (f64, f64),
    /// Largest accepted |first - last| overscan difference (ADU).
    pub max_delta: f64,
    pub bin_lo: f64,
    pub bin_hi: f64,
    pub binsize: f64,
    pub min_count: usize,
}

impl Default for OverscanDeltaParams {
    fn default() -> Self {
        Self {
            width: 5,
            flux_limits: (0.0, 30_000.0),
            max_delta: 100.0,
            bin_lo: 1000.0,
            bin_hi: 30_000.0,
            binsize: 20.0,
            min_count: 50,
        }
    }
}

/// Median first-minus-last overscan difference of `overscan_amp` as a
/// function of the raw flux in `flux_amp`'s data column `offset` pixels in
/// from its overscan edge, pooled over `exposures` (raw).
pub fn overscan_delta(
    exposures: &[Exposure],
    geometry: &SensorGeometry,
    flux_amp: usize,
    overscan_amp: usize,
    offset: usize,
    params: &OverscanDeltaParams,
) -> Result<Vec<Bin>> {
    let amp = |i: usize| {
        geometry
            .amps
            .get(i)
            .ok_or_else(|| AnalysisError::Geometry(format!("no amplifier {i}")))
    };
    let flux_cols = BoundaryColumns::extract(amp(flux_amp)?, params.width)?;
    let flux_col = flux_cols.column_at_offset(offset)?;
    let over_cols = BoundaryColumns::extract(amp(overscan_amp)?, params.width)?;
    if flux_col.height != over_cols.overscan_first.height {
        return Err(AnalysisError::Geometry(format!(
            "amp {flux_amp} data rows ({}) and amp {overscan_amp} overscan rows ({}) differ",
            flux_col.height, over_cols.overscan_first.height
        )));
    }

    let mut flux = Vec::new();
    let mut delta = Vec::new();
    for exposure in exposures {
        let image = exposure.image();
        let f = flux_col.view(image)?;
        let first = over_cols.overscan_first.view(image)?;
        let last = over_cols.overscan_last.view(image)?;
        Zip::from(&f).and(&first).and(&last).for_each(|&v, &a, &b| {
            let v = v as f64;
            let d = a as f64 - b as f64;
            if v > params.flux_limits.0 && v < params.flux_limits.1 && d.abs() < params.max_delta {
                flux.push(v);
                delta.push(d);
            }
        });
    }
    log::debug!(
        "overscan delta amp {flux_amp}+{offset} vs amp {overscan_amp}: {} clean pixels",
        flux.len()
    );
    Ok(binned_medians(
        &flux,
        &delta,
        params.bin_lo,
        params.bin_hi,
        params.binsize,
        params.min_count,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccd::SensorPreset;
    use crate::ccd::sensor::SyntheticReadout;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_fit_line_exact() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = fit_line(&x, &y).unwrap();
        assert_relative_eq!(fit.slope, 2.0);
        assert_relative_eq!(fit.intercept, 1.0);
    }

    #[test]
    fn test_fit_line_degenerate() {
        assert!(fit_line(&[1.0], &[2.0]).is_none());
        assert!(fit_line(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(fit_line(&[0.0, f64::NAN, 1.0], &[0.0, 5.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_gain_recovered_from_linear_variance() {
        let gain = 2.5;
        let signal: Vec<f64> = (1..50).map(|i| i as f64 * 100.0).collect();
        let variance: Vec<f64> = signal.iter().map(|s| s / gain + 9.0).collect();
        let fitted = photon_transfer_gain(&signal, &variance).unwrap();
        assert_relative_eq!(fitted, gain, epsilon = 1e-9);
        let flat = vec![4.0; signal.len()];
        assert!(photon_transfer_gain(&signal, &flat).is_none());
    }

    #[test]
    fn test_binned_medians_min_count() {
        let x = [0.5, 0.6, 0.7, 1.5, 2.5, 2.6, f64::NAN, 9.0];
        let y = [1.0, 2.0, 3.0, 10.0, 5.0, 7.0, 0.0, 0.0];
        let bins = binned_medians(&x, &y, 0.0, 3.0, 1.0, 2);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].count, 3);
        assert_relative_eq!(bins[0].x_median, 0.6);
        assert_relative_eq!(bins[0].y_median, 2.0);
        assert_relative_eq!(bins[1].lo, 2.0);
        assert_relative_eq!(bins[1].y_median, 6.0);
        assert!(binned_medians(&x, &y, 0.0, 3.0, 0.0, 1).is_empty());
    }

    #[test]
    fn test_bin_count_tolerates_rounding() {
        assert_eq!(bin_count(1.0, 4.0, 0.2), 15);
        assert_eq!(bin_count(1000.0, 30000.0, 20.0), 1450);
        assert_eq!(bin_count(0.0, 1.0, 0.3), 4);
    }

    #[test]
    fn test_amp_gain_on_ramp() {
        let g = SensorPreset::Compact.geometry();
        let (h, w) = g.shape();
        let image = Array2::from_shape_fn((h, w), |(r, _)| 100.0 + r as f32 * 50.0);
        let variance = image.mapv(|v| v / 2.0 + 4.0);
        let exposure = Exposure::new(image, Array2::zeros((h, w)), Some(variance)).unwrap();
        let params = GainParams {
            min_count: 1,
            ..Default::default()
        };
        let gain = amp_gain(&exposure, &g.amps[2], &params).unwrap().unwrap();
        assert_relative_eq!(gain, 2.0, epsilon = 1e-6);

        let bare = Exposure::from_image(Array2::zeros((h, w)));
        assert!(matches!(
            amp_gain(&bare, &g.amps[0], &params),
            Err(AnalysisError::MissingData { .. })
        ));
    }

    fn field(rows: usize, cols: usize, level: f32, gain: f32, dx: usize, dy: usize) -> Exposure {
        // background plus a few bright square "stars", shifted by (dx, dy)
        let image = Array2::from_shape_fn((rows, cols), |(r, c)| {
            let (r, c) = (r as i64 - dy as i64, c as i64 - dx as i64);
            let star = [(10i64, 10i64), (30, 25), (45, 50)]
                .iter()
                .filter(|(sr, sc)| (r - sr).abs() <= 1 && (c - sc).abs() <= 1)
                .map(|(sr, _)| 50.0 + *sr as f32 * 20.0)
                .sum::<f32>();
            level + gain * star
        });
        Exposure::from_image(image)
    }

    #[test]
    fn test_flux_ratio_matches_exposure_times() {
        let lo = field(64, 64, 20.0, 1.0, 0, 0);
        let hi = field(64, 64, 40.0, 2.0, 3, 5);
        let params = FluxRatioParams {
            background_margin: (4, 4),
            ..Default::default()
        };
        let out = flux_ratio(&lo, &hi, 30.0, 60.0, (3, 5), &params).unwrap();
        assert_relative_eq!(out.time_ratio, 2.0);
        assert_relative_eq!(out.lo_background, 20.0);
        assert_relative_eq!(out.hi_background, 40.0);
        // star pixels only; the time-scaled short exposure matches the long one
        assert_eq!(out.ratios.len(), 27);
        for r in &out.ratios {
            assert_relative_eq!(*r, 1.0, epsilon = 1e-4);
        }
        assert_eq!(out.bins.len(), 3);
        assert!(out.bins.iter().all(|b| (b.y_median - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_flux_ratio_rejects_bad_input() {
        let a = field(32, 32, 0.0, 1.0, 0, 0);
        let b = field(32, 16, 0.0, 1.0, 0, 0);
        let p = FluxRatioParams::default();
        assert!(flux_ratio(&a, &b, 1.0, 1.0, (0, 0), &p).is_err());
        assert!(flux_ratio(&a, &a, 0.0, 1.0, (0, 0), &p).is_err());
        // the default margins are larger than this image
        assert!(matches!(
            flux_ratio(&a, &a, 1.0, 1.0, (0, 0), &p),
            Err(AnalysisError::Geometry(_))
        ));
    }

    #[test]
    fn test_overscan_delta_bins_by_flux() {
        let g = SensorPreset::Compact.geometry();
        let mut rng = StdRng::seed_from_u64(1);
        let over = BoundaryColumns::extract(&g.amps[1], 5).unwrap();
        let exposures: Vec<Exposure> = [2000.0, 5000.0, 40_000.0]
            .into_iter()
            .map(|level| {
                let readout = SyntheticReadout {
                    amp_levels: [level; 4],
                    ..Default::default()
                };
                let (mut raw, _) = readout.generate(&g, &mut rng).unwrap();
                let b = over.overscan_first;
                raw.image_mut()
                    .slice_mut(s![b.begin_y..b.end_y(), b.begin_x..b.end_x()])
                    .mapv_inplace(|v| v + 3.0);
                raw
            })
            .collect();

        let params = OverscanDeltaParams::default();
        let bins = overscan_delta(&exposures, &g, 0, 1, 0, &params).unwrap();
        assert_eq!(bins.len(), 2);
        assert_relative_eq!(bins[0].x_median, 3000.0);
        assert_relative_eq!(bins[1].x_median, 6000.0);
        for b in &bins {
            assert_relative_eq!(b.y_median, 3.0);
            assert_eq!(b.count, 96);
        }
        assert!(overscan_delta(&exposures, &g, 0, 7, 0, &params).is_err());
    }
}
