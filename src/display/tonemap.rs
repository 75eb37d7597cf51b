use ndarray::{Array2, ArrayView2, Axis, s};

use crate::error::{AnalysisError, Result};
use crate::stats::{quantile_of_sorted, sorted_finite};

/// Stretch applied to data normalized to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    Lin,
    Log,
    Pow,
    Atan,
    Asinh,
    Sinh,
}

impl ScaleType {
    pub const ALL: &[ScaleType] = &[
        ScaleType::Lin,
        ScaleType::Log,
        ScaleType::Pow,
        ScaleType::Atan,
        ScaleType::Asinh,
        ScaleType::Sinh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScaleType::Lin => "lin",
            ScaleType::Log => "log",
            ScaleType::Pow => "pow",
            ScaleType::Atan => "atan",
            ScaleType::Asinh => "asinh",
            ScaleType::Sinh => "sinh",
        }
    }

    /// Map `x` (nominally in [0, 1]) so that 0 → 0 and 1 → 1.
    fn apply(self, x: f64, scale_pow: f64) -> f64 {
        let (lo, hi, y) = match self {
            ScaleType::Lin => (0.0, 1.0, x),
            ScaleType::Log => (
                scale_pow.log10(),
                (scale_pow + 500.0).log10(),
                (x * 500.0 + scale_pow).log10(),
            ),
            ScaleType::Pow => (0.0, 1.0, x.powf(scale_pow)),
            ScaleType::Atan => (0.0, 5f64.atan(), (x * 5.0).atan()),
            ScaleType::Asinh => (0.0, 10f64.asinh(), (x * 10.0).asinh()),
            ScaleType::Sinh => (0.0, 3f64.sinh(), (x * 3.0).sinh()),
        };
        (y - lo) / (hi - lo)
    }
}

impl std::str::FromStr for ScaleType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        ScaleType::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::Configuration(format!("unknown scale type '{s}'")))
    }
}

/// Normalize `data` to `[lo, hi]` and apply a stretch. Missing limits
/// default to the finite min/max. Values outside the limits are not clipped.
pub fn tonemap(
    data: ArrayView2<f64>,
    lo: Option<f64>,
    hi: Option<f64>,
    scale: ScaleType,
    scale_pow: f64,
) -> Array2<f64> {
    let finite = || data.iter().copied().filter(|v| v.is_finite());
    let lo = lo.unwrap_or_else(|| finite().fold(f64::INFINITY, f64::min));
    let hi = hi.unwrap_or_else(|| finite().fold(f64::NEG_INFINITY, f64::max));
    data.mapv(|v| scale.apply((v - lo) / (hi - lo), scale_pow))
}

/// Block-average by `block` along both axes. Trailing rows and columns that
/// do not fill a block are dropped.
pub fn rebin(data: ArrayView2<f64>, block: usize) -> Array2<f64> {
    if block <= 1 {
        return data.to_owned();
    }
    let (rows, cols) = data.dim();
    let area = (block * block) as f64;
    Array2::from_shape_fn((rows / block, cols / block), |(r, c)| {
        data.slice(s![r * block..(r + 1) * block, c * block..(c + 1) * block])
            .sum()
            / area
    })
}

/// Separable Gaussian blur with mirrored edges, truncated at four sigma.
/// A non-positive `sigma` returns the data unchanged.
pub fn gaussian_smooth(data: ArrayView2<f64>, sigma: f64) -> Array2<f64> {
    if sigma.is_nan() || sigma <= 0.0 {
        return data.to_owned();
    }
    let radius = (4.0 * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    let kernel: Vec<f64> = weights.iter().map(|w| w / total).collect();
    let columns = convolve_lanes(data, &kernel, Axis(0));
    convolve_lanes(columns.view(), &kernel, Axis(1))
}

fn convolve_lanes(data: ArrayView2<f64>, kernel: &[f64], axis: Axis) -> Array2<f64> {
    let radius = (kernel.len() / 2) as i64;
    let mut out = Array2::zeros(data.dim());
    for (src, mut dst) in data.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let n = src.len();
        for (i, v) in dst.iter_mut().enumerate() {
            *v = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * src[mirror(i as i64 + k as i64 - radius, n)])
                .sum();
        }
    }
    out
}

/// Reflect an out-of-range index back into `0..n` (`d c b a | a b c d`).
fn mirror(i: i64, n: usize) -> usize {
    let period = 2 * n as i64;
    let j = i.rem_euclid(period);
    if j >= n as i64 {
        (period - 1 - j) as usize
    } else {
        j as usize
    }
}

/// Display-limit settings for `imprep`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImprepParams {
    pub lo: Option<f64>,
    pub hi: Option<f64>,
    /// Central percentage of the pixel distribution mapped onto the stretch.
    pub scale: f64,
    /// Each output pixel averages a `block * block` square along both axes,
    /// so 4 shrinks an image sixteen-fold per side.
    pub block: usize,
    /// Full width at half maximum of a Gaussian blur applied after blocking.
    pub smooth_fwhm: f64,
}

impl Default for ImprepParams {
    fn default() -> Self {
        Self {
            lo: None,
            hi: None,
            scale: 100.0,
            block: 1,
            smooth_fwhm: 0.0,
        }
    }
}

impl ImprepParams {
    /// Per-axis downsampling factor handed to `rebin`.
    pub fn downsample(&self) -> usize {
        self.block * self.block
    }
}

/// Block, smooth, clip to display limits and log-stretch `data` into [0, 1].
///
/// Returns the stretched image and the limits used. Unset limits come from
/// the quantiles bounding the central `scale` percent of finite pixels after
/// blocking and smoothing.
pub fn imprep(data: ArrayView2<f64>, params: &ImprepParams) -> (Array2<f64>, f64, f64) {
    let mut prepared = rebin(data, params.downsample());
    if params.smooth_fwhm > 0.0 {
        let sigma = params.smooth_fwhm / (2.0 * (2.0 * std::f64::consts::LN_2).sqrt());
        prepared = gaussian_smooth(prepared.view(), sigma);
    }

    let tail = (100.0 - params.scale) / 2.0;
    let (lo, hi) = match (params.lo, params.hi) {
        (Some(lo), Some(hi)) => (lo, hi),
        (lo, hi) => {
            let sorted = sorted_finite(prepared.iter().copied());
            (
                lo.unwrap_or_else(|| quantile_of_sorted(&sorted, tail / 100.0)),
                hi.unwrap_or_else(|| quantile_of_sorted(&sorted, 1.0 - tail / 100.0)),
            )
        }
    };
    let clipped = prepared.mapv(|v| ((v - lo) / (hi - lo)).clamp(0.0, 1.0));
    let stretched = tonemap(clipped.view(), Some(0.0), Some(1.0), ScaleType::Log, 0.5);
    (stretched, lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_endpoints_fixed_for_every_scale() {
        for &t in ScaleType::ALL {
            assert_relative_eq!(t.apply(0.0, 0.5), 0.0, epsilon = 1e-12);
            assert_relative_eq!(t.apply(1.0, 0.5), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_tonemap_defaults_to_data_range() {
        let data = array![[2.0, 4.0], [6.0, f64::NAN]];
        let out = tonemap(data.view(), None, None, ScaleType::Lin, 0.5);
        assert_relative_eq!(out[[0, 0]], 0.0);
        assert_relative_eq!(out[[0, 1]], 0.5);
        assert_relative_eq!(out[[1, 0]], 1.0);
        assert!(out[[1, 1]].is_nan());
    }

    #[test]
    fn test_scale_type_names() {
        assert_eq!("ASINH".parse::<ScaleType>().unwrap(), ScaleType::Asinh);
        assert!(matches!(
            "gamma".parse::<ScaleType>(),
            Err(AnalysisError::Configuration(_))
        ));
    }

    #[test]
    fn test_rebin_averages_blocks() {
        let data = Array2::from_shape_fn((5, 4), |(r, c)| (r * 4 + c) as f64);
        let out = rebin(data.view(), 2);
        assert_eq!(out.dim(), (2, 2));
        assert_relative_eq!(out[[0, 0]], (0.0 + 1.0 + 4.0 + 5.0) / 4.0);
        assert_relative_eq!(out[[1, 1]], (10.0 + 11.0 + 14.0 + 15.0) / 4.0);
        assert_eq!(rebin(data.view(), 1), data);
    }

    #[test]
    fn test_imprep_limits_and_range() {
        let data = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f64);
        let (img, lo, hi) = imprep(data.view(), &ImprepParams::default());
        assert_eq!(lo, 0.0);
        assert_eq!(hi, 63.0);
        assert_relative_eq!(img[[0, 0]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(img[[7, 7]], 1.0, epsilon = 1e-12);
        assert!(img.iter().all(|v| (0.0..=1.0).contains(v)));

        // block 2 averages 4x4 squares: means 13.5, 17.5, 45.5, 49.5
        let params = ImprepParams {
            scale: 50.0,
            block: 2,
            ..Default::default()
        };
        let (small, lo, hi) = imprep(data.view(), &params);
        assert_eq!(small.dim(), (2, 2));
        assert_relative_eq!(lo, 16.5);
        assert_relative_eq!(hi, 46.5);
    }

    #[test]
    fn test_block_shrinks_by_its_square() {
        let data = Array2::from_elem((4176, 2048), 1.0);
        let params = ImprepParams {
            block: 4,
            ..Default::default()
        };
        assert_eq!(params.downsample(), 16);
        let (img, _, _) = imprep(data.view(), &params);
        assert_eq!(img.dim(), (261, 128));
    }

    #[test]
    fn test_gaussian_smooth() {
        let flat = Array2::from_elem((6, 9), 3.0);
        let out = gaussian_smooth(flat.view(), 1.5);
        assert!(out.iter().all(|v| (v - 3.0).abs() < 1e-12));

        let mut spike = Array2::zeros((21, 21));
        spike[[10, 10]] = 1.0;
        let out = gaussian_smooth(spike.view(), 2.0);
        assert_relative_eq!(out.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[[10, 7]], out[[10, 13]], epsilon = 1e-15);
        assert_relative_eq!(out[[7, 10]], out[[10, 7]], epsilon = 1e-15);
        assert!(out[[10, 10]] > out[[10, 11]]);
        assert_eq!(gaussian_smooth(spike.view(), 0.0), spike);
    }

    #[test]
    fn test_mirror_edges() {
        assert_eq!(mirror(-1, 4), 0);
        assert_eq!(mirror(-2, 4), 1);
        assert_eq!(mirror(4, 4), 3);
        assert_eq!(mirror(5, 4), 2);
        assert_eq!(mirror(2, 4), 2);
    }

    #[test]
    fn test_smoothing_narrows_limits() {
        let checker = Array2::from_shape_fn((16, 16), |(r, c)| ((r + c) % 2) as f64 * 10.0);
        let (_, lo, hi) = imprep(checker.view(), &ImprepParams::default());
        assert_eq!((lo, hi), (0.0, 10.0));
        let smooth = ImprepParams {
            smooth_fwhm: 3.0,
            ..Default::default()
        };
        let (_, lo, hi) = imprep(checker.view(), &smooth);
        assert!(lo > 3.0 && hi < 7.0, "{lo} {hi}");
    }
}
