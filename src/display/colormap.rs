use image::{Rgb, RgbImage, imageops};
use ndarray::ArrayView2;

use super::sls::SLS;
use crate::pedestal::apply_pistons;
use super::tonemap::{ImprepParams, imprep, rebin};
use crate::error::{AnalysisError, Result};

/// ColorBrewer RdYlBu anchor colours, red (low) to blue (high).
const RDYLBU: [[u8; 3]; 11] = [
    [165, 0, 38],
    [215, 48, 39],
    [244, 109, 67],
    [253, 174, 97],
    [254, 224, 144],
    [255, 255, 191],
    [224, 243, 248],
    [171, 217, 233],
    [116, 173, 209],
    [69, 117, 180],
    [49, 54, 149],
];

const NAN_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Colour lookup for normalized values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Grey,
    /// Diverging red-yellow-blue quantized to this many levels.
    RdYlBu(usize),
    /// Stepped rainbow from black to white.
    Sls,
}

impl Colormap {
    /// Colour for `t` in [0, 1]; values outside are clamped, NaN is black.
    pub fn color(self, t: f64) -> Rgb<u8> {
        if t.is_nan() {
            return NAN_COLOR;
        }
        let t = t.clamp(0.0, 1.0);
        match self {
            Colormap::Grey => {
                let v = (t * 255.0).round() as u8;
                Rgb([v, v, v])
            }
            Colormap::RdYlBu(levels) => {
                let levels = levels.max(1);
                let level = ((t * levels as f64).floor() as usize).min(levels - 1);
                let t = if levels == 1 {
                    0.5
                } else {
                    level as f64 / (levels - 1) as f64
                };
                interpolate(&RDYLBU, t)
            }
            Colormap::Sls => {
                let i = ((t * SLS.len() as f64) as usize).min(SLS.len() - 1);
                let [r, g, b] = SLS[i].map(|c| (c * 255.0).round() as u8);
                Rgb([r, g, b])
            }
        }
    }
}

fn interpolate(anchors: &[[u8; 3]], t: f64) -> Rgb<u8> {
    let pos = t * (anchors.len() - 1) as f64;
    let i = (pos.floor() as usize).min(anchors.len() - 2);
    let frac = pos - i as f64;
    let mix = |c: usize| {
        let a = anchors[i][c] as f64;
        let b = anchors[i + 1][c] as f64;
        (a + (b - a) * frac).round() as u8
    };
    Rgb([mix(0), mix(1), mix(2)])
}

impl std::str::FromStr for Colormap {
    type Err = AnalysisError;

    /// `grey`, `gray`, `sls`, `rdylbu` (13 levels) or `rdylbu<N>`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "grey" | "gray" => Ok(Colormap::Grey),
            "rdylbu" => Ok(Colormap::RdYlBu(13)),
            "sls" => Ok(Colormap::Sls),
            other => other
                .strip_prefix("rdylbu")
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .map(Colormap::RdYlBu)
                .ok_or_else(|| AnalysisError::Configuration(format!("unknown colormap '{s}'"))),
        }
    }
}

/// Paint `data` through `colormap` over `[vmin, vmax]`. With `flip` the
/// first row is drawn at the bottom.
pub fn render(
    data: ArrayView2<f64>,
    colormap: Colormap,
    vmin: f64,
    vmax: f64,
    flip: bool,
) -> RgbImage {
    let (rows, cols) = data.dim();
    let span = vmax - vmin;
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let r = if flip {
            rows - 1 - y as usize
        } else {
            y as usize
        };
        colormap.color((data[[r, x as usize]] - vmin) / span)
    })
}

/// Layout of the three-panel piston figure.
#[derive(Debug, Clone, Copy)]
pub struct PanelParams {
    pub scale: f64,
    /// See `ImprepParams::block`.
    pub block: usize,
    pub smooth_fwhm: f64,
    pub colormap: Colormap,
    /// Piston panel spans `[-piston_range, piston_range]`.
    pub piston_range: f64,
    pub gap: u32,
}

impl Default for PanelParams {
    fn default() -> Self {
        Self {
            scale: 75.0,
            block: 4,
            smooth_fwhm: 0.0,
            colormap: Colormap::RdYlBu(13),
            piston_range: 3.25,
            gap: 4,
        }
    }
}

/// Original image, image plus pistons and the piston map, side by side.
/// Both images share the original's display limits.
pub fn piston_panel(
    original: ArrayView2<f32>,
    pistons: ArrayView2<f32>,
    params: &PanelParams,
) -> Result<RgbImage> {
    let fixed = apply_pistons(original, pistons)?.mapv(f64::from);
    let original = original.mapv(f64::from);
    let pistons = pistons.mapv(f64::from);

    let prep = ImprepParams {
        scale: params.scale,
        block: params.block,
        smooth_fwhm: params.smooth_fwhm,
        ..Default::default()
    };
    let (before, lo, hi) = imprep(original.view(), &prep);
    let fixed_prep = ImprepParams {
        lo: Some(lo),
        hi: Some(hi),
        ..prep
    };
    let (after, _, _) = imprep(fixed.view(), &fixed_prep);
    let map = rebin(pistons.view(), prep.downsample());

    let panels = [
        render(before.view(), Colormap::Grey, 0.0, 1.0, true),
        render(after.view(), Colormap::Grey, 0.0, 1.0, true),
        render(
            map.view(),
            params.colormap,
            -params.piston_range,
            params.piston_range,
            true,
        ),
    ];
    let (w, h) = panels[0].dimensions();
    let width = 3 * w + 2 * params.gap;
    let mut out = RgbImage::from_pixel(width, h, Rgb([255, 255, 255]));
    for (i, panel) in panels.iter().enumerate() {
        let x = i as u32 * (w + params.gap);
        imageops::replace(&mut out, panel, x as i64, 0);
    }
    Ok(out)
}
