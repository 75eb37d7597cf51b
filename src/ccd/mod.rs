pub mod amplifier;
pub mod mask;
pub mod sensor;

use ndarray::{ArrayView2, s};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use amplifier::ReadoutSide;

/// Number of readout amplifiers on every supported sensor.
pub const AMPS_PER_SENSOR: usize = 4;

/// Axis-aligned pixel rectangle. Begin is inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub begin_x: usize,
    pub begin_y: usize,
    pub width: usize,
    pub height: usize,
}

impl BBox {
    pub const fn new(begin_x: usize, begin_y: usize, width: usize, height: usize) -> Self {
        Self {
            begin_x,
            begin_y,
            width,
            height,
        }
    }

    pub fn end_x(&self) -> usize {
        self.begin_x + self.width
    }

    pub fn end_y(&self) -> usize {
        self.begin_y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// (rows, columns), matching ndarray's `dim()`.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Whether the box lies inside an image of `(rows, cols)`.
    pub fn fits_within(&self, shape: (usize, usize)) -> bool {
        self.end_y() <= shape.0 && self.end_x() <= shape.1
    }

    /// Sub-box in coordinates relative to this box's origin.
    pub fn sub(&self, dx: usize, dy: usize, width: usize, height: usize) -> Result<BBox> {
        if dx + width > self.width || dy + height > self.height {
            return Err(AnalysisError::Geometry(format!(
                "window {width}x{height}+{dx}+{dy} exceeds {}x{} box",
                self.width, self.height
            )));
        }
        Ok(BBox::new(self.begin_x + dx, self.begin_y + dy, width, height))
    }

    /// View of `data` covered by this box.
    pub fn view<'a, T>(&self, data: ArrayView2<'a, T>) -> Result<ArrayView2<'a, T>> {
        if !self.fits_within(data.dim()) {
            return Err(AnalysisError::Geometry(format!(
                "{self:?} outside image of shape {:?}",
                data.dim()
            )));
        }
        Ok(data.slice_move(s![self.begin_y..self.end_y(), self.begin_x..self.end_x()]))
    }
}

/// The rectangles locating one amplifier's pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmpGeometry {
    pub readout: ReadoutSide,
    /// Rows read before the imaging area (raw coordinates).
    pub raw_prescan: BBox,
    /// Rows read after the imaging area (raw coordinates).
    pub raw_vertical_overscan: BBox,
    /// Columns read before each row of the imaging area (raw coordinates).
    pub raw_horizontal_prescan: BBox,
    /// Columns read after each row of the imaging area (raw coordinates).
    pub raw_horizontal_overscan: BBox,
    pub raw_data: BBox,
    /// The same imaging area in the processed (assembled) image.
    pub bbox: BBox,
}

/// Full readout geometry for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub raw_width: usize,
    pub raw_height: usize,
    pub width: usize,
    pub height: usize,
    pub amps: Vec<AmpGeometry>,
}

impl SensorGeometry {
    pub fn raw_shape(&self) -> (usize, usize) {
        (self.raw_height, self.raw_width)
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Reject geometry that would make region sampling meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.amps.len() != AMPS_PER_SENSOR {
            return Err(AnalysisError::Geometry(format!(
                "expected {AMPS_PER_SENSOR} amplifiers, found {}",
                self.amps.len()
            )));
        }
        for (i, amp) in self.amps.iter().enumerate() {
            let raw_boxes = [
                ("raw_prescan", amp.raw_prescan),
                ("raw_vertical_overscan", amp.raw_vertical_overscan),
                ("raw_horizontal_prescan", amp.raw_horizontal_prescan),
                ("raw_horizontal_overscan", amp.raw_horizontal_overscan),
                ("raw_data", amp.raw_data),
            ];
            for (name, b) in raw_boxes {
                if b.is_empty() {
                    return Err(AnalysisError::Geometry(format!("amp {i}: empty {name}")));
                }
                if !b.fits_within(self.raw_shape()) {
                    return Err(AnalysisError::Geometry(format!(
                        "amp {i}: {name} {b:?} outside raw image {:?}",
                        self.raw_shape()
                    )));
                }
            }
            if amp.bbox.is_empty() || !amp.bbox.fits_within(self.shape()) {
                return Err(AnalysisError::Geometry(format!(
                    "amp {i}: bbox {:?} outside processed image {:?}",
                    amp.bbox,
                    self.shape()
                )));
            }
            if amp.raw_data.shape() != amp.bbox.shape() {
                return Err(AnalysisError::Geometry(format!(
                    "amp {i}: raw data {:?} and bbox {:?} differ in shape",
                    amp.raw_data.shape(),
                    amp.bbox.shape()
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorPreset {
    /// Hyper Suprime-Cam science CCD.
    Hsc,
    /// Small four-amp sensor for demos and tests.
    Compact,
}

impl SensorPreset {
    pub const ALL: &[SensorPreset] = &[SensorPreset::Hsc, SensorPreset::Compact];

    pub fn name(self) -> &'static str {
        match self {
            SensorPreset::Hsc => "HSC",
            SensorPreset::Compact => "Compact",
        }
    }

    pub fn layout(self) -> SensorLayout {
        match self {
            SensorPreset::Hsc => SensorLayout {
                amp_width: 512,
                amp_height: 4176,
                h_prescan: 8,
                h_overscan: 16,
                v_prescan: 16,
                v_overscan: 49,
            },
            SensorPreset::Compact => SensorLayout {
                amp_width: 64,
                amp_height: 96,
                h_prescan: 8,
                h_overscan: 8,
                v_prescan: 8,
                v_overscan: 8,
            },
        }
    }

    pub fn geometry(self) -> SensorGeometry {
        self.layout().geometry()
    }
}

impl std::str::FromStr for SensorPreset {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        SensorPreset::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::Configuration(format!("unknown sensor preset '{s}'")))
    }
}

/// Per-amplifier pixel counts from which a full `SensorGeometry` is laid out.
#[derive(Debug, Clone)]
pub struct SensorLayout {
    pub amp_width: usize,
    pub amp_height: usize,
    pub h_prescan: usize,
    pub h_overscan: usize,
    pub v_prescan: usize,
    pub v_overscan: usize,
}

impl SensorLayout {
    /// Lay out four amplifiers side by side. Odd amplifiers are mirrored so
    /// neighbouring amps meet either overscan-to-overscan or prescan-to-prescan.
    pub fn geometry(&self) -> SensorGeometry {
        let raw_amp_width = self.h_prescan + self.amp_width + self.h_overscan;
        let data_y = self.v_prescan;

        let amps = (0..AMPS_PER_SENSOR)
            .map(|i| {
                let readout = ReadoutSide::for_amp(i);
                let ox = i * raw_amp_width;
                let (prescan_x, data_x, overscan_x) = match readout {
                    ReadoutSide::Start => (
                        ox,
                        ox + self.h_prescan,
                        ox + self.h_prescan + self.amp_width,
                    ),
                    ReadoutSide::End => (
                        ox + self.h_overscan + self.amp_width,
                        ox + self.h_overscan,
                        ox,
                    ),
                };
                AmpGeometry {
                    readout,
                    raw_prescan: BBox::new(data_x, 0, self.amp_width, self.v_prescan),
                    raw_vertical_overscan: BBox::new(
                        data_x,
                        data_y + self.amp_height,
                        self.amp_width,
                        self.v_overscan,
                    ),
                    raw_horizontal_prescan: BBox::new(
                        prescan_x,
                        data_y,
                        self.h_prescan,
                        self.amp_height,
                    ),
                    raw_horizontal_overscan: BBox::new(
                        overscan_x,
                        data_y,
                        self.h_overscan,
                        self.amp_height,
                    ),
                    raw_data: BBox::new(data_x, data_y, self.amp_width, self.amp_height),
                    bbox: BBox::new(i * self.amp_width, 0, self.amp_width, self.amp_height),
                }
            })
            .collect();

        SensorGeometry {
            raw_width: raw_amp_width * AMPS_PER_SENSOR,
            raw_height: self.v_prescan + self.amp_height + self.v_overscan,
            width: self.amp_width * AMPS_PER_SENSOR,
            height: self.amp_height,
            amps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_presets_validate() {
        for preset in SensorPreset::ALL {
            preset.geometry().validate().unwrap();
        }
    }

    #[test]
    fn test_hsc_dimensions() {
        let g = SensorPreset::Hsc.geometry();
        assert_eq!(g.shape(), (4176, 2048));
        assert_eq!(g.raw_shape(), (4241, 2144));
    }

    #[test]
    fn test_neighbouring_overscans_touch() {
        let g = SensorPreset::Compact.geometry();
        // amp 0 overscan ends where amp 1 overscan begins
        assert_eq!(
            g.amps[0].raw_horizontal_overscan.end_x(),
            g.amps[1].raw_horizontal_overscan.begin_x
        );
        assert_eq!(g.amps[1].readout, ReadoutSide::End);
        // and amp 1 prescan ends where amp 2 prescan begins
        assert_eq!(
            g.amps[1].raw_horizontal_prescan.end_x(),
            g.amps[2].raw_horizontal_prescan.begin_x
        );
    }

    #[test]
    fn test_compact_dimensions() {
        let g = SensorPreset::Compact.geometry();
        assert_eq!(g.shape(), (96, 256));
        assert_eq!(g.raw_shape(), (112, 320));
        for amp in &g.amps {
            assert_eq!(amp.raw_horizontal_prescan.width, 8);
            assert_eq!(amp.raw_horizontal_prescan.begin_y, amp.raw_data.begin_y);
        }
        assert_eq!(g.amps[0].raw_horizontal_prescan.end_x(), g.amps[0].raw_data.begin_x);
        assert_eq!(g.amps[1].raw_horizontal_prescan.begin_x, g.amps[1].raw_data.end_x());
    }

    #[test]
    fn test_horizontal_prescan_must_fit() {
        let mut g = SensorPreset::Compact.geometry();
        g.amps[3].raw_horizontal_prescan.width += 1;
        assert!(matches!(g.validate(), Err(AnalysisError::Geometry(m)) if m.contains("prescan")));
    }

    #[test]
    fn test_wrong_amp_count_rejected() {
        let mut g = SensorPreset::Compact.geometry();
        g.amps.pop();
        assert!(matches!(g.validate(), Err(AnalysisError::Geometry(_))));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut g = SensorPreset::Compact.geometry();
        g.amps[2].bbox.width -= 1;
        assert!(g.validate().is_err());
    }

    #[test]
    fn test_bbox_view_and_sub() {
        let data = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f32);
        let b = BBox::new(2, 3, 4, 2);
        let v = b.view(data.view()).unwrap();
        assert_eq!(v.dim(), (2, 4));
        assert_eq!(v[[0, 0]], 32.0);

        assert!(b.sub(1, 0, 3, 2).is_ok());
        assert!(b.sub(2, 0, 3, 2).is_err());
        assert!(BBox::new(8, 0, 4, 1).view(data.view()).is_err());
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("hsc".parse::<SensorPreset>().unwrap(), SensorPreset::Hsc);
        assert!("kaf".parse::<SensorPreset>().is_err());
    }
}
