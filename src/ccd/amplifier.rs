//! Amplifier readout handedness and the boundary windows sampled for each amp.

use serde::{Deserialize, Serialize};

use super::{AmpGeometry, BBox};
use crate::error::{AnalysisError, Result};

/// Edge of the sensor an amplifier's serial register reads out from.
///
/// `Start` amps have their prescan at low x and horizontal overscan at high x;
/// `End` amps are mirrored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadoutSide {
    Start,
    End,
}

impl ReadoutSide {
    /// Amplifiers alternate direction across the sensor: 0 and 2 read from the
    /// start edge, 1 and 3 from the end edge.
    pub fn for_amp(index: usize) -> Self {
        if index % 2 == 0 {
            ReadoutSide::Start
        } else {
            ReadoutSide::End
        }
    }
}

/// Which image a region is sampled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Raw pixels outside the imaging area (prescan/overscan).
    Scan,
    /// Raw pixels inside the imaging area.
    Raw,
    /// Processed pixels inside the imaging area.
    Processed,
}

/// The fourteen sampled regions of one amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    VpScan,
    VpRaw,
    VpIsr,
    VoScan,
    VoRaw,
    VoIsr,
    HpScan,
    HpRaw,
    HpIsr,
    HoScan,
    HoRaw,
    HoIsr,
    AllRaw,
    AllIsr,
}

impl Region {
    pub const COUNT: usize = 14;

    pub const ALL: [Region; Region::COUNT] = [
        Region::VpScan,
        Region::VpRaw,
        Region::VpIsr,
        Region::VoScan,
        Region::VoRaw,
        Region::VoIsr,
        Region::HpScan,
        Region::HpRaw,
        Region::HpIsr,
        Region::HoScan,
        Region::HoRaw,
        Region::HoIsr,
        Region::AllRaw,
        Region::AllIsr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Region::VpScan => "vpscan",
            Region::VpRaw => "vpraw",
            Region::VpIsr => "vpisr",
            Region::VoScan => "voscan",
            Region::VoRaw => "voraw",
            Region::VoIsr => "voisr",
            Region::HpScan => "hpscan",
            Region::HpRaw => "hpraw",
            Region::HpIsr => "hpisr",
            Region::HoScan => "hoscan",
            Region::HoRaw => "horaw",
            Region::HoIsr => "hoisr",
            Region::AllRaw => "allraw",
            Region::AllIsr => "allisr",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn source(self) -> RegionSource {
        match self {
            Region::VpScan | Region::VoScan | Region::HpScan | Region::HoScan => {
                RegionSource::Scan
            }
            Region::VpRaw | Region::VoRaw | Region::HpRaw | Region::HoRaw | Region::AllRaw => {
                RegionSource::Raw
            }
            Region::VpIsr | Region::VoIsr | Region::HpIsr | Region::HoIsr | Region::AllIsr => {
                RegionSource::Processed
            }
        }
    }

    /// The processed-image region whose mask covers the same pixels as a data
    /// region (raw data windows borrow the processed mask). `None` for scan
    /// regions, which lie outside the processed image.
    pub fn processed_twin(self) -> Option<Region> {
        match self {
            Region::VpRaw | Region::VpIsr => Some(Region::VpIsr),
            Region::VoRaw | Region::VoIsr => Some(Region::VoIsr),
            Region::HpRaw | Region::HpIsr => Some(Region::HpIsr),
            Region::HoRaw | Region::HoIsr => Some(Region::HoIsr),
            Region::AllRaw | Region::AllIsr => Some(Region::AllIsr),
            _ => None,
        }
    }
}

fn rows_from_start(b: &BBox, offset: usize, n: usize) -> Result<BBox> {
    b.sub(0, offset, b.width, n)
}

fn rows_from_end(b: &BBox, offset: usize, n: usize) -> Result<BBox> {
    let dy = b
        .height
        .checked_sub(offset + n)
        .ok_or_else(|| too_small(b, offset, n))?;
    b.sub(0, dy, b.width, n)
}

fn cols_from_start(b: &BBox, offset: usize, n: usize) -> Result<BBox> {
    b.sub(offset, 0, n, b.height)
}

fn cols_from_end(b: &BBox, offset: usize, n: usize) -> Result<BBox> {
    let dx = b
        .width
        .checked_sub(offset + n)
        .ok_or_else(|| too_small(b, offset, n))?;
    b.sub(dx, 0, n, b.height)
}

#[derive(Clone, Copy)]
enum Edge {
    Low,
    High,
}

fn cols_at(b: &BBox, edge: Edge, offset: usize, n: usize) -> Result<BBox> {
    match edge {
        Edge::Low => cols_from_start(b, offset, n),
        Edge::High => cols_from_end(b, offset, n),
    }
}

fn too_small(b: &BBox, offset: usize, n: usize) -> AnalysisError {
    AnalysisError::Geometry(format!(
        "{}x{} box too small for a {n}-pixel strip at inset {offset}",
        b.width, b.height
    ))
}

/// Pixel windows for all fourteen regions of one amplifier. Scan and raw
/// windows are in raw-image coordinates, processed windows in processed-image
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionWindows {
    windows: [BBox; Region::COUNT],
}

impl RegionWindows {
    /// Derive the windows for an amplifier.
    ///
    /// `strip` is the width of each boundary strip in pixels and `inset` how far
    /// the data-region strips sit from the edge they sample.
    pub fn extract(amp: &AmpGeometry, strip: usize, inset: usize) -> Result<Self> {
        if strip == 0 {
            return Err(AnalysisError::Geometry("strip size must be positive".into()));
        }
        let raw = &amp.raw_data;
        let isr = &amp.bbox;

        let (prescan_edge, overscan_edge) = match amp.readout {
            ReadoutSide::Start => (Edge::Low, Edge::High),
            ReadoutSide::End => (Edge::High, Edge::Low),
        };

        let windows = [
            rows_from_end(&amp.raw_prescan, 0, strip)?,
            rows_from_start(raw, inset, strip)?,
            rows_from_start(isr, inset, strip)?,
            rows_from_start(&amp.raw_vertical_overscan, 0, strip)?,
            rows_from_end(raw, inset, strip)?,
            rows_from_end(isr, inset, strip)?,
            // prescan columns read last sit against the data
            cols_at(&amp.raw_horizontal_prescan, overscan_edge, 0, strip)?,
            cols_at(raw, prescan_edge, inset, strip)?,
            cols_at(isr, prescan_edge, inset, strip)?,
            // the overscan column read first sits against the data
            cols_at(&amp.raw_horizontal_overscan, prescan_edge, 0, strip)?,
            cols_at(raw, overscan_edge, inset, strip)?,
            cols_at(isr, overscan_edge, inset, strip)?,
            *raw,
            *isr,
        ];

        Ok(Self { windows })
    }

    pub fn get(&self, region: Region) -> BBox {
        self.windows[region.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, BBox)> + '_ {
        Region::ALL.iter().map(move |r| (*r, self.get(*r)))
    }
}

/// Data columns against an amplifier's overscan edge plus the first and last
/// horizontal overscan columns, used to correlate overscan drift with flux.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryColumns {
    pub readout: ReadoutSide,
    pub data: BBox,
    pub overscan_first: BBox,
    pub overscan_last: BBox,
}

impl BoundaryColumns {
    pub fn extract(amp: &AmpGeometry, width: usize) -> Result<Self> {
        if width == 0 {
            return Err(AnalysisError::Geometry("boundary width must be positive".into()));
        }
        let os = &amp.raw_horizontal_overscan;
        let (data, overscan_first, overscan_last) = match amp.readout {
            ReadoutSide::Start => (
                cols_from_end(&amp.raw_data, 0, width)?,
                cols_from_start(os, 0, 1)?,
                cols_from_end(os, 0, 1)?,
            ),
            ReadoutSide::End => (
                cols_from_start(&amp.raw_data, 0, width)?,
                cols_from_end(os, 0, 1)?,
                cols_from_start(os, 0, 1)?,
            ),
        };
        Ok(Self {
            readout: amp.readout,
            data,
            overscan_first,
            overscan_last,
        })
    }

    /// The single data column `offset` pixels in from the overscan edge.
    pub fn column_at_offset(&self, offset: usize) -> Result<BBox> {
        match self.readout {
            ReadoutSide::Start => cols_from_end(&self.data, offset, 1),
            ReadoutSide::End => cols_from_start(&self.data, offset, 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ccd::SensorPreset;

    #[test]
    fn test_region_order_matches_index() {
        for (i, r) in Region::ALL.iter().enumerate() {
            assert_eq!(r.index(), i);
        }
        assert_eq!(Region::AllIsr.name(), "allisr");
    }

    #[test]
    fn test_readout_alternates() {
        assert_eq!(ReadoutSide::for_amp(0), ReadoutSide::Start);
        assert_eq!(ReadoutSide::for_amp(1), ReadoutSide::End);
        assert_eq!(ReadoutSide::for_amp(2), ReadoutSide::Start);
        assert_eq!(ReadoutSide::for_amp(3), ReadoutSide::End);
    }

    #[test]
    fn test_start_amp_windows() {
        let g = SensorPreset::Compact.geometry();
        let amp = &g.amps[0];
        let w = RegionWindows::extract(amp, 2, 5).unwrap();

        // raw data of amp 0 begins after the 8-column prescan, 8 rows up
        assert_eq!(w.get(Region::VpRaw), BBox::new(8, 13, 64, 2));
        assert_eq!(w.get(Region::VoRaw), BBox::new(8, 8 + 96 - 7, 64, 2));
        assert_eq!(w.get(Region::HpScan), BBox::new(6, 8, 2, 96));
        assert_eq!(w.get(Region::HpRaw), BBox::new(13, 8, 2, 96));
        assert_eq!(w.get(Region::HoRaw), BBox::new(8 + 64 - 7, 8, 2, 96));
        assert_eq!(w.get(Region::HoScan), BBox::new(72, 8, 2, 96));
        assert_eq!(w.get(Region::HpIsr), BBox::new(5, 0, 2, 96));
        assert_eq!(w.get(Region::HoIsr), BBox::new(57, 0, 2, 96));
        assert_eq!(w.get(Region::VpScan), BBox::new(8, 6, 64, 2));
        assert_eq!(w.get(Region::VoScan), BBox::new(8, 104, 64, 2));
    }

    #[test]
    fn test_end_amp_windows_are_mirrored() {
        let g = SensorPreset::Compact.geometry();
        let amp = &g.amps[1];
        let w = RegionWindows::extract(amp, 1, 25).unwrap();

        // amp 1: overscan [80, 88), data [88, 152), prescan [152, 160)
        assert_eq!(w.get(Region::HpScan), BBox::new(152, 8, 1, 96));
        assert_eq!(w.get(Region::HoScan), BBox::new(87, 8, 1, 96));
        assert_eq!(w.get(Region::HpRaw), BBox::new(152 - 26, 8, 1, 96));
        assert_eq!(w.get(Region::HoRaw), BBox::new(88 + 25, 8, 1, 96));
        assert_eq!(w.get(Region::HpIsr), BBox::new(64 + 64 - 26, 0, 1, 96));
        assert_eq!(w.get(Region::HoIsr), BBox::new(64 + 25, 0, 1, 96));
    }

    #[test]
    fn test_data_strips_sit_on_their_scan_side() {
        let g = SensorPreset::Hsc.geometry();
        for amp in &g.amps {
            let w = RegionWindows::extract(amp, 1, 25).unwrap();
            let (hp, ho) = (w.get(Region::HpRaw), w.get(Region::HoRaw));
            let (hpscan, hoscan) = (w.get(Region::HpScan), w.get(Region::HoScan));
            let raw = amp.raw_data;
            match amp.readout {
                ReadoutSide::Start => {
                    // 25 data columns between each strip and its scan edge
                    assert_eq!(hp.begin_x - raw.begin_x, 25);
                    assert_eq!(raw.end_x() - ho.end_x(), 25);
                    assert!(hpscan.end_x() <= hp.begin_x && ho.end_x() <= hoscan.begin_x);
                }
                ReadoutSide::End => {
                    assert_eq!(raw.end_x() - hp.end_x(), 25);
                    assert_eq!(ho.begin_x - raw.begin_x, 25);
                    assert!(hp.end_x() <= hpscan.begin_x && hoscan.end_x() <= ho.begin_x);
                }
            }
        }
    }

    #[test]
    fn test_windows_fit_images() {
        let g = SensorPreset::Hsc.geometry();
        for amp in &g.amps {
            let w = RegionWindows::extract(amp, 8, 25).unwrap();
            for (region, b) in w.iter() {
                let shape = match region.source() {
                    RegionSource::Processed => g.shape(),
                    _ => g.raw_shape(),
                };
                assert!(b.fits_within(shape), "{} {b:?}", region.name());
            }
        }
    }

    #[test]
    fn test_oversized_strip_is_geometry_error() {
        let g = SensorPreset::Compact.geometry();
        // the 8-pixel prescans hold a default-sized strip but nothing wider
        for amp in &g.amps {
            assert!(RegionWindows::extract(amp, 8, 25).is_ok());
            assert!(matches!(
                RegionWindows::extract(amp, 9, 25),
                Err(AnalysisError::Geometry(_))
            ));
        }
        assert!(RegionWindows::extract(&g.amps[0], 0, 25).is_err());
        assert!(RegionWindows::extract(&g.amps[0], 2, 70).is_err());
    }

    #[test]
    fn test_end_amp_prescan_strip_is_checked() {
        let mut g = SensorPreset::Compact.geometry();
        g.amps[1].raw_horizontal_prescan.width = 4;
        let err = RegionWindows::extract(&g.amps[1], 6, 25).unwrap_err();
        assert!(matches!(err, AnalysisError::Geometry(_)));
    }

    #[test]
    fn test_boundary_columns() {
        let g = SensorPreset::Compact.geometry();
        let b0 = BoundaryColumns::extract(&g.amps[0], 5).unwrap();
        assert_eq!(b0.data, BBox::new(67, 8, 5, 96));
        assert_eq!(b0.overscan_first, BBox::new(72, 8, 1, 96));
        assert_eq!(b0.overscan_last, BBox::new(79, 8, 1, 96));
        assert_eq!(b0.column_at_offset(0).unwrap().begin_x, 71);

        let b1 = BoundaryColumns::extract(&g.amps[1], 5).unwrap();
        assert_eq!(b1.data.begin_x, 88);
        assert_eq!(b1.overscan_first.begin_x, 87);
        assert_eq!(b1.overscan_last.begin_x, 80);
        assert_eq!(b1.column_at_offset(4).unwrap().begin_x, 92);
    }
}
