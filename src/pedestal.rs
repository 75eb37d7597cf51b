//! Cumulative amplifier-to-amplifier pedestal chains.
//!
//! Amplifier 1 is the reference and always has pedestal zero. Each following
//! amplifier adds the median step across the boundary it shares with its
//! left neighbour.

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::ccd::amplifier::Region;
use crate::ccd::{AMPS_PER_SENSOR, SensorGeometry};
use crate::error::{AnalysisError, Result};
use crate::table::{AmpStatistics, nan_float};

/// What to do with a chain link whose median step is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Copy the previous amplifier's pedestal and flag the link as held.
    #[default]
    HoldPrevious,
    /// Let NaN run through the rest of the chain.
    Propagate,
}

impl std::str::FromStr for NanPolicy {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "hold_previous" | "hold" => Ok(NanPolicy::HoldPrevious),
            "propagate" => Ok(NanPolicy::Propagate),
            other => Err(AnalysisError::Configuration(format!(
                "unknown NaN policy '{other}'"
            ))),
        }
    }
}

/// Which pair of boundary medians defines each link of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryConvention {
    /// Whole imaging-area medians on both sides of every boundary.
    AllRegion,
    /// Medians of the strips facing each boundary: overscan sides meet between
    /// amps 1|2 and 3|4, prescan sides between amps 2|3.
    ScanEdge,
}

impl BoundaryConvention {
    /// (left amp region, right amp region) for boundary `k` (between amp k and k+1, 0-based).
    fn regions(self, k: usize) -> (Region, Region) {
        match (self, k % 2) {
            (BoundaryConvention::AllRegion, _) => (Region::AllIsr, Region::AllIsr),
            (BoundaryConvention::ScanEdge, 0) => (Region::HoIsr, Region::HoIsr),
            (BoundaryConvention::ScanEdge, _) => (Region::HpIsr, Region::HpIsr),
        }
    }

    /// The three median steps `left - right` across the sensor's boundaries.
    pub fn steps(self, amps: &[AmpStatistics]) -> Result<[f64; AMPS_PER_SENSOR - 1]> {
        if amps.len() != AMPS_PER_SENSOR {
            return Err(AnalysisError::Geometry(format!(
                "pedestal chain needs {AMPS_PER_SENSOR} amplifiers, got {}",
                amps.len()
            )));
        }
        Ok(std::array::from_fn(|k| {
            let (left, right) = self.regions(k);
            amps[k].get(left).median - amps[k + 1].get(right).median
        }))
    }
}

/// Cumulative pedestal per amplifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PedestalChain {
    #[serde(with = "nan_float::array")]
    pub values: [f64; AMPS_PER_SENSOR],
    /// `held[k]` is set when amp k copied its neighbour's pedestal for lack of data.
    pub held: [bool; AMPS_PER_SENSOR],
}

impl PedestalChain {
    pub fn from_steps(steps: [f64; AMPS_PER_SENSOR - 1], policy: NanPolicy) -> Self {
        let mut values = [0.0; AMPS_PER_SENSOR];
        let mut held = [false; AMPS_PER_SENSOR];
        for (k, step) in steps.iter().enumerate() {
            let prev = values[k];
            let next = prev + step;
            values[k + 1] = if next.is_nan() && policy == NanPolicy::HoldPrevious {
                log::warn!(
                    "pedestal step into amp {} undefined, holding {prev}",
                    k + 2
                );
                held[k + 1] = true;
                prev
            } else {
                next
            };
        }
        Self { values, held }
    }

    pub fn any_held(&self) -> bool {
        self.held.iter().any(|&h| h)
    }
}

fn same_values(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()))
}

impl PartialEq for PedestalChain {
    fn eq(&self, other: &Self) -> bool {
        self.held == other.held && same_values(&self.values, &other.values)
    }
}

/// Boundary medians and both pedestal chains for one sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorPedestal {
    /// Median of each amp's prescan-side strip in the processed image.
    #[serde(with = "nan_float::array")]
    pub hp: [f64; AMPS_PER_SENSOR],
    /// Median of each amp's whole processed imaging area.
    #[serde(with = "nan_float::array")]
    pub all: [f64; AMPS_PER_SENSOR],
    /// Median of each amp's overscan-side strip in the processed image.
    #[serde(with = "nan_float::array")]
    pub ho: [f64; AMPS_PER_SENSOR],
    pub all_region: PedestalChain,
    pub scan_edge: PedestalChain,
}

impl SensorPedestal {
    pub fn from_amps(amps: &[AmpStatistics], policy: NanPolicy) -> Result<Self> {
        let all_steps = BoundaryConvention::AllRegion.steps(amps)?;
        let edge_steps = BoundaryConvention::ScanEdge.steps(amps)?;
        let medians = |region: Region| -> [f64; AMPS_PER_SENSOR] {
            std::array::from_fn(|k| amps[k].get(region).median)
        };
        Ok(Self {
            hp: medians(Region::HpIsr),
            all: medians(Region::AllIsr),
            ho: medians(Region::HoIsr),
            all_region: PedestalChain::from_steps(all_steps, policy),
            scan_edge: PedestalChain::from_steps(edge_steps, policy),
        })
    }

    pub fn chain(&self, convention: BoundaryConvention) -> &PedestalChain {
        match convention {
            BoundaryConvention::AllRegion => &self.all_region,
            BoundaryConvention::ScanEdge => &self.scan_edge,
        }
    }
}

impl PartialEq for SensorPedestal {
    fn eq(&self, other: &Self) -> bool {
        same_values(&self.hp, &other.hp)
            && same_values(&self.all, &other.all)
            && same_values(&self.ho, &other.ho)
            && self.all_region == other.all_region
            && self.scan_edge == other.scan_edge
    }
}

/// Processed-shape image holding each amplifier's pedestal over its bbox.
pub fn piston_map(geometry: &SensorGeometry, chain: &PedestalChain) -> Array2<f32> {
    let mut map = Array2::<f32>::zeros(geometry.shape());
    for (amp, &value) in geometry.amps.iter().zip(chain.values.iter()) {
        map.slice_mut(ndarray::s![
            amp.bbox.begin_y..amp.bbox.end_y(),
            amp.bbox.begin_x..amp.bbox.end_x()
        ])
        .fill(value as f32);
    }
    map
}

/// `image + pistons`, pixel by pixel.
pub fn apply_pistons(image: ArrayView2<f32>, pistons: ArrayView2<f32>) -> Result<Array2<f32>> {
    if image.dim() != pistons.dim() {
        return Err(AnalysisError::Shape(format!(
            "image {:?} vs piston map {:?}",
            image.dim(),
            pistons.dim()
        )));
    }
    Ok(&image + &pistons)
}
