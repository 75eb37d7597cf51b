use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ccd::amplifier::{Region, RegionSource, RegionWindows};
use crate::ccd::mask::{MaskPolicy, usable_mask};
use crate::ccd::sensor::Exposure;
use crate::ccd::{AmpGeometry, BBox, SensorGeometry};
use crate::display::{PanelParams, piston_panel};
use crate::error::{AnalysisError, Result};
use crate::image_io;
use crate::pedestal::{BoundaryConvention, NanPolicy, SensorPedestal, piston_map};
use crate::source::{DataSource, ExposureKind};
use crate::stats::{ClippedStats, SigmaClip};
use crate::table::{AmpStatistics, ScanSettings, SensorRecord, VisitTable};

/// All scan parameters. Any subset may be given in a JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Visits to scan; empty means every visit the source knows.
    pub visits: Vec<u32>,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,

    // Regions
    pub strip_size: usize,
    pub inset: usize,

    // Clipping
    pub sigma: f64,
    pub max_iterations: usize,

    pub mask: MaskPolicy,
    pub nan_policy: NanPolicy,

    /// Scan the sensors of a visit on the rayon pool.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            visits: Vec::new(),
            data_dir: PathBuf::from("./data"),
            output_dir: PathBuf::from("./ampscan"),
            strip_size: 8,
            inset: 25,
            sigma: 3.0,
            max_iterations: 5,
            mask: MaskPolicy::default(),
            nan_policy: NanPolicy::default(),
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.strip_size == 0 {
            return Err(AnalysisError::Configuration(
                "strip_size must be positive".into(),
            ));
        }
        if !(self.sigma.is_finite() && self.sigma > 0.0) {
            return Err(AnalysisError::Configuration(format!(
                "sigma must be positive, got {}",
                self.sigma
            )));
        }
        Ok(())
    }

    /// Check that the configured strips fit every amplifier of `geometry`.
    pub fn check_geometry(&self, geometry: &SensorGeometry) -> Result<()> {
        for (i, amp) in geometry.amps.iter().enumerate() {
            RegionWindows::extract(amp, self.strip_size, self.inset).map_err(|e| {
                AnalysisError::Configuration(format!(
                    "strip_size {} with inset {} does not fit amp {}: {e}",
                    self.strip_size,
                    self.inset,
                    i + 1
                ))
            })?;
        }
        Ok(())
    }

    pub fn clip(&self) -> SigmaClip {
        SigmaClip {
            sigma: self.sigma,
            max_iterations: self.max_iterations,
        }
    }

    pub fn settings(&self) -> ScanSettings {
        ScanSettings {
            strip_size: self.strip_size,
            inset: self.inset,
            sigma: self.sigma,
            max_iterations: self.max_iterations,
            mask_bits: self.mask.bits,
            mask_scan_regions: self.mask.mask_scan_regions,
            mask_data_regions: self.mask.mask_data_regions,
        }
    }
}

/// Raw and processed exposures of one sensor with their usable-pixel masks
/// resolved once for all four amplifiers.
pub struct SensorFrames {
    raw: Exposure,
    processed: Exposure,
    raw_usable: Option<Array2<bool>>,
    processed_usable: Option<Array2<bool>>,
}

impl SensorFrames {
    pub fn new(
        raw: Exposure,
        processed: Exposure,
        geometry: &SensorGeometry,
        policy: &MaskPolicy,
    ) -> Result<Self> {
        if raw.dim() != geometry.raw_shape() {
            return Err(AnalysisError::Shape(format!(
                "raw image {:?}, geometry expects {:?}",
                raw.dim(),
                geometry.raw_shape()
            )));
        }
        if processed.dim() != geometry.shape() {
            return Err(AnalysisError::Shape(format!(
                "processed image {:?}, geometry expects {:?}",
                processed.dim(),
                geometry.shape()
            )));
        }
        let raw_usable = policy
            .mask_scan_regions
            .then(|| usable_mask(raw.mask(), policy.bits));
        let processed_usable = policy
            .mask_data_regions
            .then(|| usable_mask(processed.mask(), policy.bits));
        Ok(Self {
            raw,
            processed,
            raw_usable,
            processed_usable,
        })
    }
}

fn masked_view<'a>(
    usable: Option<&'a Array2<bool>>,
    window: &BBox,
) -> Result<Option<ArrayView2<'a, bool>>> {
    usable.map(|m| window.view(m.view())).transpose()
}

/// Clipped statistics for the fourteen regions of one amplifier.
///
/// Scan regions only see the raw mask when `mask_scan_regions` is set. Data
/// regions, raw or processed, are masked with the processed mask over the
/// matching processed window.
pub fn scan_amplifier(
    frames: &SensorFrames,
    amp: &AmpGeometry,
    amp_number: u8,
    visit: u32,
    sensor: u32,
    config: &AnalysisConfig,
) -> Result<AmpStatistics> {
    let windows = RegionWindows::extract(amp, config.strip_size, config.inset)?;
    let clip = config.clip();
    let mut stats = [ClippedStats::NO_DATA; Region::COUNT];

    for (region, window) in windows.iter() {
        let (data, usable) = match region.source() {
            RegionSource::Scan => (
                window.view(frames.raw.image())?,
                masked_view(frames.raw_usable.as_ref(), &window)?,
            ),
            kind => {
                let image = match kind {
                    RegionSource::Raw => frames.raw.image(),
                    _ => frames.processed.image(),
                };
                let twin = region.processed_twin().map(|r| windows.get(r)).unwrap_or(window);
                (
                    window.view(image)?,
                    masked_view(frames.processed_usable.as_ref(), &twin)?,
                )
            }
        };
        if let Some(u) = &usable {
            if u.dim() != data.dim() {
                return Err(AnalysisError::Shape(format!(
                    "{} window {:?} vs mask window {:?}",
                    region.name(),
                    data.dim(),
                    u.dim()
                )));
            }
        }
        let s = clip.apply_masked(data, usable);
        if !s.is_defined() {
            log::debug!(
                "v{visit:07} c{sensor:03} amp {amp_number} {}: no usable pixels",
                region.name()
            );
        }
        stats[region.index()] = s;
    }

    log::debug!(
        "v{visit:07} c{sensor:03} amp {amp_number}: allisr median {:.3}",
        stats[Region::AllIsr.index()].median
    );
    Ok(AmpStatistics::new(visit, sensor, amp_number, stats))
}

/// Load one sensor's data and measure all four amplifiers.
pub fn scan_sensor(
    source: &dyn DataSource,
    visit: u32,
    sensor: u32,
    config: &AnalysisConfig,
) -> Result<SensorRecord> {
    let geometry = source.geometry(sensor)?;
    geometry.validate()?;
    let raw = source.exposure(ExposureKind::Raw, visit, sensor)?;
    let processed = source.exposure(ExposureKind::Processed, visit, sensor)?;
    let frames = SensorFrames::new(raw, processed, &geometry, &config.mask)?;

    let amps = geometry
        .amps
        .iter()
        .enumerate()
        .map(|(i, amp)| scan_amplifier(&frames, amp, i as u8 + 1, visit, sensor, config))
        .collect::<Result<Vec<_>>>()?;
    let pedestal = SensorPedestal::from_amps(&amps, config.nan_policy)?;

    log::info!(
        "v{visit:07} c{sensor:03}: pedestals {:?}",
        pedestal.all_region.values
    );
    Ok(SensorRecord::Measured {
        sensor,
        amps,
        pedestal,
    })
}

/// Fail before any pixels are read when the configured strips fit none of
/// the sensors. Sensors without usable geometry are left to become gaps.
fn check_windows(
    source: &dyn DataSource,
    sensors: &[u32],
    config: &AnalysisConfig,
) -> Result<()> {
    let mut rejected = None;
    for &sensor in sensors {
        let geometry = match source.geometry(sensor) {
            Ok(g) if g.validate().is_ok() => g,
            Ok(_) => continue,
            Err(e) if e.is_data_gap() => continue,
            Err(e) => return Err(e),
        };
        match config.check_geometry(&geometry) {
            Ok(()) => return Ok(()),
            Err(e) => rejected = Some(e),
        }
    }
    rejected.map_or(Ok(()), Err)
}

/// Scan every sensor of a visit. Sensors lacking data or valid geometry
/// become gaps; any other error aborts the visit, as does a strip size or
/// inset that fits no sensor at all.
pub fn scan_visit(
    source: &dyn DataSource,
    visit: u32,
    config: &AnalysisConfig,
) -> Result<VisitTable> {
    config.validate()?;
    let sensors = source.sensors(visit)?;
    if sensors.is_empty() {
        log::warn!("v{visit:07}: no sensors found");
    }
    check_windows(source, &sensors, config)?;
    log::info!("v{visit:07}: scanning {} sensors", sensors.len());

    let scan_one = |&sensor: &u32| -> Result<SensorRecord> {
        match scan_sensor(source, visit, sensor, config) {
            Ok(record) => Ok(record),
            Err(e) if e.is_data_gap() => {
                log::warn!("v{visit:07} c{sensor:03}: {e}");
                Ok(SensorRecord::Gap {
                    sensor,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    };
    let records = if config.parallel {
        sensors.par_iter().map(scan_one).collect::<Result<Vec<_>>>()?
    } else {
        sensors.iter().map(scan_one).collect::<Result<Vec<_>>>()?
    };

    Ok(VisitTable::new(visit, config.settings(), records))
}

/// Scan a visit and publish its table under `config.output_dir`.
pub fn run_visit(source: &dyn DataSource, visit: u32, config: &AnalysisConfig) -> Result<PathBuf> {
    let table = scan_visit(source, visit, config)?;
    table.write(&config.output_dir)
}

/// Run `run_visit` for each configured visit in turn.
pub fn run(source: &dyn DataSource, config: &AnalysisConfig) -> Result<Vec<PathBuf>> {
    let visits = if config.visits.is_empty() {
        source.visits()?
    } else {
        config.visits.clone()
    };
    visits
        .into_iter()
        .map(|visit| run_visit(source, visit, config))
        .collect()
}

/// Write a piston figure for every measured sensor of `table`.
pub fn render_visit(
    source: &dyn DataSource,
    table: &VisitTable,
    convention: BoundaryConvention,
    params: &PanelParams,
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for record in &table.sensors {
        let Some(pedestal) = record.pedestal() else {
            continue;
        };
        let sensor = record.sensor();
        let geometry = source.geometry(sensor)?;
        let processed = source.exposure(ExposureKind::Processed, table.visit, sensor)?;
        let pistons = piston_map(&geometry, pedestal.chain(convention));
        let img = piston_panel(processed.image(), pistons.view(), params)?;
        let path = image_io::panel_path(output_dir, table.visit, sensor);
        image_io::save_image(&img, &path)?;
        log::debug!("wrote {}", path.display());
        written.push(path);
    }
    log::info!(
        "v{:07}: rendered {} sensors to {}",
        table.visit,
        written.len(),
        output_dir.display()
    );
    Ok(written)
}
