//! Where exposures, geometry and visit metadata come from.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ccd::mask::MaskPlane;
use crate::ccd::sensor::{Exposure, SyntheticReadout};
use crate::ccd::{SensorGeometry, SensorPreset};
use crate::error::{AnalysisError, Result};

/// Raw readout or the instrument-signature-removed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureKind {
    Raw,
    Processed,
}

impl ExposureKind {
    pub fn name(self) -> &'static str {
        match self {
            ExposureKind::Raw => "raw",
            ExposureKind::Processed => "processed",
        }
    }
}

/// Read access to a store of exposures keyed by (visit, sensor).
pub trait DataSource: Sync {
    fn exposure(&self, kind: ExposureKind, visit: u32, sensor: u32) -> Result<Exposure>;

    fn geometry(&self, sensor: u32) -> Result<SensorGeometry>;

    /// A numeric header value such as `exptime`.
    fn metadata(&self, kind: ExposureKind, field: &str, visit: u32) -> Result<f64>;

    /// Sensors with at least one exposure in `visit`, ascending.
    fn sensors(&self, visit: u32) -> Result<Vec<u32>>;

    fn visits(&self) -> Result<Vec<u32>>;
}

/// JSON files under a root directory:
///
/// ```text
/// geometry/c043.json
/// raw/v0001252/c043.json
/// raw/v0001252/metadata.json
/// processed/v0001252/c043.json
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn visit_dir(&self, kind: ExposureKind, visit: u32) -> PathBuf {
        self.root.join(kind.name()).join(format!("v{visit:07}"))
    }

    fn exposure_path(&self, kind: ExposureKind, visit: u32, sensor: u32) -> PathBuf {
        self.visit_dir(kind, visit).join(format!("c{sensor:03}.json"))
    }

    fn geometry_path(&self, sensor: u32) -> PathBuf {
        self.root.join("geometry").join(format!("c{sensor:03}.json"))
    }

    fn metadata_path(&self, kind: ExposureKind, visit: u32) -> PathBuf {
        self.visit_dir(kind, visit).join("metadata.json")
    }

    pub fn write_exposure(
        &self,
        kind: ExposureKind,
        visit: u32,
        sensor: u32,
        exposure: &Exposure,
    ) -> Result<()> {
        write_json(&self.exposure_path(kind, visit, sensor), exposure)
    }

    pub fn write_geometry(&self, sensor: u32, geometry: &SensorGeometry) -> Result<()> {
        write_json(&self.geometry_path(sensor), geometry)
    }

    pub fn write_metadata(
        &self,
        kind: ExposureKind,
        visit: u32,
        fields: &BTreeMap<String, f64>,
    ) -> Result<()> {
        write_json(&self.metadata_path(kind, visit), fields)
    }

    /// Copy every visit and sensor of `source` into this directory.
    ///
    /// Sensors the source cannot provide are skipped so the copy keeps the
    /// same gaps.
    pub fn copy_from(&self, source: &dyn DataSource) -> Result<usize> {
        let mut written = 0;
        let mut geometries = BTreeSet::new();
        for visit in source.visits()? {
            for kind in [ExposureKind::Raw, ExposureKind::Processed] {
                if let Ok(exptime) = source.metadata(kind, "exptime", visit) {
                    let fields = BTreeMap::from([("exptime".to_string(), exptime)]);
                    self.write_metadata(kind, visit, &fields)?;
                }
            }
            for sensor in source.sensors(visit)? {
                if geometries.insert(sensor) {
                    match source.geometry(sensor) {
                        Ok(g) => self.write_geometry(sensor, &g)?,
                        Err(e) if e.is_data_gap() => log::warn!("c{sensor:03}: {e}"),
                        Err(e) => return Err(e),
                    }
                }
                for kind in [ExposureKind::Raw, ExposureKind::Processed] {
                    match source.exposure(kind, visit, sensor) {
                        Ok(exposure) => {
                            self.write_exposure(kind, visit, sensor, &exposure)?;
                            written += 1;
                        }
                        Err(e) if e.is_data_gap() => {
                            log::warn!("v{visit:07} c{sensor:03} {}: {e}", kind.name())
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        log::info!("wrote {written} exposures under {}", self.root.display());
        Ok(written)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: impl FnOnce() -> String) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(AnalysisError::missing(what())),
        Err(e) => return Err(AnalysisError::io(path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|source| AnalysisError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let json = serde_json::to_vec(value)?;
    fs::write(path, json).map_err(|e| AnalysisError::io(path, e))
}

/// Numeric suffixes of entries in `dir` named `<prefix><digits><suffix>`.
fn numbered_entries(dir: &Path, prefix: &str, suffix: &str) -> Result<BTreeSet<u32>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(AnalysisError::io(dir, e)),
    };
    let mut ids = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnalysisError::io(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
            .and_then(|digits| digits.parse().ok())
        {
            ids.insert(id);
        }
    }
    Ok(ids)
}

impl DataSource for DirectorySource {
    fn exposure(&self, kind: ExposureKind, visit: u32, sensor: u32) -> Result<Exposure> {
        let exposure: Exposure = read_json(&self.exposure_path(kind, visit, sensor), || {
            format!("{} v{visit:07} c{sensor:03}", kind.name())
        })?;
        exposure.validated()
    }

    fn geometry(&self, sensor: u32) -> Result<SensorGeometry> {
        read_json(&self.geometry_path(sensor), || format!("geometry c{sensor:03}"))
    }

    fn metadata(&self, kind: ExposureKind, field: &str, visit: u32) -> Result<f64> {
        let fields: BTreeMap<String, f64> = read_json(&self.metadata_path(kind, visit), || {
            format!("{} v{visit:07} metadata", kind.name())
        })?;
        fields
            .get(field)
            .copied()
            .ok_or_else(|| AnalysisError::missing(format!("{field} for v{visit:07}")))
    }

    fn sensors(&self, visit: u32) -> Result<Vec<u32>> {
        let mut ids = numbered_entries(&self.visit_dir(ExposureKind::Raw, visit), "c", ".json")?;
        ids.extend(numbered_entries(
            &self.visit_dir(ExposureKind::Processed, visit),
            "c",
            ".json",
        )?);
        Ok(ids.into_iter().collect())
    }

    fn visits(&self) -> Result<Vec<u32>> {
        let mut ids = numbered_entries(&self.root.join(ExposureKind::Raw.name()), "v", "")?;
        ids.extend(numbered_entries(
            &self.root.join(ExposureKind::Processed.name()),
            "v",
            "",
        )?);
        Ok(ids.into_iter().collect())
    }
}

/// Exposure time the synthetic amp levels are quoted at.
pub const REFERENCE_EXPTIME: f64 = 30.0;

const HOT_PIXEL_LEVEL: f32 = 60_000.0;

/// Reproducible fake exposures for every (visit, sensor) pair.
///
/// The same (seed, visit, sensor) always yields the same pixels.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub preset: SensorPreset,
    pub readout: SyntheticReadout,
    pub seed: u64,
    pub visits: Vec<u32>,
    pub sensors: Vec<u32>,
    /// Listed sensors whose exposures are unavailable.
    pub missing: BTreeSet<u32>,
    /// Saturated, BAD-flagged pixels placed in each amplifier.
    pub hot_pixels: usize,
    /// Per-visit exposure time; levels scale relative to `REFERENCE_EXPTIME`.
    pub exptimes: BTreeMap<u32, f64>,
}

impl SyntheticSource {
    pub fn new(preset: SensorPreset, visits: Vec<u32>, sensors: Vec<u32>) -> Self {
        Self {
            preset,
            readout: SyntheticReadout::default(),
            seed: 0,
            visits,
            sensors,
            missing: BTreeSet::new(),
            hot_pixels: 0,
            exptimes: BTreeMap::new(),
        }
    }

    fn exptime(&self, visit: u32) -> f64 {
        self.exptimes
            .get(&visit)
            .copied()
            .unwrap_or(REFERENCE_EXPTIME)
    }

    fn rng_for(&self, visit: u32, sensor: u32) -> StdRng {
        let key = ((visit as u64) << 32) | sensor as u64;
        StdRng::seed_from_u64(self.seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ key)
    }

    /// Raw and processed exposures for one sensor of one visit.
    pub fn generate(&self, visit: u32, sensor: u32) -> Result<(Exposure, Exposure)> {
        if !self.visits.contains(&visit) || !self.sensors.contains(&sensor) {
            return Err(AnalysisError::missing(format!("v{visit:07} c{sensor:03}")));
        }
        if self.missing.contains(&sensor) {
            return Err(AnalysisError::missing(format!(
                "exposures for v{visit:07} c{sensor:03}"
            )));
        }
        let geometry = self.preset.geometry();
        let scale = self.exptime(visit) / REFERENCE_EXPTIME;
        let readout = SyntheticReadout {
            amp_levels: self.readout.amp_levels.map(|l| l * scale),
            ..self.readout.clone()
        };
        let mut rng = self.rng_for(visit, sensor);
        let (mut raw, mut processed) = readout.generate(&geometry, &mut rng)?;
        self.inject_hot_pixels(&geometry, &mut raw, &mut processed, &mut rng);
        Ok((raw, processed))
    }

    fn inject_hot_pixels(
        &self,
        geometry: &SensorGeometry,
        raw: &mut Exposure,
        processed: &mut Exposure,
        rng: &mut impl Rng,
    ) {
        let bad = MaskPlane::Bad.bit() | MaskPlane::Sat.bit();
        for amp in &geometry.amps {
            for _ in 0..self.hot_pixels {
                let dy = rng.random_range(0..amp.bbox.height);
                let dx = rng.random_range(0..amp.bbox.width);
                let at = [amp.bbox.begin_y + dy, amp.bbox.begin_x + dx];
                let raw_at = [amp.raw_data.begin_y + dy, amp.raw_data.begin_x + dx];
                processed.image_mut()[at] = HOT_PIXEL_LEVEL;
                processed.mask_mut()[at] |= bad;
                raw.image_mut()[raw_at] = HOT_PIXEL_LEVEL;
                raw.mask_mut()[raw_at] |= bad;
            }
        }
    }
}

impl DataSource for SyntheticSource {
    fn exposure(&self, kind: ExposureKind, visit: u32, sensor: u32) -> Result<Exposure> {
        let (raw, processed) = self.generate(visit, sensor)?;
        Ok(match kind {
            ExposureKind::Raw => raw,
            ExposureKind::Processed => processed,
        })
    }

    fn geometry(&self, sensor: u32) -> Result<SensorGeometry> {
        if !self.sensors.contains(&sensor) {
            return Err(AnalysisError::missing(format!("geometry c{sensor:03}")));
        }
        Ok(self.preset.geometry())
    }

    fn metadata(&self, _kind: ExposureKind, field: &str, visit: u32) -> Result<f64> {
        match field {
            "exptime" if self.visits.contains(&visit) => Ok(self.exptime(visit)),
            _ => Err(AnalysisError::missing(format!("{field} for v{visit:07}"))),
        }
    }

    fn sensors(&self, visit: u32) -> Result<Vec<u32>> {
        if !self.visits.contains(&visit) {
            return Ok(Vec::new());
        }
        let mut ids = self.sensors.clone();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    fn visits(&self) -> Result<Vec<u32>> {
        let mut ids = self.visits.clone();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
