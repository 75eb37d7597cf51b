//! Per-amplifier, per-sensor and per-visit result tables and their on-disk form.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ccd::amplifier::Region;
use crate::error::{AnalysisError, Result};
use crate::pedestal::SensorPedestal;
use crate::stats::ClippedStats;

/// Serde helpers writing NaN as JSON `null` and reading `null` back as NaN.
pub mod nan_float {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }

    pub mod array {
        use super::*;

        pub fn serialize<S: Serializer, const N: usize>(
            values: &[f64; N],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            let opts: Vec<Option<f64>> = values
                .iter()
                .map(|v| v.is_finite().then_some(*v))
                .collect();
            opts.serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
            deserializer: D,
        ) -> Result<[f64; N], D::Error> {
            let opts = Vec::<Option<f64>>::deserialize(deserializer)?;
            if opts.len() != N {
                return Err(serde::de::Error::invalid_length(
                    opts.len(),
                    &format!("an array of {N} numbers").as_str(),
                ));
            }
            Ok(std::array::from_fn(|i| opts[i].unwrap_or(f64::NAN)))
        }
    }
}

/// Clipped statistics for the fourteen regions of one amplifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmpStatistics {
    pub visit: u32,
    pub sensor: u32,
    /// 1-based amplifier number.
    pub amp: u8,
    stats: [ClippedStats; Region::COUNT],
}

impl AmpStatistics {
    pub fn new(visit: u32, sensor: u32, amp: u8, stats: [ClippedStats; Region::COUNT]) -> Self {
        Self {
            visit,
            sensor,
            amp,
            stats,
        }
    }

    pub fn get(&self, region: Region) -> ClippedStats {
        self.stats[region.index()]
    }

    /// Column names in the flat `<region><mean|median|std>` convention.
    pub fn column_names() -> Vec<String> {
        Region::ALL
            .iter()
            .flat_map(|r| {
                ["mean", "median", "std"]
                    .into_iter()
                    .map(move |s| format!("{}{s}", r.name()))
            })
            .collect()
    }

    /// Values matching `column_names()`.
    pub fn row(&self) -> Vec<f64> {
        self.stats
            .iter()
            .flat_map(|s| [s.mean, s.median, s.std])
            .collect()
    }
}

/// Outcome for one sensor of a visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SensorRecord {
    Measured {
        sensor: u32,
        amps: Vec<AmpStatistics>,
        pedestal: SensorPedestal,
    },
    /// Data or geometry was unavailable; no statistics were fabricated.
    Gap { sensor: u32, reason: String },
}

impl SensorRecord {
    pub fn sensor(&self) -> u32 {
        match self {
            SensorRecord::Measured { sensor, .. } | SensorRecord::Gap { sensor, .. } => *sensor,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, SensorRecord::Gap { .. })
    }

    /// Per-amplifier statistics; empty for a gap.
    pub fn amps(&self) -> &[AmpStatistics] {
        match self {
            SensorRecord::Measured { amps, .. } => amps,
            SensorRecord::Gap { .. } => &[],
        }
    }

    pub fn pedestal(&self) -> Option<&SensorPedestal> {
        match self {
            SensorRecord::Measured { pedestal, .. } => Some(pedestal),
            SensorRecord::Gap { .. } => None,
        }
    }
}

/// Settings that shaped a table, stored with it so tables stay comparable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub strip_size: usize,
    pub inset: usize,
    pub sigma: f64,
    pub max_iterations: usize,
    pub mask_bits: u32,
    pub mask_scan_regions: bool,
    pub mask_data_regions: bool,
}

/// Every sensor's outcome for one visit, in ascending sensor order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitTable {
    pub visit: u32,
    pub settings: ScanSettings,
    pub sensors: Vec<SensorRecord>,
}

impl VisitTable {
    pub fn new(visit: u32, settings: ScanSettings, mut sensors: Vec<SensorRecord>) -> Self {
        sensors.sort_by_key(SensorRecord::sensor);
        Self {
            visit,
            settings,
            sensors,
        }
    }

    /// `<dir>/v<visit:07>.json`
    pub fn path_for(dir: &Path, visit: u32) -> PathBuf {
        dir.join(format!("v{visit:07}.json"))
    }

    /// The flat per-amplifier table across all measured sensors.
    pub fn amp_rows(&self) -> impl Iterator<Item = &AmpStatistics> {
        self.sensors.iter().flat_map(|s| s.amps())
    }

    pub fn gaps(&self) -> impl Iterator<Item = &SensorRecord> {
        self.sensors.iter().filter(|s| s.is_gap())
    }

    pub fn sensor(&self, sensor: u32) -> Option<&SensorRecord> {
        self.sensors.iter().find(|s| s.sensor() == sensor)
    }

    /// The per-amplifier rows as CSV with a header line. Undefined
    /// statistics are left empty; gaps contribute no rows.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("visit,sensor,amp");
        for name in AmpStatistics::column_names() {
            out.push(',');
            out.push_str(&name);
        }
        out.push('\n');
        for amp in self.amp_rows() {
            out.push_str(&format!("{},{},{}", amp.visit, amp.sensor, amp.amp));
            for value in amp.row() {
                out.push(',');
                if value.is_finite() {
                    out.push_str(&value.to_string());
                }
            }
            out.push('\n');
        }
        out
    }

    /// Write the table under `dir`, replacing any earlier table for this visit.
    ///
    /// The JSON is written to a sibling temporary file and renamed into place,
    /// so readers never see a half-written table.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| AnalysisError::io(dir, e))?;
        let path = Self::path_for(dir, self.visit);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, json).map_err(|e| AnalysisError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| AnalysisError::io(&path, e))?;
        log::info!(
            "wrote visit {} ({} sensors, {} gaps) to {}",
            self.visit,
            self.sensors.len(),
            self.gaps().count(),
            path.display()
        );
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pedestal::NanPolicy;

    fn stats(level: f64) -> ClippedStats {
        ClippedStats {
            mean: level,
            median: level,
            std: 0.5,
            n_used: 10,
        }
    }

    fn amps(sensor: u32, levels: [f64; 4]) -> Vec<AmpStatistics> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &level)| {
                let mut s = [stats(level); Region::COUNT];
                s[Region::VpScan.index()] = ClippedStats::NO_DATA;
                AmpStatistics::new(1252, sensor, i as u8 + 1, s)
            })
            .collect()
    }

    fn measured(sensor: u32, levels: [f64; 4]) -> SensorRecord {
        let amps = amps(sensor, levels);
        let pedestal = SensorPedestal::from_amps(&amps, NanPolicy::HoldPrevious).unwrap();
        SensorRecord::Measured {
            sensor,
            amps,
            pedestal,
        }
    }

    fn settings() -> ScanSettings {
        ScanSettings {
            strip_size: 8,
            inset: 25,
            sigma: 3.0,
            max_iterations: 5,
            mask_bits: crate::ccd::mask::POLICY_MASK,
            mask_scan_regions: false,
            mask_data_regions: true,
        }
    }

    fn table() -> VisitTable {
        VisitTable::new(
            1252,
            settings(),
            vec![
                measured(43, [100.0, 105.0, f64::NAN, 108.0]),
                SensorRecord::Gap {
                    sensor: 9,
                    reason: "missing data: raw v0001252 c009".into(),
                },
                measured(12, [1.0, 2.0, 3.0, 4.0]),
            ],
        )
    }

    #[test]
    fn test_sensors_sorted() {
        let t = table();
        let ids: Vec<u32> = t.sensors.iter().map(SensorRecord::sensor).collect();
        assert_eq!(ids, vec![9, 12, 43]);
        assert_eq!(t.gaps().count(), 1);
        assert_eq!(t.amp_rows().count(), 8);
        assert!(t.sensor(9).unwrap().pedestal().is_none());
    }

    #[test]
    fn test_path_pattern() {
        let p = VisitTable::path_for(Path::new("/out"), 1252);
        assert_eq!(p, PathBuf::from("/out/v0001252.json"));
    }

    #[test]
    fn test_round_trip_is_nan_aware() {
        let dir = tempfile::tempdir().unwrap();
        let t = table();
        let path = t.write(dir.path()).unwrap();
        let back = VisitTable::read(&path).unwrap();
        assert_eq!(back, t);

        let SensorRecord::Measured { pedestal, .. } = back.sensor(43).unwrap() else {
            panic!("sensor 43 should be measured");
        };
        assert!(pedestal.all[2].is_nan());
        assert!(pedestal.all_region.held[2]);
    }

    #[test]
    fn test_rewrite_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = table();
        t.write(dir.path()).unwrap();
        t.sensors.truncate(1);
        let path = t.write(dir.path()).unwrap();
        assert_eq!(VisitTable::read(&path).unwrap().sensors.len(), 1);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_flat_row_layout() {
        let a = &amps(1, [5.0; 4])[0];
        let names = AmpStatistics::column_names();
        let row = a.row();
        assert_eq!(names.len(), 42);
        assert_eq!(row.len(), 42);
        assert_eq!(names[0], "vpscanmean");
        assert_eq!(names[41], "allisrstd");
        assert!(row[0].is_nan());
        assert_eq!(row[40], 5.0);
    }

    #[test]
    fn test_csv_export() {
        let csv = table().to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("visit,sensor,amp,vpscanmean,vpscanmedian"));
        assert_eq!(lines[0].split(',').count(), 45);
        // gaps contribute no rows
        assert_eq!(lines.len(), 1 + table().amp_rows().count());
        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(first.len(), 45);
        assert_eq!(&first[..3], &["1252", "12", "1"]);
        // undefined vpscan stays empty
        assert_eq!(&first[3..6], &["", "", ""]);
        assert_eq!(first[6], "1");
        assert_eq!(first[8], "0.5");
    }
}
