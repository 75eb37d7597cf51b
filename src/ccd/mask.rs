use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Named bits of the per-pixel quality mask, in bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskPlane {
    Bad,
    Sat,
    Intrp,
    Cr,
    Edge,
    Detected,
    DetectedNegative,
    Suspect,
    NoData,
    Crosstalk,
    NotBlended,
    UnmaskedNan,
}

impl MaskPlane {
    pub const ALL: &[MaskPlane] = &[
        MaskPlane::Bad,
        MaskPlane::Sat,
        MaskPlane::Intrp,
        MaskPlane::Cr,
        MaskPlane::Edge,
        MaskPlane::Detected,
        MaskPlane::DetectedNegative,
        MaskPlane::Suspect,
        MaskPlane::NoData,
        MaskPlane::Crosstalk,
        MaskPlane::NotBlended,
        MaskPlane::UnmaskedNan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MaskPlane::Bad => "BAD",
            MaskPlane::Sat => "SAT",
            MaskPlane::Intrp => "INTRP",
            MaskPlane::Cr => "CR",
            MaskPlane::Edge => "EDGE",
            MaskPlane::Detected => "DETECTED",
            MaskPlane::DetectedNegative => "DETECTED_NEGATIVE",
            MaskPlane::Suspect => "SUSPECT",
            MaskPlane::NoData => "NO_DATA",
            MaskPlane::Crosstalk => "CROSSTALK",
            MaskPlane::NotBlended => "NOT_BLENDED",
            MaskPlane::UnmaskedNan => "UNMASKEDNAN",
        }
    }

    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Combine planes into a policy mask.
    pub fn policy_from(planes: &[MaskPlane]) -> u32 {
        planes.iter().fold(0, |acc, p| acc | p.bit())
    }
}

/// Every defect plane except DETECTED and NOT_BLENDED: a pixel on a detected
/// source is still a valid level measurement.
pub const POLICY_MASK: u32 = 0b1011_1101_1111;

/// The bit pattern `0b101111101111` hard-coded by the first boundary scans.
/// It clears EDGE rather than DETECTED; kept so old tables can be reproduced.
pub const LEGACY_POLICY_MASK: u32 = 0b1011_1110_1111;

/// True where `(flags & policy) == 0`.
pub fn usable_mask(flags: ArrayView2<u32>, policy: u32) -> Array2<bool> {
    flags.mapv(|f| f & policy == 0)
}

/// Which region families get pixel masking before statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskPolicy {
    /// Mask prescan/overscan windows with the raw exposure's own mask.
    /// Off by default: defect flags are only trusted over the imaging area.
    pub mask_scan_regions: bool,
    /// Mask raw and processed data windows with the processed mask.
    pub mask_data_regions: bool,
    pub bits: u32,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            mask_scan_regions: false,
            mask_data_regions: true,
            bits: POLICY_MASK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_matches_named_planes() {
        let excluded: Vec<MaskPlane> = MaskPlane::ALL
            .iter()
            .copied()
            .filter(|p| !matches!(p, MaskPlane::Detected | MaskPlane::NotBlended))
            .collect();
        assert_eq!(MaskPlane::policy_from(&excluded), POLICY_MASK);
        assert_eq!(MaskPlane::Detected.bit(), 1 << 5);
        assert_eq!(MaskPlane::NotBlended.bit(), 1 << 10);
    }

    #[test]
    fn test_detected_and_not_blended_stay_usable() {
        let flags = Array2::from_shape_vec(
            (1, 4),
            vec![
                0,
                MaskPlane::Detected.bit(),
                MaskPlane::NotBlended.bit(),
                MaskPlane::Detected.bit() | MaskPlane::NotBlended.bit(),
            ],
        )
        .unwrap();
        let good = usable_mask(flags.view(), POLICY_MASK);
        assert!(good.iter().all(|&g| g));
    }

    #[test]
    fn test_bad_is_always_unusable() {
        let bad = MaskPlane::Bad.bit();
        let flags = Array2::from_shape_vec(
            (2, 2),
            vec![
                bad,
                bad | MaskPlane::Detected.bit(),
                bad | MaskPlane::NotBlended.bit(),
                bad | 0xFFFF_0000,
            ],
        )
        .unwrap();
        let good = usable_mask(flags.view(), POLICY_MASK);
        assert!(good.iter().all(|&g| !g));
    }

    #[test]
    fn test_each_excluded_plane_disqualifies() {
        for plane in MaskPlane::ALL {
            let flags = Array2::from_elem((1, 1), plane.bit());
            let usable = usable_mask(flags.view(), POLICY_MASK)[[0, 0]];
            let expect = matches!(plane, MaskPlane::Detected | MaskPlane::NotBlended);
            assert_eq!(usable, expect, "{}", plane.name());
        }
    }

    #[test]
    fn test_legacy_mask_differs_only_in_edge_and_detected() {
        assert_eq!(
            POLICY_MASK ^ LEGACY_POLICY_MASK,
            MaskPlane::Edge.bit() | MaskPlane::Detected.bit()
        );
    }

    #[test]
    fn test_high_bits_ignored() {
        let flags = Array2::from_elem((1, 1), 1u32 << 20);
        assert!(usable_mask(flags.view(), POLICY_MASK)[[0, 0]]);
    }
}
