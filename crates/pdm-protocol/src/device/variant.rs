//! Hardware variants

use std::fmt;

use serde::{Deserialize, Serialize};

/// Firmware version, ordered lexicographically by (major, minor, build)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, build: u16) -> Self {
        Self {
            major,
            minor,
            build,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Per-variant hardware description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    /// Code reported in telemetry offset 0
    pub type_code: u8,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub min_version: FirmwareVersion,
}

const STANDARD: VariantSpec = VariantSpec {
    type_code: 0,
    num_inputs: 2,
    num_outputs: 8,
    min_version: FirmwareVersion::new(0, 4, 0),
};

const MAX: VariantSpec = VariantSpec {
    type_code: 1,
    num_inputs: 4,
    num_outputs: 12,
    min_version: FirmwareVersion::new(0, 5, 0),
};

/// PDM hardware variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdmKind {
    #[default]
    Standard,
    Max,
}

impl PdmKind {
    pub fn spec(self) -> &'static VariantSpec {
        match self {
            PdmKind::Standard => &STANDARD,
            PdmKind::Max => &MAX,
        }
    }

    /// Variant reporting `type_code` in telemetry
    pub fn from_type_code(type_code: u8) -> Option<Self> {
        [PdmKind::Standard, PdmKind::Max]
            .into_iter()
            .find(|kind| kind.spec().type_code == type_code)
    }
}

impl fmt::Display for PdmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdmKind::Standard => write!(f, "standard"),
            PdmKind::Max => write!(f, "max"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let min = FirmwareVersion::new(0, 5, 0);
        assert!(FirmwareVersion::new(0, 5, 0) >= min);
        assert!(FirmwareVersion::new(0, 4, 900) < min);
        assert!(FirmwareVersion::new(1, 0, 0) > min);
        assert_eq!(min.to_string(), "0.5.0");
    }

    #[test]
    fn test_variant_table() {
        assert_eq!(PdmKind::Standard.spec().num_outputs, 8);
        assert_eq!(PdmKind::Max.spec().num_inputs, 4);
        assert_eq!(PdmKind::from_type_code(1), Some(PdmKind::Max));
        assert_eq!(PdmKind::from_type_code(9), None);
    }
}
