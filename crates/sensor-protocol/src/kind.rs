//! Sensor Kind Definitions
//!
//! Defines the physical and calibration sensor kinds the hub can expose and
//! the relationships between them (which kinds stream samples, which kinds
//! are calibration sources and for whom).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor kinds known to the distribution core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SensorKind {
    /// Angular rate, rad/s
    Gyro = 0,
    /// Linear acceleration including gravity, m/s^2
    Accelerometer = 1,
    /// Gravity vector plus linear acceleration
    Gravity = 2,
    /// Magnetic field, uT
    Magnetometer = 3,
    /// Gyro bias calibration source
    GyroCal = 4,
    /// Magnetometer bias calibration source
    MagCal = 5,
}

impl SensorKind {
    /// Number of kinds, for tables indexed by kind
    pub const COUNT: usize = 6;

    /// All kinds in probe order
    pub const ALL: [SensorKind; Self::COUNT] = [
        SensorKind::Gyro,
        SensorKind::Accelerometer,
        SensorKind::Gravity,
        SensorKind::Magnetometer,
        SensorKind::GyroCal,
        SensorKind::MagCal,
    ];

    /// Table index of this kind
    pub fn index(self) -> usize {
        self as usize
    }

    /// Datatype string used for hub discovery
    pub fn datatype(self) -> &'static str {
        match self {
            SensorKind::Gyro => "gyro",
            SensorKind::Accelerometer => "accel",
            SensorKind::Gravity => "gravity",
            SensorKind::Magnetometer => "mag",
            SensorKind::GyroCal => "gyro_cal",
            SensorKind::MagCal => "mag_cal",
        }
    }

    /// Resolve a discovery datatype back to a kind
    pub fn from_datatype(datatype: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.datatype() == datatype)
    }

    /// Calibration-only sources carry no samples and expose no attributes
    pub fn is_calibration_source(self) -> bool {
        matches!(self, SensorKind::GyroCal | SensorKind::MagCal)
    }

    /// Calibration channel that corrects this kind, if any
    pub fn calibration_source(self) -> Option<SensorKind> {
        match self {
            SensorKind::Gyro => Some(SensorKind::GyroCal),
            SensorKind::Magnetometer => Some(SensorKind::MagCal),
            _ => None,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.datatype())
    }
}

/// Fixed-size set of sensor kinds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SensorKind>", into = "Vec<SensorKind>")]
pub struct KindSet([bool; SensorKind::COUNT]);

impl KindSet {
    /// Empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set holding every sample-carrying kind
    pub fn streaming() -> Self {
        SensorKind::ALL
            .into_iter()
            .filter(|kind| !kind.is_calibration_source())
            .collect()
    }

    pub fn insert(&mut self, kind: SensorKind) {
        self.0[kind.index()] = true;
    }

    pub fn remove(&mut self, kind: SensorKind) {
        self.0[kind.index()] = false;
    }

    pub fn contains(&self, kind: SensorKind) -> bool {
        self.0[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = SensorKind> + '_ {
        SensorKind::ALL.into_iter().filter(|kind| self.contains(*kind))
    }
}

impl FromIterator<SensorKind> for KindSet {
    fn from_iter<I: IntoIterator<Item = SensorKind>>(iter: I) -> Self {
        let mut set = KindSet::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl From<Vec<SensorKind>> for KindSet {
    fn from(kinds: Vec<SensorKind>) -> Self {
        kinds.into_iter().collect()
    }
}

impl From<KindSet> for Vec<SensorKind> {
    fn from(set: KindSet) -> Self {
        set.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_roundtrip() {
        for kind in SensorKind::ALL {
            assert_eq!(SensorKind::from_datatype(kind.datatype()), Some(kind));
        }
        assert_eq!(SensorKind::from_datatype("light"), None);
    }

    #[test]
    fn test_calibration_pairs() {
        assert_eq!(SensorKind::Gyro.calibration_source(), Some(SensorKind::GyroCal));
        assert_eq!(SensorKind::Magnetometer.calibration_source(), Some(SensorKind::MagCal));
        assert_eq!(SensorKind::Accelerometer.calibration_source(), None);
        assert!(SensorKind::MagCal.is_calibration_source());
        assert!(!SensorKind::Gravity.is_calibration_source());
    }

    #[test]
    fn test_kind_set() {
        let set = KindSet::streaming();
        assert!(set.contains(SensorKind::Gyro));
        assert!(!set.contains(SensorKind::GyroCal));
        assert_eq!(set.iter().count(), 4);

        let mut set = KindSet::empty();
        set.insert(SensorKind::Gravity);
        set.remove(SensorKind::Gravity);
        assert_eq!(set, KindSet::empty());
    }
}
