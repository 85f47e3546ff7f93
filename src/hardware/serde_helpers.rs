// file: src/hardware/serde_helpers.rs
// version: 1.0.0
// guid: 34e3f5e4-13b6-452a-9385-aaf30fcd7d5e

//! Lenient deserializers for inventory tool output.
//!
//! `lshw` and `lsblk` disagree between versions on whether sizes are strings
//! or numbers and whether missing values are `null` or absent. These helpers
//! normalise all of them to strings (or booleans) so the fingerprint input is
//! stable regardless of the tool version that produced the report.

use serde::{Deserialize, Deserializer};

/// Any JSON scalar
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Unsigned(n) => n.to_string(),
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }

    fn into_bool(self) -> bool {
        match self {
            Scalar::Text(s) => matches!(s.trim(), "1" | "true" | "yes"),
            Scalar::Unsigned(n) => n != 0,
            Scalar::Integer(n) => n != 0,
            Scalar::Float(n) => n != 0.0,
            Scalar::Flag(b) => b,
        }
    }
}

/// Strings, numbers and booleans become their textual form, `null` becomes empty.
pub mod lenient_string {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?
            .map(Scalar::into_string)
            .unwrap_or_default())
    }
}

/// `"0"`/`"1"`, numbers and booleans all map to a flag, `null` is false.
pub mod lenient_bool {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Scalar>::deserialize(deserializer)?
            .map(Scalar::into_bool)
            .unwrap_or(false))
    }
}

/// A `{"units": .., "value": ..}` object or a bare scalar value.
pub mod measure {
    use super::*;
    use crate::hardware::Measure;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawMeasure {
        Full(Measure),
        Bare(Scalar),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Measure>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            Option::<RawMeasure>::deserialize(deserializer)?.map(|raw| match raw {
                RawMeasure::Full(measure) => measure,
                RawMeasure::Bare(value) => Measure {
                    units: String::new(),
                    value: value.into_string(),
                },
            }),
        )
    }
}
