//! Bar resolution labels: `1s`, `3m`, `1h`, `1d`, `1w`.

use crate::data::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
}

impl ResolutionUnit {
    fn seconds(self) -> i64 {
        match self {
            ResolutionUnit::Second => 1,
            ResolutionUnit::Minute => 60,
            ResolutionUnit::Hour => 3_600,
            ResolutionUnit::Day => 86_400,
            ResolutionUnit::Week => 604_800,
        }
    }

    fn suffix(self) -> char {
        match self {
            ResolutionUnit::Second => 's',
            ResolutionUnit::Minute => 'm',
            ResolutionUnit::Hour => 'h',
            ResolutionUnit::Day => 'd',
            ResolutionUnit::Week => 'w',
        }
    }
}

/// Duration of one bar.
///
/// Serializes as its label so configs, metadata and file names all agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    count: u32,
    unit: ResolutionUnit,
}

impl Resolution {
    pub fn new(count: u32, unit: ResolutionUnit) -> Result<Self, DataError> {
        if count == 0 {
            return Err(DataError::InvalidResolution(format!("0{}", unit.suffix())));
        }
        Ok(Self { count, unit })
    }

    pub fn seconds(&self) -> i64 {
        i64::from(self.count) * self.unit.seconds()
    }

    /// True if bars at `self` can be built by combining whole bars at `finer`.
    pub fn is_multiple_of(&self, finer: &Resolution) -> bool {
        self.seconds() % finer.seconds() == 0
    }

    /// Start of the bucket containing `epoch_secs`.
    pub fn bucket_start(&self, epoch_secs: i64) -> i64 {
        let secs = self.seconds();
        epoch_secs.div_euclid(secs) * secs
    }
}

impl FromStr for Resolution {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let invalid = || DataError::InvalidResolution(label.to_string());
        let suffix = label.chars().last().ok_or_else(invalid)?;
        let unit = match suffix {
            's' => ResolutionUnit::Second,
            'm' => ResolutionUnit::Minute,
            'h' => ResolutionUnit::Hour,
            'd' => ResolutionUnit::Day,
            'w' => ResolutionUnit::Week,
            _ => return Err(invalid()),
        };
        let digits = &label[..label.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let count: u32 = digits.parse().map_err(|_| invalid())?;
        Resolution::new(count, unit)
    }
}

impl TryFrom<String> for Resolution {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}
