use std::{fmt::Display, num::ParseIntError, str::FromStr};

/// Reasons a textual byte count is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ByteCountError {
    #[error(transparent)]
    Invalid(#[from] ParseIntError),

    #[error("value {value} with unit {unit} does not fit in 64 bits")]
    Overflow { value: u64, unit: char },
}

/// A size or offset expressed in bytes.
///
/// Gadget descriptions may spell byte counts as plain numbers or with a
/// K/M/G/T suffix, all to the base of 1024.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl From<u64> for ByteCount {
    fn from(x: u64) -> Self {
        ByteCount(x)
    }
}

impl ByteCount {
    pub fn bytes(self) -> u64 {
        self.0
    }

    pub fn to_human_readable(&self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0".to_owned(),
            0..=9 => format!("{}", self.0),
            10..=19 => format!("{}K", self.0 >> 10),
            20..=29 => format!("{}M", self.0 >> 20),
            30..=39 => format!("{}G", self.0 >> 30),
            _ => format!("{}T", self.0 >> 40),
        }
    }

    /// Renders the count with a binary unit, truncated to two decimals, as
    /// used in diagnostics (e.g. "1.17 GiB").
    pub fn to_iec_string(&self) -> String {
        const UNIT: u64 = 1024;
        if self.0 < UNIT {
            return format!("{} B", self.0);
        }

        let mut div = UNIT;
        let mut exp = 0;
        let mut n = self.0 / UNIT;
        while n >= UNIT {
            div *= UNIT;
            exp += 1;
            n /= UNIT;
        }

        let value = (self.0 as f64 / div as f64 * 100.0).floor() / 100.0;
        let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
        format!("{value} {unit}iB")
    }

    pub fn from_human_readable(mut s: &str) -> Result<Self, ByteCountError> {
        s = s.trim();
        let try_parse = |val: &str, unit: char, shift: u32| -> Result<Self, ByteCountError> {
            let value = val.trim().parse::<u64>()?;
            value
                .checked_mul(1 << shift)
                .map(Self)
                .ok_or(ByteCountError::Overflow { value, unit })
        };
        if let Some(p) = s.strip_suffix('K') {
            try_parse(p, 'K', 10)
        } else if let Some(p) = s.strip_suffix('M') {
            try_parse(p, 'M', 20)
        } else if let Some(p) = s.strip_suffix('G') {
            try_parse(p, 'G', 30)
        } else if let Some(p) = s.strip_suffix('T') {
            try_parse(p, 'T', 40)
        } else {
            try_parse(s, 'B', 0)
        }
    }
}

/// Renders a raw byte count as "<bytes> (<iec>)".
pub fn bytes_and_iec(value: &u64) -> String {
    format!("{value} ({})", ByteCount(*value).to_iec_string())
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl FromStr for ByteCount {
    type Err = ByteCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s.trim())
    }
}

impl<'de> serde::Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<ByteCount, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Size may be provided as a string (e.g. "1M") or as a pure number
        // (e.g. 1024). Serde forces a number when only digits are provided, so
        // we need to deserialize as a generic value and then check the type.
        let value = serde_yaml::Value::deserialize(deserializer)?;

        match value {
            serde_yaml::Value::String(s) => ByteCount::from_str(s.as_str()).map_err(|e| {
                serde::de::Error::custom(format!("cannot parse size \"{s}\": {e}"))
            }),
            serde_yaml::Value::Number(n) => {
                let n = n.as_u64().ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "cannot parse size \"{n}\": expected unsigned integer"
                    ))
                })?;
                Ok(ByteCount(n))
            }
            _ => Err(serde::de::Error::custom("cannot unmarshal gadget size")),
        }
    }
}

impl serde::Serialize for ByteCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 & 0x3FF != 0 {
            // Not a multiple of 1024, write it as a raw number.
            serializer.serialize_u64(self.0)
        } else {
            serializer.serialize_str(self.to_human_readable().as_str())
        }
    }
}
