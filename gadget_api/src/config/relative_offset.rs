use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{constants::RELATIVE_OFFSET_LIMIT, primitives::bytes::ByteCount};

/// Location expressed relative to the start of a named structure, or to the
/// start of the volume when no structure is named.
///
/// The textual form is `[<structure>+]<offset>`, e.g. `mbr+92` or `1M`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativeOffset {
    pub relative_to: Option<String>,
    pub offset: u64,
}

impl RelativeOffset {
    pub fn new(relative_to: Option<&str>, offset: u64) -> Self {
        Self {
            relative_to: relative_to.map(str::to_owned),
            offset,
        }
    }
}

impl FromStr for RelativeOffset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (relative_to, offset) = match s.split_once('+') {
            Some(("", _)) => return Err("missing structure name".into()),
            Some((name, offset)) => (Some(name.to_owned()), offset),
            None => (None, s),
        };
        if offset.is_empty() {
            return Err("missing offset".into());
        }

        let offset = ByteCount::from_human_readable(offset)
            .map_err(|e| format!("cannot parse offset \"{offset}\": {e}"))?
            .bytes();
        if offset >= RELATIVE_OFFSET_LIMIT {
            return Err("offset above 4G limit".into());
        }

        Ok(Self {
            relative_to,
            offset,
        })
    }
}

impl Display for RelativeOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.relative_to {
            Some(name) => write!(f, "{name}+{}", ByteCount(self.offset)),
            None => write!(f, "{}", ByteCount(self.offset)),
        }
    }
}

impl<'de> Deserialize<'de> for RelativeOffset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = match serde_yaml::Value::deserialize(deserializer)? {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            _ => {
                return Err(serde::de::Error::custom(
                    "cannot unmarshal gadget relative offset",
                ))
            }
        };

        s.parse().map_err(|e| {
            serde::de::Error::custom(format!("cannot parse relative offset \"{s}\": {e}"))
        })
    }
}

impl Serialize for RelativeOffset {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_offset() {
        let test_cases = [
            ("1234", None, 1234, "1234"),
            ("1234M", None, 1234 << 20, "1234M"),
            ("mbr+92", Some("mbr"), 92, "mbr+92"),
            ("foo+1G", Some("foo"), 1 << 30, "foo+1G"),
            ("foo+1024", Some("foo"), 1024, "foo+1K"),
        ];

        for (input, relative_to, offset, canonical) in test_cases.iter() {
            let parsed: RelativeOffset = input.parse().unwrap();
            assert_eq!(parsed, RelativeOffset::new(*relative_to, *offset));
            assert_eq!(parsed.to_string(), *canonical);
            assert_eq!(canonical.parse::<RelativeOffset>().unwrap(), parsed);
        }
    }

    #[test]
    fn test_parse_relative_offset_errors() {
        let test_cases = [
            ("", "missing offset"),
            ("foo+", "missing offset"),
            ("+12", "missing structure name"),
            ("4G", "offset above 4G limit"),
            ("foo+4096M", "offset above 4G limit"),
            ("-1", "cannot parse offset \"-1\""),
            ("foo+bar", "cannot parse offset \"bar\""),
            ("mbr+17179869184G", "cannot parse offset \"17179869184G\""),
            ("17179869185G", "cannot parse offset \"17179869185G\""),
        ];

        for (input, expected) in test_cases.iter() {
            let err = input.parse::<RelativeOffset>().unwrap_err();
            assert!(
                err.starts_with(expected),
                "unexpected error for '{input}': {err}"
            );
        }
    }

    #[test]
    fn test_deserialize_relative_offset() {
        let parsed: RelativeOffset = serde_yaml::from_str("mbr+92").unwrap();
        assert_eq!(parsed, RelativeOffset::new(Some("mbr"), 92));

        let parsed: RelativeOffset = serde_yaml::from_str("512").unwrap();
        assert_eq!(parsed, RelativeOffset::new(None, 512));

        let err = serde_yaml::from_str::<RelativeOffset>("\"+1\"").unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot parse relative offset \"+1\": missing structure name"));
    }
}
