use std::fmt::Display;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::volume::Schema;

lazy_static! {
    static ref MBR_TYPE_ID: Regex = Regex::new("^[0-9A-F]{2}$").unwrap();
    static ref GPT_GUID: Regex = Regex::new(
        "^(?i)[0-9A-F]{8}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{12}$"
    )
    .unwrap();
}

/// Type of a structure.
///
/// Accepted spellings are the legacy `mbr`, `bare`, a two hex digit MBR
/// partition type, a GPT partition type GUID, or a hybrid `<mbr>,<guid>` pair
/// usable with either schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructureType {
    /// Legacy spelling of the MBR boot code area, implies the `mbr` role.
    Mbr,
    /// A blob of bytes that is not a partition.
    Bare,
    MbrHex(u8),
    Guid(Uuid),
    Hybrid(u8, Uuid),
}

impl StructureType {
    /// MBR partition type code, if the type carries one.
    pub fn mbr_code(&self) -> Option<u8> {
        match self {
            StructureType::MbrHex(code) | StructureType::Hybrid(code, _) => Some(*code),
            _ => None,
        }
    }

    /// GPT partition type GUID, if the type carries one.
    pub fn gpt_guid(&self) -> Option<Uuid> {
        match self {
            StructureType::Guid(guid) | StructureType::Hybrid(_, guid) => Some(*guid),
            _ => None,
        }
    }

    /// The part of the type that is relevant for the given schema.
    pub fn for_schema(&self, schema: Schema) -> String {
        match (self, schema) {
            (StructureType::Hybrid(code, _), Schema::Mbr) => format!("{code:02X}"),
            (StructureType::Hybrid(_, guid), Schema::Gpt) => {
                guid.hyphenated().to_string().to_uppercase()
            }
            _ => self.to_string(),
        }
    }
}

impl TryFrom<&str> for StructureType {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.is_empty() {
            return Err("type is not specified".into());
        }

        match s {
            "bare" => return Ok(StructureType::Bare),
            "mbr" => return Ok(StructureType::Mbr),
            _ => (),
        }

        let parse_code = |code: &str| u8::from_str_radix(code, 16).map_err(|e| e.to_string());
        let parse_guid = |guid: &str| Uuid::parse_str(guid).map_err(|e| e.to_string());

        match s.split_once(',') {
            None if MBR_TYPE_ID.is_match(s) => Ok(StructureType::MbrHex(parse_code(s)?)),
            None if GPT_GUID.is_match(s) => Ok(StructureType::Guid(parse_guid(s)?)),
            None => Err(format!("invalid type \"{s}\": invalid format")),
            Some((code, guid)) if MBR_TYPE_ID.is_match(code) && GPT_GUID.is_match(guid) => Ok(
                StructureType::Hybrid(parse_code(code)?, parse_guid(guid)?),
            ),
            Some(_) => Err(format!("invalid type \"{s}\": invalid format of hybrid type")),
        }
    }
}

impl Display for StructureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StructureType::Mbr => write!(f, "mbr"),
            StructureType::Bare => write!(f, "bare"),
            StructureType::MbrHex(code) => write!(f, "{code:02X}"),
            StructureType::Guid(guid) => {
                write!(f, "{}", guid.hyphenated().to_string().to_uppercase())
            }
            StructureType::Hybrid(code, guid) => write!(
                f,
                "{code:02X},{}",
                guid.hyphenated().to_string().to_uppercase()
            ),
        }
    }
}

impl<'de> Deserialize<'de> for StructureType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Two digit types such as 83 are decoded as numbers by YAML.
        let value = serde_yaml::Value::deserialize(deserializer)?;
        let s = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            _ => return Err(serde::de::Error::custom("cannot unmarshal structure type")),
        };
        StructureType::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

impl Serialize for StructureType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESP_GUID: &str = "C12A7328-F81F-11D2-BA4B-00A0C93EC93B";

    #[test]
    fn test_parse_structure_type() {
        let esp = Uuid::parse_str(ESP_GUID).unwrap();

        assert_eq!(StructureType::try_from("mbr").unwrap(), StructureType::Mbr);
        assert_eq!(
            StructureType::try_from("bare").unwrap(),
            StructureType::Bare
        );
        assert_eq!(
            StructureType::try_from("0C").unwrap(),
            StructureType::MbrHex(0x0c)
        );
        assert_eq!(
            StructureType::try_from(ESP_GUID).unwrap(),
            StructureType::Guid(esp)
        );
        assert_eq!(
            StructureType::try_from(ESP_GUID.to_lowercase().as_str()).unwrap(),
            StructureType::Guid(esp)
        );
        assert_eq!(
            StructureType::try_from(format!("EF,{ESP_GUID}").as_str()).unwrap(),
            StructureType::Hybrid(0xef, esp)
        );

        let invalid = [
            "",
            "0c",
            "123",
            "EF,",
            ",C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
            "EF,C12A7328-F81F-11D2-BA4B-00A0C93EC93",
            "EFF,C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
            "C12A7328-F81F-11D2-BA4B",
            "linux",
        ];
        for s in invalid.iter() {
            assert!(
                StructureType::try_from(*s).is_err(),
                "type '{s}' should have been rejected"
            );
        }
    }

    #[test]
    fn test_schema_specific_part() {
        let t = StructureType::try_from(format!("EF,{ESP_GUID}").as_str()).unwrap();
        assert_eq!(t.for_schema(Schema::Mbr), "EF");
        assert_eq!(t.for_schema(Schema::Gpt), ESP_GUID);
        assert_eq!(t.to_string(), format!("EF,{ESP_GUID}"));
        assert_eq!(t.mbr_code(), Some(0xef));

        assert_eq!(StructureType::Bare.gpt_guid(), None);
        assert_eq!(StructureType::Bare.for_schema(Schema::Gpt), "bare");
    }

    #[test]
    fn test_deserialize_numeric_type() {
        #[derive(Deserialize)]
        struct TestStruct {
            #[serde(rename = "type")]
            structure_type: StructureType,
        }

        let parsed: TestStruct = serde_yaml::from_str("type: 83").unwrap();
        assert_eq!(parsed.structure_type, StructureType::MbrHex(0x83));

        let parsed: TestStruct = serde_yaml::from_str("type: \"0C\"").unwrap();
        assert_eq!(parsed.structure_type, StructureType::MbrHex(0x0c));
    }
}
