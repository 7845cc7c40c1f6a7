//! # Serde helpers
//!
//! Module dedicated to (de)serialization helpers shared across the
//! crate. Byte strings are stored as base64 text in JSON documents.

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod base64_map {
    use std::collections::BTreeMap;

    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{ser::SerializeMap, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut entries = serializer.serialize_map(Some(map.len()))?;
        for (slot, bytes) in map {
            entries.serialize_entry(slot, &STANDARD.encode(bytes))?;
        }
        entries.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded: BTreeMap<String, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(slot, bytes)| {
                let bytes = STANDARD.decode(bytes).map_err(serde::de::Error::custom)?;
                Ok((slot, bytes))
            })
            .collect()
    }
}
