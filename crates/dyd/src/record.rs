// ai
//! 🔤 Record Codec: one table row in, one line of typed JSON out. And back.
//!
//! 🎬 COLD OPEN. INT. ARCHIVE BUCKET, 4:12 AM
//!
//! A number walks into an object store. "I'm `42`," it says. The bucket squints.
//! "Are you though? Or are you `"42"`?" The number sweats. Without its type tag
//! it is nobody. This module exists so that it never has to answer that question.
//!
//! 🧠 Knowledge graph:
//! - `Record` = attribute name → `AttributeValue`, kept in a `BTreeMap` so the wire
//!   order is deterministic run after run.
//! - `AttributeValue` mirrors DynamoDB's typed union: `S`, `N`, `B`, `BOOL`, `NULL`,
//!   `L`, `M`, `SS`, `NS`, `BS`. Numbers stay strings. Precision is not ours to lose.
//! - Encoding writes the DynamoDB tags. Decoding also takes AWS Data Pipeline's
//!   lower-camel tags (`s`, `bOOL`, `nULLValue`, ...) so its exports restore too.
//! - Binary payloads travel as base64, like every AWS JSON API before us.
//!
//! 🦆 The duck is typed `S`. It has always been typed `S`.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// 🎭 One typed attribute value. The tag IS the type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S", alias = "s")]
    S(String),
    #[serde(rename = "N", alias = "n")]
    N(String),
    #[serde(rename = "B", alias = "b")]
    B(#[serde(with = "base64_blob")] Vec<u8>),
    #[serde(rename = "BOOL", alias = "bOOL")]
    Bool(bool),
    #[serde(rename = "NULL", alias = "nULLValue")]
    Null(bool),
    #[serde(rename = "L", alias = "l")]
    L(Vec<AttributeValue>),
    #[serde(rename = "M", alias = "m")]
    M(BTreeMap<String, AttributeValue>),
    #[serde(rename = "SS", alias = "sS")]
    Ss(Vec<String>),
    #[serde(rename = "NS", alias = "nS")]
    Ns(Vec<String>),
    #[serde(rename = "BS", alias = "bS")]
    Bs(#[serde(with = "base64_blob_set")] Vec<Vec<u8>>),
}

/// 📦 One table row. Immutable once read, opaque to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, AttributeValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔧 Builder-style insert, handy for fixtures and the backends.
    pub fn with(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, AttributeValue>> for Record {
    fn from(attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self(attributes)
    }
}

impl FromIterator<(String, AttributeValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 📤 Serialize one record into a single line of typed JSON. No trailing newline.
pub fn encode_record(record: &Record) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}

/// 📥 Parse one line (bytes, no newline) back into a record.
pub fn decode_record(line: &[u8]) -> Result<Record, serde_json::Error> {
    serde_json::from_slice(line)
}

mod base64_blob {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_blob_set {
    use super::*;
    use serde::{Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub(super) fn serialize<S: Serializer>(blobs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(blobs.len()))?;
        for blob in blobs {
            seq.serialize_element(&STANDARD.encode(blob))?;
        }
        seq.end()
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|blob| STANDARD.decode(blob).map_err(serde::de::Error::custom))
            .collect()
    }
}
