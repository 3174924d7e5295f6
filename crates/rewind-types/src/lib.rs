//! `rewind-types` – shared vocabulary of the record/replay stack.
//!
//! Every log row is an [`Entry`]: a monotonically numbered, timestamped,
//! type-tagged byte payload filed under a topic key.  Producers hand the
//! recorder a [`RecordValue`], whose variant decides which encoder in
//! [`codec`] turns it into bytes and which [`TypeTag`] is stored alongside.
//!
//! # Modules
//!
//! - [`codec`] – payload encoders and their exact inverses.
//! - [`image`] – collaborator boundary for image encoding/decoding.

pub mod codec;
pub mod image;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use image::{ImageDecoder, ImageEncoder, ImageFormat, ImageFrame, ImageOptions};

/// Discriminator stored next to every payload.
///
/// The string forms (`ndarray`, `protobuf`, `float`, `int`, `str`, `bytes`)
/// are what lands in the log file, so they must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    /// Headerless numeric array bytes.
    NdArray,
    /// Canonical serialized form of a structured message.
    Protobuf,
    /// Hex-float text of an IEEE754 double.
    Float,
    /// 8-byte little-endian signed integer.
    Int,
    /// UTF-8 text.
    Str,
    /// Opaque bytes, stored as-is.
    Bytes,
}

impl TypeTag {
    /// The on-disk spelling of this tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::NdArray => "ndarray",
            TypeTag::Protobuf => "protobuf",
            TypeTag::Float => "float",
            TypeTag::Int => "int",
            TypeTag::Str => "str",
            TypeTag::Bytes => "bytes",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ndarray" => Ok(TypeTag::NdArray),
            "protobuf" => Ok(TypeTag::Protobuf),
            "float" => Ok(TypeTag::Float),
            "int" => Ok(TypeTag::Int),
            "str" => Ok(TypeTag::Str),
            "bytes" => Ok(TypeTag::Bytes),
            other => Err(CodecError::UnsupportedPayloadType(other.to_string())),
        }
    }
}

/// Element type of a [`RecordValue::RawArray`].
///
/// Only used to validate the byte length at record time; the dtype is not
/// written to the log, so readers must know it out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl DType {
    /// Width of one element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }
}

/// A structured message that knows its canonical wire form.
///
/// Implemented by the message-schema collaborator (e.g. generated protobuf
/// types); the recorder only ever sees the resulting bytes.
pub trait WireMessage {
    fn to_wire_bytes(&self) -> Vec<u8>;
}

/// A value handed to the recorder.  The variant picks the encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Float(f64),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    /// Already-serialized structured message.
    Serialized(Vec<u8>),
    /// Little-endian element bytes of a numeric array.
    RawArray {
        bytes: Vec<u8>,
        dtype: DType,
        shape: Vec<usize>,
    },
}

impl RecordValue {
    /// The tag this value will be stored under.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            RecordValue::Float(_) => TypeTag::Float,
            RecordValue::Int(_) => TypeTag::Int,
            RecordValue::Text(_) => TypeTag::Str,
            RecordValue::Bytes(_) => TypeTag::Bytes,
            RecordValue::Serialized(_) => TypeTag::Protobuf,
            RecordValue::RawArray { .. } => TypeTag::NdArray,
        }
    }

    /// Serialize `message` through its [`WireMessage`] implementation.
    pub fn message<M: WireMessage + ?Sized>(message: &M) -> Self {
        RecordValue::Serialized(message.to_wire_bytes())
    }

    /// Build a `float64` array value from `values` laid out as `shape`.
    pub fn f64_array(values: &[f64], shape: Vec<usize>) -> Self {
        RecordValue::RawArray {
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            dtype: DType::F64,
            shape,
        }
    }

    /// Build a `float32` array value from `values` laid out as `shape`.
    pub fn f32_array(values: &[f32], shape: Vec<usize>) -> Self {
        RecordValue::RawArray {
            bytes: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            dtype: DType::F32,
            shape,
        }
    }

    /// Build a `uint8` array value (e.g. raw pixels) laid out as `shape`.
    pub fn u8_array(values: Vec<u8>, shape: Vec<usize>) -> Self {
        RecordValue::RawArray {
            bytes: values,
            dtype: DType::U8,
            shape,
        }
    }
}

impl From<f64> for RecordValue {
    fn from(v: f64) -> Self {
        RecordValue::Float(v)
    }
}

impl From<i64> for RecordValue {
    fn from(v: i64) -> Self {
        RecordValue::Int(v)
    }
}

impl From<&str> for RecordValue {
    fn from(v: &str) -> Self {
        RecordValue::Text(v.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(v: String) -> Self {
        RecordValue::Text(v)
    }
}

impl From<Vec<u8>> for RecordValue {
    fn from(v: Vec<u8>) -> Self {
        RecordValue::Bytes(v)
    }
}

impl From<&[u8]> for RecordValue {
    fn from(v: &[u8]) -> Self {
        RecordValue::Bytes(v.to_vec())
    }
}

/// One immutable row of a replay log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Strictly increasing, assigned at write time; defines global order.
    pub id: i64,
    /// Topic / channel name.
    pub key: String,
    /// Seconds since the Unix epoch at record time.  Pacing only.
    pub timestamp: f64,
    pub type_tag: TypeTag,
    pub payload: Vec<u8>,
}

impl Entry {
    fn expect_tag(&self, expected: TypeTag) -> Result<(), CodecError> {
        if self.type_tag == expected {
            Ok(())
        } else {
            Err(CodecError::TagMismatch {
                expected,
                found: self.type_tag,
            })
        }
    }

    /// Decode a `float` entry.
    pub fn as_float(&self) -> Result<f64, CodecError> {
        self.expect_tag(TypeTag::Float)?;
        codec::decode_float(&self.payload)
    }

    /// Decode an `int` entry.
    pub fn as_int(&self) -> Result<i64, CodecError> {
        self.expect_tag(TypeTag::Int)?;
        codec::decode_int(&self.payload)
    }

    /// Decode a `str` entry.
    pub fn as_text(&self) -> Result<&str, CodecError> {
        self.expect_tag(TypeTag::Str)?;
        codec::decode_text(&self.payload)
    }

    /// Raw payload, whatever the tag.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }
}

/// Errors raised while encoding or decoding payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Unsupported payload type: {0}")]
    UnsupportedPayloadType(String),

    #[error("Expected a {expected} payload, found {found}")]
    TagMismatch { expected: TypeTag, found: TypeTag },

    #[error("Malformed {tag} payload: {reason}")]
    Malformed { tag: TypeTag, reason: String },

    #[error("Image codec error: {0}")]
    Image(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_string_forms_are_stable() {
        let tags = [
            (TypeTag::NdArray, "ndarray"),
            (TypeTag::Protobuf, "protobuf"),
            (TypeTag::Float, "float"),
            (TypeTag::Int, "int"),
            (TypeTag::Str, "str"),
            (TypeTag::Bytes, "bytes"),
        ];
        for (tag, text) in tags {
            assert_eq!(tag.as_str(), text);
            assert_eq!(text.parse::<TypeTag>().unwrap(), tag);
            assert_eq!(serde_json::to_string(&tag).unwrap(), format!("\"{text}\""));
        }
    }

    #[test]
    fn unknown_type_tag_is_unsupported() {
        let err = "pickle".parse::<TypeTag>().unwrap_err();
        assert_eq!(err, CodecError::UnsupportedPayloadType("pickle".to_string()));
    }

    #[test]
    fn record_value_tags_follow_variant() {
        assert_eq!(RecordValue::from(1.5).type_tag(), TypeTag::Float);
        assert_eq!(RecordValue::from(7i64).type_tag(), TypeTag::Int);
        assert_eq!(RecordValue::from("hi").type_tag(), TypeTag::Str);
        assert_eq!(RecordValue::from(vec![1u8]).type_tag(), TypeTag::Bytes);
        assert_eq!(RecordValue::Serialized(vec![]).type_tag(), TypeTag::Protobuf);
        assert_eq!(
            RecordValue::f32_array(&[1.0, 2.0], vec![2]).type_tag(),
            TypeTag::NdArray
        );
    }

    #[test]
    fn wire_message_becomes_serialized_value() {
        struct Ping(u8);
        impl WireMessage for Ping {
            fn to_wire_bytes(&self) -> Vec<u8> {
                vec![0x08, self.0]
            }
        }
        assert_eq!(
            RecordValue::message(&Ping(3)),
            RecordValue::Serialized(vec![0x08, 3])
        );
    }

    #[test]
    fn entry_decoders_check_the_tag() {
        let entry = Entry {
            id: 1,
            key: "odom".to_string(),
            timestamp: 0.0,
            type_tag: TypeTag::Str,
            payload: b"hello".to_vec(),
        };
        assert_eq!(entry.as_text().unwrap(), "hello");
        assert!(matches!(
            entry.as_int(),
            Err(CodecError::TagMismatch { expected: TypeTag::Int, found: TypeTag::Str })
        ));
        assert_eq!(entry.as_bytes(), b"hello");
    }

    #[test]
    fn entry_json_roundtrip() {
        let entry = Entry {
            id: 42,
            key: "camera".to_string(),
            timestamp: 1_700_000_000.25,
            type_tag: TypeTag::Bytes,
            payload: vec![0, 1, 2],
        };
        let json = serde_json::to_string(&entry).unwrap();
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn dtype_item_sizes() {
        assert_eq!(DType::U8.item_size(), 1);
        assert_eq!(DType::I16.item_size(), 2);
        assert_eq!(DType::F32.item_size(), 4);
        assert_eq!(DType::F64.item_size(), 8);
    }
}
