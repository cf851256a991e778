//! Two codecs: a compact binary codec for application state,
//! and a self-describing text codec for records that may outlive schema
//! changes (the transaction log, pub-sub bookkeeping). Each resolves its own
//! [`titan_primitives::CodecTag`] explicitly rather than via runtime type
//! introspection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use titan_primitives::{CodecTag, TitanError};

pub trait Codec {
    fn tag() -> CodecTag;
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TitanError>;
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TitanError>;
}

/// Compact binary codec, backed by `bincode`. Used for application state
/// slots such as `"PrimaryStore"`.
pub struct BinaryCodec;

impl Codec for BinaryCodec {
    fn tag() -> CodecTag {
        CodecTag::Binary
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TitanError> {
        bincode::serialize(value).map_err(|e| TitanError::invalid_input(format!("binary encode failed: {e}")))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TitanError> {
        bincode::deserialize(bytes).map_err(|e| TitanError::fatal(format!("binary decode failed: {e}")))
    }
}

/// Self-describing text codec, backed by `serde_json`. Used for records
/// that must remain legible/compatible across schema revisions, such as
/// `"TransactionStore"`.
pub struct TextCodec;

impl Codec for TextCodec {
    fn tag() -> CodecTag {
        CodecTag::Text
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TitanError> {
        serde_json::to_vec(value).map_err(|e| TitanError::invalid_input(format!("text encode failed: {e}")))
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TitanError> {
        serde_json::from_slice(bytes).map_err(|e| TitanError::fatal(format!("text decode failed: {e}")))
    }
}
