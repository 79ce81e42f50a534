//! Pluggable record serialization.
//!
//! Stores are generic over a [`Codec`] so the storage abstraction does not
//! depend on one serialization format. [`PostcardCodec`] is the default.

use serde::{Serialize, de::DeserializeOwned};
use taxostage_types::codec::{self, CodecError};

/// Converts records of type `T` to and from bytes.
pub trait Codec<T>: Send + Sync {
    /// Encodes a record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the record cannot be serialized.
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decodes a record.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if the bytes do not hold a `T`.
    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// Postcard encoding for any serde type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostcardCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for PostcardCodec {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        codec::encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CodecError> {
        codec::decode(bytes)
    }
}
