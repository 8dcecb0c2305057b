//! Text encoding shared by the WAL and snapshot repositories

use crate::storage::{StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts persisted values to and from text
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> StorageResult<String>;

    fn decode<T: DeserializeOwned>(&self, text: &str) -> StorageResult<T>;
}

/// Compact single-line JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> StorageResult<String> {
        serde_json::to_string(value).map_err(|e| StorageError::Codec(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> StorageResult<T> {
        serde_json::from_str(text).map_err(|e| StorageError::Codec(e.to_string()))
    }
}
