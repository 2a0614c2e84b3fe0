use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use crate::error::PayloadError;

/// Metadata key holding the payload encoding.
pub const METADATA_ENCODING: &str = "encoding";

/// The only encoding this engine produces.
pub const ENCODING_JSON: &str = "json/plain";

/// An encoded value as it travels through the engine: workflow inputs and
/// results, activity inputs and results, and header entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub metadata: HashMap<String, String>,
    pub data: Vec<u8>,
}

impl Payload {
    /// Encode a value as `json/plain`.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Self, PayloadError> {
        let data = serde_json::to_vec(value).map_err(PayloadError::Encode)?;
        Ok(Self {
            metadata: HashMap::from([(METADATA_ENCODING.to_string(), ENCODING_JSON.to_string())]),
            data,
        })
    }

    /// Decode the payload. A payload without an encoding tag is read as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        if let Some(encoding) = self.encoding()
            && encoding != ENCODING_JSON
        {
            return Err(PayloadError::UnsupportedEncoding(encoding.to_string()));
        }
        serde_json::from_slice(&self.data).map_err(PayloadError::Decode)
    }

    pub fn encoding(&self) -> Option<&str> {
        self.metadata.get(METADATA_ENCODING).map(String::as_str)
    }
}
