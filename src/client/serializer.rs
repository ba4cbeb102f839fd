//! Encoding documents into request bodies.

use crate::document::Document;
use crate::error::SerializationError;

/// Turns a document into the bytes sent to the endpoint.
pub trait Serializer: Send + Sync {
    /// Encode a document.
    fn serialize(&self, document: &Document) -> Result<Vec<u8>, SerializationError>;
}

/// JSON encoder, pretty-printed unless built with [`JsonSerializer::compact`].
#[derive(Debug, Clone, Copy)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    /// Indented output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// Single-line output.
    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::pretty()
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, document: &Document) -> Result<Vec<u8>, SerializationError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(document)?
        } else {
            serde_json::to_vec(document)?
        };
        Ok(bytes)
    }
}
