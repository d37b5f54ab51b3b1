//! # Publications
//!
//! A publication is the unit carried by the transport: a topic and an opaque
//! JSON-encoded payload. The bus never looks inside the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the pub/sub layer.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be encoded.
    #[error("unable to encode publication: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload could not be decoded into the requested type.
    #[error("unable to decode publication: {0}")]
    Decode(#[source] serde_json::Error),

    /// The transport is shut down.
    #[error("pubsub transport closed")]
    Closed,

    /// Transport-specific failure.
    #[error("pubsub transport error: {0}")]
    Transport(String),
}

/// A topic-addressed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    topic: String,
    data: Vec<u8>,
}

impl Publication {
    /// Create an empty publication for `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            data: Vec::new(),
        }
    }

    /// Encode `value` as the payload, replacing any previous one.
    pub fn encode<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), BusError> {
        self.data = serde_json::to_vec(value).map_err(BusError::Encode)?;
        Ok(())
    }

    /// Decode the payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_slice(&self.data).map_err(BusError::Decode)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_encode_decode() {
        let mut publication = Publication::new("events");
        publication.encode(&Ping { seq: 3 }).unwrap();

        assert_eq!(publication.topic(), "events");
        assert_eq!(publication.decode::<Ping>().unwrap(), Ping { seq: 3 });
    }

    #[test]
    fn test_decode_wrong_shape() {
        let mut publication = Publication::new("events");
        publication.encode("not a ping").unwrap();

        assert!(matches!(
            publication.decode::<Ping>(),
            Err(BusError::Decode(_))
        ));
    }
}
