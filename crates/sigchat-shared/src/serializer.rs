use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::CodecError;

/// Converts values to and from a text representation.
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<String, CodecError>;
    fn deserialize(&self, text: &str) -> Result<T, CodecError>;
}

/// JSON text via serde_json.
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Serializer<T> for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string(value).map_err(|e| CodecError::Serialize(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::Deserialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::types::User;

    #[test]
    fn test_json_event_roundtrip() {
        let serializer = JsonSerializer::<Event>::new();
        let event = Event::add_contact(
            User {
                identifier: "01F07WMZ2J7ZD725X25VJ6NE6J".to_string(),
                registration_id: 12,
                device_id: 0,
            },
            "natter_kitten_spider",
        );

        let text = serializer.serialize(&event).unwrap();
        assert!(text.contains(r#""type":"ADD_CONTACT""#));
        assert_eq!(serializer.deserialize(&text).unwrap(), event);
    }

    #[test]
    fn test_json_message_roundtrip_is_lossless() {
        let serializer = JsonSerializer::<Event>::new();
        let user = User {
            identifier: "01F07WMZ2J7ZD725X25VJ6NE6J".to_string(),
            registration_id: 12,
            device_id: 0,
        };
        let event = Event::add_message(user, "conversation", "hey alice!", chrono::Utc::now());

        let text = serializer.serialize(&event).unwrap();
        assert_eq!(serializer.deserialize(&text).unwrap(), event);
    }

    #[test]
    fn test_invalid_json_is_a_deserialize_error() {
        let serializer = JsonSerializer::<Event>::new();
        assert!(matches!(
            serializer.deserialize("{not json"),
            Err(CodecError::Deserialize(_))
        ));
    }
}
