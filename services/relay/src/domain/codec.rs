use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RelayError;

/// Decodes one message type's stored payload into its canonical broker form.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, payload: &Value) -> Result<Value, RelayError>;
}

/// Resolves `message_type` tokens to codecs. An unresolvable token is a
/// permanent failure for that record — it will never decode on retry.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn MessageCodec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, message_type: &str, codec: impl MessageCodec + 'static) -> Self {
        self.codecs.insert(message_type.to_owned(), Arc::new(codec));
        self
    }

    pub fn resolve(&self, message_type: &str) -> Option<&Arc<dyn MessageCodec>> {
        self.codecs.get(message_type)
    }
}

/// Codec for JSON-native messages: requires the payload to be a JSON object
/// and passes it through unchanged.
pub struct JsonObjectCodec;

impl MessageCodec for JsonObjectCodec {
    fn decode(&self, payload: &Value) -> Result<Value, RelayError> {
        if payload.is_object() {
            Ok(payload.clone())
        } else {
            Err(RelayError::MalformedPayload(format!(
                "expected a JSON object, got {payload}"
            )))
        }
    }
}
