//! JSON encoding and decoding with the client's settings.

use crate::request::JsonBody;
use serde::de::DeserializeOwned;

/// The JSON codec used for request bodies and response decoding.
///
/// Encoding goes through [`serde_json::Value`], so object keys are always
/// emitted in sorted order. Embedded [`serde_json::value::RawValue`]s are
/// validated on decode. With unknown-field strictness on, any field the
/// destination type would silently ignore is rejected instead.
///
/// A client creates its codec on first use and keeps it for its lifetime.
///
/// # Examples
///
/// ```
/// use omniapi::JsonCodec;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
/// }
///
/// let lenient = JsonCodec::new(false);
/// let user: User = lenient.decode(br#"{"id": 1, "extra": true}"#).unwrap();
/// assert_eq!(user.id, 1);
///
/// let strict = JsonCodec::new(true);
/// assert!(strict.decode::<User>(br#"{"id": 1, "extra": true}"#).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct JsonCodec {
    disallow_unknown_fields: bool,
}

impl JsonCodec {
    /// Creates a codec.
    pub fn new(disallow_unknown_fields: bool) -> Self {
        Self {
            disallow_unknown_fields,
        }
    }

    /// Returns `true` if unknown fields are rejected on decode.
    pub fn disallow_unknown_fields(&self) -> bool {
        self.disallow_unknown_fields
    }

    /// Encodes a value with sorted object keys.
    pub fn encode(&self, value: &dyn JsonBody) -> serde_json::Result<Vec<u8>> {
        let tree = value.to_json()?;
        serde_json::to_vec(&tree)
    }

    /// Decodes a complete JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, trailing data, a shape mismatch,
    /// or, in strict mode, the first unknown field encountered.
    pub fn decode<T: DeserializeOwned>(&self, raw: &[u8]) -> serde_json::Result<T> {
        let mut de = serde_json::Deserializer::from_slice(raw);

        let value = if self.disallow_unknown_fields {
            let mut unknown = Vec::new();
            let value: T =
                serde_ignored::deserialize(&mut de, |path| unknown.push(path.to_string()))?;
            if let Some(path) = unknown.first() {
                return Err(<serde_json::Error as serde::de::Error>::custom(format!(
                    "unknown field `{}`",
                    path
                )));
            }
            value
        } else {
            T::deserialize(&mut de)?
        };

        de.end()?;
        Ok(value)
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(false)
    }
}
