//! Field decoders that treat a value of the wrong type as absent.
//!
//! Used on secondary fields of server payloads so one malformed field does
//! not reject the surrounding event or room.

use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::Value;

/// `None` when the value does not fit `T`.
pub(crate) fn option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(T::deserialize(raw).ok())
}

/// `T::default()` when the value does not fit `T`.
pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(T::deserialize(raw).unwrap_or_default())
}
