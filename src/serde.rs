//! Serializes reactive containers as the values they currently hold.
//!
//! Serialization reads through the tracked path, so serializing inside a
//! derivation subscribes to the serialized state, and a snapshot taken by a
//! reaction stays current.

use crate::{computed::Computed, traits::With, value::ObservableValue};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

impl<T: Serialize + 'static> Serialize for ObservableValue<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.with(|value| value.serialize(serializer))
    }
}

impl<'de, T: Deserialize<'de> + PartialEq> Deserialize<'de>
    for ObservableValue<T>
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(ObservableValue::new)
    }
}

impl<T: Serialize + Send + Sync + 'static> Serialize for Computed<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.try_with_value(|value| value.serialize(serializer)) {
            Ok(result) => result,
            Err(error) => Err(serde::ser::Error::custom(error)),
        }
    }
}
