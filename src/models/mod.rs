use serde::{Deserialize, Deserializer};

pub mod budget;
pub mod project;
pub mod role;
pub mod task;
pub mod user;

/// For `Option<Option<T>>` fields with `#[serde(default)]`: an absent key
/// stays `None`, an explicit `null` becomes `Some(None)`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
