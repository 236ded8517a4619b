//! State persisted in a key-value store.
//!
//! Values are stored as JSON, except values serializing to a plain string, which are stored
//! without quotes. Strings in the `YYYY-MM-DDTHH:mm:ss.sssZ` timestamp form are kept quoted so
//! that they read back as dates.

use std::{
    cell::{Ref, RefCell},
    collections::BTreeMap,
    rc::Rc,
    sync::LazyLock,
};

use derive_ex::derive_ex;
use parse_display::Display;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};

use crate::{ActionContext, SignalContext, State};

#[cfg(test)]
mod tests;

/// String key-value store, such as a browser's local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Rc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value)
    }
    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// In-memory [`KeyValueStore`]. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Rc<RefCell<BTreeMap<String, String>>>);

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0.borrow().get(key).cloned()
    }
    fn set(&self, key: &str, value: &str) {
        self.0.borrow_mut().insert(key.to_owned(), value.to_owned());
    }
    fn remove(&self, key: &str) {
        self.0.borrow_mut().remove(key);
    }
}

#[derive(Debug, Display)]
pub enum StorageError {
    #[display("failed to encode value for `{key}`: {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
    #[display("failed to decode stored value for `{key}`: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Encode { source, .. } | StorageError::Decode { source, .. } => {
                Some(source)
            }
        }
    }
}

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").unwrap());

/// Returns `true` if `s` is a timestamp of the form `YYYY-MM-DDTHH:mm:ss.sssZ`.
pub fn is_timestamp(s: &str) -> bool {
    TIMESTAMP.is_match(s)
}

/// Encodes `value` in its stored form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    if json.starts_with('"') {
        let s: String = serde_json::from_str(&json)?;
        if !is_timestamp(&s) {
            return Ok(s);
        }
    }
    Ok(json)
}

/// Decodes a stored value.
///
/// Text that is not valid JSON for `T` is read as a bare string.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(value) => Ok(value),
        Err(e) => {
            serde_json::from_value(serde_json::Value::String(raw.to_owned())).map_err(|_| e)
        }
    }
}

/// Serde helper that writes a `DateTime<Utc>` as `YYYY-MM-DDTHH:mm:ss.sssZ`.
///
/// Use with `#[serde(with = "sigmut_hooks::storage::iso_millis")]`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A state mirrored into a [`KeyValueStore`] under a fixed key.
///
/// `None` means the key is absent from the store.
#[derive_ex(Clone, bound(S))]
pub struct PersistedState<T: 'static, S: KeyValueStore> {
    value: State<Option<T>>,
    key: Rc<str>,
    store: S,
}

impl<T, S> PersistedState<T, S>
where
    T: Serialize + DeserializeOwned + 'static,
    S: KeyValueStore,
{
    /// Reads the value stored under `key`, or uses `initial` if there is none.
    ///
    /// The resulting value is written back to the store.
    pub fn new(store: S, key: &str, initial: Option<T>) -> Result<Self, StorageError> {
        Self::new_with(store, key, || initial)
    }

    /// Like [`new`](Self::new), but `initial` is only called when nothing is stored.
    pub fn new_with(
        store: S,
        key: &str,
        initial: impl FnOnce() -> Option<T>,
    ) -> Result<Self, StorageError> {
        let value = match store.get(key) {
            Some(raw) => Some(decode(&raw).map_err(|source| StorageError::Decode {
                key: key.to_owned(),
                source,
            })?),
            None => initial(),
        };
        write(&store, key, value.as_ref())?;
        Ok(Self {
            value: State::new(value),
            key: key.into(),
            store,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn get(&self, sc: &mut SignalContext) -> Option<T>
    where
        T: Clone,
    {
        self.value.get(sc)
    }

    pub fn borrow<'a>(&'a self, sc: &mut SignalContext) -> Ref<'a, Option<T>> {
        self.value.borrow(sc)
    }

    /// Sets the value and writes it to the store.
    ///
    /// If the value cannot be encoded, neither the state nor the store changes.
    pub fn set(&self, value: Option<T>, ac: &mut ActionContext) -> Result<(), StorageError> {
        write(&self.store, &self.key, value.as_ref())?;
        self.value.set(value, ac);
        Ok(())
    }

    /// Sets the value to the result of `f` applied to the current value and writes it to the store.
    pub fn update(
        &self,
        f: impl FnOnce(Option<&T>) -> Option<T>,
        ac: &mut ActionContext,
    ) -> Result<(), StorageError> {
        let value = f(self.value.borrow_untracked().as_ref());
        self.set(value, ac)
    }
}

impl<T: std::fmt::Debug, S: KeyValueStore> std::fmt::Debug for PersistedState<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedState")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

fn write<T: Serialize>(
    store: &impl KeyValueStore,
    key: &str,
    value: Option<&T>,
) -> Result<(), StorageError> {
    match value {
        Some(value) => {
            let raw = encode(value).map_err(|source| StorageError::Encode {
                key: key.to_owned(),
                source,
            })?;
            tracing::debug!(key, len = raw.len(), "store value");
            store.set(key, &raw);
        }
        None => {
            tracing::debug!(key, "remove value");
            store.remove(key);
        }
    }
    Ok(())
}
