//! Delimited cache records and change-gated persistence.
//!
//! A record is a fixed number of string fields joined by one delimiter
//! character. Decoding only checks the field count: a stored value with
//! any other count is "no usable cache" and the caller starts cold.
//! Field types are not validated, so readers must tolerate
//! non-numeric text in numeric-looking fields.

use std::sync::Arc;

use crate::error::StoreError;
use crate::kv::KeyValueStore;

/// A snapshot projection with a fixed on-disk shape.
///
/// Field order is part of the compatibility surface shared with readers
/// of the store.
pub trait CacheRecord: Sized {
    /// Separator between fields.
    const DELIMITER: char;

    /// Exact number of fields in a valid record.
    const FIELD_COUNT: usize;

    /// Field compared by [`SnapshotStore::persist_if_changed`].
    /// `None` compares the whole encoded record.
    const COMPARISON_FIELD: Option<usize>;

    /// Fields in storage order; must yield exactly `FIELD_COUNT` items.
    fn to_fields(&self) -> Vec<String>;

    /// Build from exactly `FIELD_COUNT` fields.
    fn from_fields(fields: Vec<String>) -> Self;
}

/// Outcome of a change-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    Unchanged,
}

/// Join the record's fields.
///
/// Delimiter characters inside a field are replaced by a space so content
/// can never shift the field count.
pub fn encode<R: CacheRecord>(record: &R) -> String {
    let fields = sanitized_fields(record);
    debug_assert_eq!(fields.len(), R::FIELD_COUNT);
    let mut sep = [0u8; 4];
    fields.join(&*R::DELIMITER.encode_utf8(&mut sep))
}

/// Split `raw` into a record, or `None` when the field count is off.
pub fn decode<R: CacheRecord>(raw: &str) -> Option<R> {
    let fields: Vec<String> = raw.split(R::DELIMITER).map(str::to_string).collect();
    if fields.len() != R::FIELD_COUNT {
        tracing::debug!(
            "Cache record has {} fields, expected {}; treating as cold start",
            fields.len(),
            R::FIELD_COUNT
        );
        return None;
    }
    Some(R::from_fields(fields))
}

fn sanitized_fields<R: CacheRecord>(record: &R) -> Vec<String> {
    record
        .to_fields()
        .into_iter()
        .map(|f| {
            if f.contains(R::DELIMITER) {
                f.replace(R::DELIMITER, " ")
            } else {
                f
            }
        })
        .collect()
}

/// Owner of the serialized cache records.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Decode the record under `key`.
    ///
    /// Read failures are logged and reported as `None`, the same as a
    /// missing or malformed record.
    pub fn load<R: CacheRecord>(&self, key: &str) -> Option<R> {
        match self.store.get_string(key) {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to read cache record {}: {}", key, e);
                None
            }
        }
    }

    /// Write `record` under `key` unless the stored record already holds
    /// the same comparison value.
    pub fn persist_if_changed<R: CacheRecord>(
        &self,
        key: &str,
        record: &R,
    ) -> Result<PersistOutcome, StoreError> {
        let encoded = encode(record);

        let unchanged = match self.store.get_string(key)? {
            Some(raw) => match (R::COMPARISON_FIELD, decode::<R>(&raw)) {
                (_, None) => false,
                (None, Some(_)) => raw == encoded,
                (Some(index), Some(stored)) => {
                    let fresh = sanitized_fields(record);
                    let stored = sanitized_fields(&stored);
                    stored.get(index) == fresh.get(index)
                }
            },
            None => false,
        };

        if unchanged {
            tracing::debug!("Cache record {} unchanged, skipping write", key);
            return Ok(PersistOutcome::Unchanged);
        }

        self.store.set_string(key, &encoded)?;
        tracing::info!("Cache record {} updated", key);
        Ok(PersistOutcome::Written)
    }

    /// Raw string read for plain settings such as the unit preference.
    pub fn get_setting(&self, key: &str) -> Option<String> {
        match self.store.get_string(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to read setting {}: {}", key, e);
                None
            }
        }
    }

    /// Raw string write for plain settings.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set_string(key, value)
    }
}
