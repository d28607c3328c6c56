//! Key-value storage contract provided by the host.
//!
//! The host keeps named objects, each a flat map of string fields. The
//! identity mapping and the plugin settings both live in such objects.

use crate::error::StoreError;
use async_trait::async_trait;
use rootcause::Report;
use std::collections::HashMap;

/// Object-field storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads one field of an object. Absent objects and fields yield `None`.
    async fn get_field(&self, key: &str, field: &str)
    -> Result<Option<String>, Report<StoreError>>;

    /// Writes one field, overwriting any previous value.
    async fn set_field(&self, key: &str, field: &str, value: &str)
    -> Result<(), Report<StoreError>>;

    /// Writes one field only if it is not already set.
    ///
    /// Returns `None` when the value was written, or the value already
    /// present. Implementations must make the check and the write atomic.
    async fn set_field_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>, Report<StoreError>>;

    /// Removes one field. Removing an absent field is not an error.
    async fn delete_field(&self, key: &str, field: &str) -> Result<(), Report<StoreError>>;

    /// Reads every field of an object. Absent objects yield an empty map.
    async fn get_object(&self, key: &str) -> Result<HashMap<String, String>, Report<StoreError>>;
}
