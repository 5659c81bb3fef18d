//! Saving registered transforms across sessions.
//!
//! Storage itself belongs to the host application. This module defines the
//! key-value seam it plugs into and the JSON payload written through it.

use std::sync::{PoisonError, RwLock};

use hashbrown::HashMap;
use mesh_registration::RigidTransform;

use crate::{LocalizeError, LocalizeResult};

/// Opaque string key-value storage supplied by the host.
///
/// Implementations must be shareable with the background registration
/// worker.
pub trait TransformStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Store`] if the backend rejects the write.
    fn save(&self, key: &str, value: &str) -> LocalizeResult<()>;

    /// Loads the value under `key`, or `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Store`] if the backend cannot be read.
    fn load(&self, key: &str) -> LocalizeResult<Option<String>>;

    /// Removes `key`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Store`] if the backend rejects the removal.
    fn remove(&self, key: &str) -> LocalizeResult<bool>;
}

/// In-process [`TransformStore`], for tests and single-run tools.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransformStore for MemoryStore {
    fn save(&self, key: &str, value: &str) -> LocalizeResult<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn load(&self, key: &str) -> LocalizeResult<Option<String>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn remove(&self, key: &str) -> LocalizeResult<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some())
    }
}

/// Serializes a transform to its JSON payload.
///
/// # Errors
///
/// [`LocalizeError::Serialization`] if encoding fails.
///
/// # Example
///
/// ```
/// use mesh_localize::{decode_transform, encode_transform};
/// use mesh_registration::RigidTransform;
/// use nalgebra::Vector3;
///
/// let transform = RigidTransform::from_translation(Vector3::new(1.0, 2.0, 3.0));
/// let json = encode_transform(&transform).unwrap();
/// assert_eq!(decode_transform(&json).unwrap(), transform);
/// ```
pub fn encode_transform(transform: &RigidTransform) -> LocalizeResult<String> {
    Ok(serde_json::to_string(transform)?)
}

/// Parses a JSON payload written by [`encode_transform`].
///
/// The rotation is renormalized after parsing, since stored quaternions
/// may have been rounded.
///
/// # Errors
///
/// [`LocalizeError::Serialization`] for malformed input and
/// [`LocalizeError::InvalidTransform`] for non-finite values or a
/// non-positive scale.
pub fn decode_transform(payload: &str) -> LocalizeResult<RigidTransform> {
    let transform: RigidTransform = serde_json::from_str(payload)?;
    if !transform.is_valid() || transform.rotation.quaternion().norm() < f64::EPSILON {
        return Err(LocalizeError::InvalidTransform);
    }
    Ok(transform.renormalize())
}
