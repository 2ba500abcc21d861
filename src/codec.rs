//! Decoding, versioning and transformation of stored payloads.

use crate::error::{Result, WatchError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Converts between stored bytes and structured objects.
pub trait Codec<T>: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<T>;
    fn encode(&self, object: &T) -> Result<Vec<u8>>;
}

/// Reads and stamps the store version on a decoded object.
pub trait ResourceVersioner<T>: Send + Sync {
    fn set_resource_version(&self, object: &mut T, version: u64) -> Result<()>;
    fn resource_version(&self, object: &T) -> Result<u64>;
}

/// Objects that carry their own resource version.
pub trait Versioned {
    fn resource_version(&self) -> u64;
    fn set_resource_version(&mut self, version: u64);
}

/// Inclusion predicate: true iff the object belongs in the stream.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Rewrites a decoded object before it is emitted.
pub type TransformFn<T> = Arc<dyn Fn(T) -> Result<T> + Send + Sync>;

/// A filter which accepts every object.
pub fn everything<T: 'static>() -> FilterFn<T> {
    Arc::new(|_: &T| true)
}

/// JSON codec for any serde type.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> Codec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn decode(&self, data: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(data)?)
    }

    fn encode(&self, object: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(object).map_err(|e| WatchError::Encode(e.to_string()))
    }
}

/// Versioner for objects implementing [`Versioned`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ObjectVersioner;

impl<T: Versioned> ResourceVersioner<T> for ObjectVersioner {
    fn set_resource_version(&self, object: &mut T, version: u64) -> Result<()> {
        object.set_resource_version(version);
        Ok(())
    }

    fn resource_version(&self, object: &T) -> Result<u64> {
        Ok(object.resource_version())
    }
}

/// The decode → version → transform pipeline applied to every payload.
pub struct ObjectDecoder<T> {
    codec: Arc<dyn Codec<T>>,
    versioner: Option<Arc<dyn ResourceVersioner<T>>>,
    transform: Option<TransformFn<T>>,
}

impl<T> Clone for ObjectDecoder<T> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            versioner: self.versioner.clone(),
            transform: self.transform.clone(),
        }
    }
}

impl<T> ObjectDecoder<T> {
    pub fn new(
        codec: Arc<dyn Codec<T>>,
        versioner: Option<Arc<dyn ResourceVersioner<T>>>,
        transform: Option<TransformFn<T>>,
    ) -> Self {
        Self {
            codec,
            versioner,
            transform,
        }
    }

    /// Decode `data` and stamp it with `version`.
    ///
    /// A versioning failure is logged and the object is still returned; a
    /// decode or transform failure is an error.
    pub fn decode(&self, data: &[u8], version: u64) -> Result<T> {
        let mut object = self.codec.decode(data)?;

        if let Some(versioner) = &self.versioner {
            if let Err(e) = versioner.set_resource_version(&mut object, version) {
                tracing::error!(version, error = %e, "failure to version api object");
            }
        }

        match &self.transform {
            Some(transform) => transform(object).map_err(|e| {
                tracing::error!(version, error = %e, "failure to transform api object");
                match e {
                    WatchError::Transform(_) => e,
                    other => WatchError::Transform(other.to_string()),
                }
            }),
            None => Ok(object),
        }
    }
}
