//! Convenience entry points bundling a store client with a codec.

use crate::client::KeyValueClient;
use crate::codec::{everything, Codec, FilterFn, ObjectDecoder, ResourceVersioner, TransformFn};
use crate::config::WatchConfig;
use crate::error::Result;
use crate::watch::{start_watch, EventStream, WatchRequest};
use std::sync::Arc;

/// Starts watches of objects of type `T` stored in a key-value store.
pub struct WatchHelper<T> {
    client: Arc<dyn KeyValueClient>,
    codec: Arc<dyn Codec<T>>,
    versioner: Option<Arc<dyn ResourceVersioner<T>>>,
    config: WatchConfig,
}

impl<T: Send + 'static> WatchHelper<T> {
    pub fn new(client: Arc<dyn KeyValueClient>, codec: Arc<dyn Codec<T>>) -> Self {
        Self {
            client,
            codec,
            versioner: None,
            config: WatchConfig::default(),
        }
    }

    /// Stamp every decoded object with the store index it came from.
    pub fn with_versioner(mut self, versioner: Arc<dyn ResourceVersioner<T>>) -> Self {
        self.versioner = Some(versioner);
        self
    }

    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(&self) -> &Arc<dyn KeyValueClient> {
        &self.client
    }

    pub fn codec(&self) -> &Arc<dyn Codec<T>> {
        &self.codec
    }

    /// Watch the items under `key`, keeping those that pass `filter`.
    ///
    /// `resume_version` resumes after a previously seen index; `None` first
    /// emits the items that currently exist.
    pub fn watch_list(
        &self,
        key: &str,
        resume_version: Option<u64>,
        filter: FilterFn<T>,
    ) -> Result<EventStream<T>> {
        start_watch(
            Arc::clone(&self.client),
            WatchRequest::list(key, resume_version, filter),
            self.decoder(None),
            &self.config,
        )
    }

    /// Watch a single key.
    pub fn watch(&self, key: &str, resume_version: Option<u64>) -> Result<EventStream<T>> {
        self.watch_and_transform(key, resume_version, None)
    }

    /// Watch a single key, passing every decoded object through `transform`.
    ///
    /// Waits for the watch to be acknowledged and returns its error if it
    /// fails to start.
    pub fn watch_and_transform(
        &self,
        key: &str,
        resume_version: Option<u64>,
        transform: Option<TransformFn<T>>,
    ) -> Result<EventStream<T>> {
        let mut stream = start_watch(
            Arc::clone(&self.client),
            WatchRequest::single(key, resume_version, everything()),
            self.decoder(transform),
            &self.config,
        )?;
        stream.wait_started()?;
        Ok(stream)
    }

    fn decoder(&self, transform: Option<TransformFn<T>>) -> ObjectDecoder<T> {
        ObjectDecoder::new(Arc::clone(&self.codec), self.versioner.clone(), transform)
    }
}
