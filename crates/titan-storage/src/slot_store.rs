//! A typed view over a [`StorageBackend`] for one `(slot name, codec)` pair.
//! A cell kind binds each of its slots to a codec once and uses a [`TypedSlot`] rather than juggling raw bytes.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use titan_primitives::{Etag, Identity, Precondition, SlotName, TitanError};

use crate::backend::StorageBackend;
use crate::codec::Codec;

pub struct TypedSlot<C> {
    backend: Arc<dyn StorageBackend>,
    name: SlotName,
    _codec: PhantomData<C>,
}

impl<C: Codec> TypedSlot<C> {
    pub fn new(backend: Arc<dyn StorageBackend>, name: SlotName) -> Self {
        Self { backend, name, _codec: PhantomData }
    }

    pub async fn load<T: DeserializeOwned>(&self, cell: &Identity) -> Result<Option<(T, Etag)>, TitanError> {
        let Some(rec) = self.backend.read(cell, self.name).await? else {
            return Ok(None);
        };
        let value = C::decode(&rec.bytes)?;
        Ok(Some((value, rec.etag)))
    }

    pub async fn store<T: Serialize>(
        &self,
        cell: &Identity,
        value: &T,
        expected: Precondition,
    ) -> Result<Etag, TitanError> {
        let bytes = C::encode(value)?;
        self.backend.write(cell, self.name, bytes, C::tag(), expected).await
    }

    pub async fn clear(&self, cell: &Identity, expected: Precondition) -> Result<(), TitanError> {
        self.backend.clear(cell, self.name, expected).await
    }
}
