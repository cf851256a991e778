//! The base-type registry: a read-mostly catalog of item definitions,
//! declared `stateless-worker` so the runtime may run several replicas on
//! one node to fan out lookups. Per the stateless-worker contract, no
//! mutable state is carried across calls — every lookup re-reads the
//! singleton catalog slot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use titan_primitives::{CellKind, CodecTag, Identity, Key, Precondition, TitanResult, PRIMARY_STORE};
use titan_runtime::{Cell, CallContext};
use titan_storage::{BinaryCodec, Codec, StorageBackend};

use crate::infra;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct BaseTypeDef {
    pub name: String,
    pub tradeable: bool,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
struct Catalog {
    entries: HashMap<String, BaseTypeDef>,
}

#[derive(Serialize, Deserialize)]
pub enum BaseTypeCall {
    Register(BaseTypeDef),
    Lookup(String),
}

impl titan_runtime::CallKindCheck for BaseTypeCall {
    fn is_interleavable(&self) -> bool {
        true
    }
}

fn singleton_identity() -> Identity {
    Identity::new(CellKind::from("BaseTypeRegistry"), Key::string("global"))
}

pub struct BaseTypeRegistry;

#[async_trait]
impl Cell for BaseTypeRegistry {
    type Call = BaseTypeCall;
    type Reply = Option<BaseTypeDef>;

    fn kind() -> &'static str {
        "BaseTypeRegistry"
    }

    fn new(_identity: Identity) -> Self {
        Self
    }

    async fn on_activate(&mut self, _ctx: &CallContext<Self>) -> TitanResult<()> {
        Ok(())
    }

    async fn handle(&mut self, call: Self::Call, _ctx: &CallContext<Self>) -> TitanResult<Self::Reply> {
        let backend = infra::backend();
        let identity = singleton_identity();
        loop {
            let existing = backend.read(&identity, PRIMARY_STORE).await?;
            let (mut catalog, precondition) = match &existing {
                Some(rec) => (BinaryCodec::decode::<Catalog>(&rec.bytes)?, Precondition::Exactly(rec.etag.clone())),
                None => (Catalog::default(), Precondition::MustNotExist),
            };
            match call {
                BaseTypeCall::Lookup(ref name) => return Ok(catalog.entries.get(name).cloned()),
                BaseTypeCall::Register(ref def) => {
                    catalog.entries.insert(def.name.clone(), def.clone());
                    let bytes = BinaryCodec::encode(&catalog)?;
                    match backend.write(&identity, PRIMARY_STORE, bytes, CodecTag::Binary, precondition).await {
                        Ok(_) => return Ok(None),
                        Err(e) if e.kind() == titan_primitives::ErrorKind::Conflict => continue,
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    fn is_interleavable(_call: &Self::Call) -> bool {
        true
    }

    fn is_stateless_worker() -> bool {
        true
    }
}
