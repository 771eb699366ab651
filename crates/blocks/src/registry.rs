//! The handler registry — maps [`BlockKind`] to boxed handlers.

use std::collections::HashMap;
use std::sync::Arc;

use clients::{ChainRpc, ConfCompute, LlmGateway, StorageVault};

use crate::action::{ConnectorRequest, CustomHttpAction};
use crate::chain::ZcashSendHandler;
use crate::compute::ComputeWorkload;
use crate::input::{JsonExtract, MemoParser, PayloadInput};
use crate::llm::NilaiLlm;
use crate::logic::LogicIfElse;
use crate::storage::{StateRead, StateStore};
use crate::{BlockHandler, BlockKind};

/// Dispatch table for block execution.
#[derive(Default)]
pub struct BlockRegistry {
    handlers: HashMap<BlockKind, Arc<dyn BlockHandler>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire every built-in handler against the given service clients.
    pub fn with_clients(
        chain: Arc<dyn ChainRpc>,
        vault: Arc<dyn StorageVault>,
        compute: Arc<dyn ConfCompute>,
        llm: Arc<dyn LlmGateway>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(BlockKind::PayloadInput, Arc::new(PayloadInput));
        registry.register(BlockKind::JsonExtract, Arc::new(JsonExtract));
        registry.register(BlockKind::MemoParser, Arc::new(MemoParser));
        registry.register(BlockKind::LogicIfElse, Arc::new(LogicIfElse));
        registry.register(BlockKind::StateStore, Arc::new(StateStore::new(vault.clone())));
        registry.register(BlockKind::StateRead, Arc::new(StateRead::new(vault)));
        registry.register(
            BlockKind::NillionCompute,
            Arc::new(ComputeWorkload::compute(compute.clone())),
        );
        registry.register(
            BlockKind::NillionBlockGraph,
            Arc::new(ComputeWorkload::block_graph(compute)),
        );
        registry.register(BlockKind::NilaiLlm, Arc::new(NilaiLlm::new(llm)));
        registry.register(BlockKind::ZcashSend, Arc::new(ZcashSendHandler::new(chain)));
        registry.register(BlockKind::ConnectorRequest, Arc::new(ConnectorRequest::new()));
        registry.register(BlockKind::CustomHttpAction, Arc::new(CustomHttpAction::new()));
        registry
    }

    pub fn register(&mut self, kind: BlockKind, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: BlockKind) -> Option<&Arc<dyn BlockHandler>> {
        self.handlers.get(&kind)
    }
}
