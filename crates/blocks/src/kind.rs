//! Block catalog keys and per-operation pricing.

/// Every block kind the engine can dispatch, keyed by its catalog id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    PayloadInput,
    JsonExtract,
    MemoParser,
    LogicIfElse,
    StateStore,
    StateRead,
    NillionCompute,
    NillionBlockGraph,
    NilaiLlm,
    ZcashSend,
    ConnectorRequest,
    CustomHttpAction,
}

impl BlockKind {
    /// Parse a catalog id, e.g. `payload-input`.
    pub fn parse(block_id: &str) -> Option<Self> {
        Some(match block_id {
            "payload-input" => Self::PayloadInput,
            "json-extract" => Self::JsonExtract,
            "memo-parser" => Self::MemoParser,
            "logic-if-else" => Self::LogicIfElse,
            "state-store" => Self::StateStore,
            "state-read" => Self::StateRead,
            "nillion-compute" => Self::NillionCompute,
            "nillion-block-graph" => Self::NillionBlockGraph,
            "nilai-llm" => Self::NilaiLlm,
            "zcash-send" => Self::ZcashSend,
            "connector-request" => Self::ConnectorRequest,
            "custom-http-action" => Self::CustomHttpAction,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PayloadInput => "payload-input",
            Self::JsonExtract => "json-extract",
            Self::MemoParser => "memo-parser",
            Self::LogicIfElse => "logic-if-else",
            Self::StateStore => "state-store",
            Self::StateRead => "state-read",
            Self::NillionCompute => "nillion-compute",
            Self::NillionBlockGraph => "nillion-block-graph",
            Self::NilaiLlm => "nilai-llm",
            Self::ZcashSend => "zcash-send",
            Self::ConnectorRequest => "connector-request",
            Self::CustomHttpAction => "custom-http-action",
        }
    }

    /// Credits debited per execution; `None` means the block is free.
    pub fn price(self) -> Option<i64> {
        match self {
            Self::PayloadInput | Self::JsonExtract | Self::MemoParser | Self::LogicIfElse => None,
            Self::StateStore | Self::StateRead => Some(1),
            Self::NillionCompute => Some(5),
            Self::NillionBlockGraph => Some(3),
            Self::NilaiLlm => Some(10),
            Self::ZcashSend => Some(2),
            Self::ConnectorRequest | Self::CustomHttpAction => Some(1),
        }
    }

    /// Whether a graph node of this kind must have a connector bound.
    pub fn requires_connector(self) -> bool {
        matches!(self, Self::ConnectorRequest)
    }

    /// Action blocks bind their output under `responseAlias` when declared.
    pub fn is_action(self) -> bool {
        matches!(self, Self::ConnectorRequest | Self::CustomHttpAction)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
