//! `clients` crate — narrow typed interfaces for every external service the
//! engine calls.
//!
//! Each service is a trait plus a reqwest-backed implementation configured
//! from the environment.  The traits are the side-effect seams: engine and
//! block-handler tests substitute mocks, production wires the real clients.

pub mod chain;
pub mod compute;
pub mod error;
pub mod http;
pub mod llm;
pub mod social;
pub mod vault;

pub use chain::{ChainRpc, OperationStatus, ReceivedTransaction, ShieldedSend, ZcashRpcClient};
pub use compute::{ComputeOutcome, ConfCompute, NilccClient};
pub use error::ClientError;
pub use llm::{LlmGateway, LlmReply, NilaiClient};
pub use social::{SocialApiClient, SocialFeed, SocialPost};
pub use vault::{NildbClient, StorageVault};
