#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod api;
mod config;
pub mod queue;
pub mod refresher;
pub mod registry;
mod server;
pub mod sweep;

pub use config::Config;
pub use refresher::{
    HashRefresher,
    RefreshOutcome,
};
pub use registry::{
    HashRecord,
    RegistryError,
    SubscriptionRegistry,
};
pub use server::TxsHashServer;
