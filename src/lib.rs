pub mod cli;
pub mod config;
pub mod content;
pub mod detect;
pub mod error;
pub mod ident;
pub mod model;
pub mod probe;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Result, SyncError};
pub use model::ParseResult;
pub use store::ArchiveStore;
