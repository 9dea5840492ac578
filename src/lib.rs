/// PLC Ledger - did:plc operation-log validation and fork resolution
///
/// Validates signed, content-addressed operation logs, resolves competing
/// forks by rotation-key authority within the 72 hour recovery window, and
/// commits accepted operations to an append-only store.

pub mod config;
pub mod context;
pub mod crypto;
pub mod db;
pub mod directory;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod operations;
pub mod store;
pub mod validation;

pub use directory::{Directory, Resolution};
pub use error::{PlcError, PlcResult};
pub use operations::{Document, IndexedOperation, Operation};
pub use validation::{replay_log, resolve_next_op, validate_genesis, ForkResolution};
