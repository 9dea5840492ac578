/// Operation-log validation
///
/// Pure, synchronous checks over operation logs:
/// - rotation-key authority and signature attribution
/// - genesis validation and DID binding
/// - fork resolution with the 72 hour recovery window
/// - full-log replay and audit-log verification
pub mod authority;
pub mod fork;
pub mod genesis;
pub mod replay;

pub use authority::{assert_supported_keys, rotation_keys_in_force, signer_rank, verify_signed_by};
pub use fork::{recovery_window, resolve_next_op, ForkResolution, RECOVERY_WINDOW_SECS};
pub use genesis::validate_genesis;
pub use replay::{project_document, replay_indexed, replay_log, verify_audit_log};
