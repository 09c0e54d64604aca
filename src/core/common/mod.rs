pub mod errors; // Consolidated error handling
pub mod lock_utils; // Poisoned-lock conversion

pub use errors::PolystoreError;
pub use lock_utils::LockResultExt;
