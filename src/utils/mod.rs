//! Utility modules for kube-deploy

pub mod dryrun;
pub mod errors;
pub mod logger;
pub mod wait;

// Re-export commonly used items
pub use errors::{DeployFailure, display_error_and_exit, enhance_error};
pub use logger::{Console, log_info, log_warn};
