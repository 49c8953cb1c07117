//! Dry-run mode utilities

use colored::Colorize;

/// Log a skipped dry-run action
pub fn log_action(action: &str) {
    tracing::info!("{} {}", "[DRY RUN]".cyan().bold(), action);
}

/// Execute function and return value only if not in dry-run mode
/// Returns default value in dry-run mode
pub fn exec_unless_dry_run_with_default<F, T, E>(
    dry_run: bool,
    action_desc: &str,
    default: T,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    if dry_run {
        log_action(action_desc);
        Ok(default)
    } else {
        f()
    }
}
