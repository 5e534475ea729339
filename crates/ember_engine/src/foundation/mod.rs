//! Foundation module - process-level utilities
//!
//! - Logging setup
//! - Fatal error reporting

pub mod logging;

use std::panic::Location;

use crate::render::backends::vulkan::VulkanError;

/// Report an unrecoverable error and exit with status 1
///
/// Logs `message`, the caller's location and the location where `error` was
/// raised.
#[track_caller]
pub fn fatal(message: &str, error: &VulkanError) -> ! {
    log::error!("{}", fatal_report(message, error, Location::caller()));
    log::logger().flush();
    std::process::exit(1)
}

fn fatal_report(message: &str, error: &VulkanError, caller: &Location<'_>) -> String {
    let origin = error.location();
    format!(
        "{message}: {error}\n  at {}:{}:{}\n  raised at {}:{}:{}",
        caller.file(),
        caller.line(),
        caller.column(),
        origin.file(),
        origin.line(),
        origin.column()
    )
}
