pub mod ask;
pub mod check;
pub mod doctor;
pub mod keys;

use ironloop_config::AppConfig;
use ironloop_security::AccessLevel;
use std::path::PathBuf;

/// Access level from the flag, falling back to config.
pub fn access_level(config: &AppConfig, flag: Option<&str>) -> Result<AccessLevel, String> {
    flag.unwrap_or(&config.security.access_level).parse()
}

/// The directory file tools and the shell run in at `level`.
///
/// Sandbox uses the configured sandbox root; project and system use the
/// current directory.
pub fn access_root(config: &AppConfig, level: AccessLevel) -> std::io::Result<PathBuf> {
    match level {
        AccessLevel::Sandbox => Ok(config.security.sandbox_root.clone()),
        AccessLevel::Project | AccessLevel::System => std::env::current_dir(),
    }
}

/// Keys from the process environment, then the config file.
pub fn api_keys(config: &AppConfig) -> Vec<String> {
    config.api_keys(|name| std::env::var(name).ok())
}
