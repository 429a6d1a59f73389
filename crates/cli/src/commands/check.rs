//! `ironloop check-path` and `ironloop check-shell`: dry runs of the
//! security layer, useful when tuning access levels.

use ironloop_config::AppConfig;
use ironloop_security::PathGuard;
use ironloop_tools::ToolContext;
use std::path::PathBuf;

pub fn path(
    raw: &str,
    access_level: Option<&str>,
    root: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let level = super::access_level(&config, access_level)?;
    let root = match root {
        Some(root) => root,
        None => super::access_root(&config, level)?,
    };
    let guard = PathGuard::new(level, root).with_forbidden(config.security.extra_forbidden_paths);
    println!("{}", describe_path(&guard, raw)?);
    Ok(())
}

fn describe_path(guard: &PathGuard, raw: &str) -> Result<String, Box<dyn std::error::Error>> {
    let resolved = guard.resolve(raw)?;
    Ok(format!(
        "  allowed ({}, root {}): {}",
        guard.level(),
        guard.root().display(),
        resolved.display()
    ))
}

pub fn shell(command: &str, access_level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let level = super::access_level(&config, access_level)?;
    let ctx = ToolContext::new(level, super::access_root(&config, level)?)
        .with_forbidden(config.security.extra_forbidden_paths)
        .with_allowed_commands(config.security.allowed_commands);
    println!("{}", describe_shell(&ctx, command)?);
    Ok(())
}

fn describe_shell(ctx: &ToolContext, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let vetted = ctx.sanitize("check-shell", command)?;
    Ok(format!("  allowed ({}): {vetted}", ctx.access_level()))
}
