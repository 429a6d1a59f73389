//! `ironloop doctor`: diagnose configuration and environment.

use ironloop_config::{AppConfig, TranscriptBackend};
use ironloop_providers::keys::suffix;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("ironloop doctor");
    println!("===============\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    let config = match AppConfig::load() {
        Ok(config) => {
            if config_path.exists() {
                println!("  [ok]   Config file valid ({})", config_path.display());
            } else {
                println!("  [info] No config file at {}, using defaults", config_path.display());
            }
            config
        }
        Err(e) => {
            println!("  [fail] Config invalid: {e}");
            return Err("configuration is invalid".into());
        }
    };

    println!(
        "  [ok]   Provider {} at {}, model {}",
        config.provider.name, config.provider.base_url, config.provider.model
    );

    let keys = super::api_keys(&config);
    if keys.is_empty() {
        println!(
            "  [warn] No API keys found (set {}_API_KEY_1, ...)",
            config.provider.env_prefix.trim_end_matches('_').to_uppercase()
        );
        issues += 1;
    } else {
        let masked: Vec<String> = keys.iter().map(|k| suffix(k)).collect();
        println!("  [ok]   {} API key(s): {}", keys.len(), masked.join(", "));
        if keys.len() == 1 {
            println!("  [info] A single key cannot rotate on rate limits");
        }
    }

    match super::access_level(&config, None) {
        Ok(level) => match super::access_root(&config, level) {
            Ok(root) if root.is_dir() => {
                println!("  [ok]   Access level {level}, root {}", root.display());
            }
            Ok(root) => {
                println!(
                    "  [warn] Access level {level}, root {} does not exist yet (created on first ask)",
                    root.display()
                );
                issues += 1;
            }
            Err(e) => {
                println!("  [fail] Cannot determine access root: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  [fail] {e}");
            issues += 1;
        }
    }

    let allowed = &config.security.allowed_commands;
    if allowed.is_empty() {
        println!("  [info] Shell may run any command (security.allowed_commands is empty)");
    } else {
        println!("  [ok]   Shell limited to: {}", allowed.join(", "));
    }

    match config.memory.transcript {
        TranscriptBackend::File => {
            let path = &config.memory.transcript_path;
            let writable = match path.parent() {
                Some(parent) => tokio::fs::create_dir_all(parent).await.is_ok(),
                None => true,
            };
            if writable {
                println!("  [ok]   Transcripts append to {}", path.display());
            } else {
                println!("  [fail] Transcript directory for {} is not writable", path.display());
                issues += 1;
            }
        }
        TranscriptBackend::Memory => println!("  [info] Transcripts kept in memory only"),
        TranscriptBackend::Off => println!("  [info] Transcript persistence is off"),
    }

    println!(
        "  [ok]   Limits: {} iterations, {}s tool timeout, circuit opens after {} failures in {}s",
        config.agent.max_iterations,
        config.agent.tool_timeout_secs,
        config.resilience.failure_threshold,
        config.resilience.window_secs
    );

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
        if !config_path.exists() {
            println!("\n--- default config.toml ---\n{}", AppConfig::default_toml());
        }
    }

    Ok(())
}
