//! `ironloop keys`: list the rotation pool without revealing secrets.

use ironloop_config::AppConfig;
use ironloop_providers::keys::suffix;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let keys = super::api_keys(&config);
    let prefix = config.provider.env_prefix.trim_end_matches('_').to_uppercase();

    println!("  Provider: {} ({})", config.provider.name, config.provider.base_url);
    if keys.is_empty() {
        println!("  No keys found. Set {prefix}_API_KEY_1, {prefix}_API_KEY_2, ... or {prefix}_API_KEY.");
        return Ok(());
    }
    println!("  {} key(s) in the rotation pool:", keys.len());
    for line in key_lines(&keys) {
        println!("{line}");
    }
    Ok(())
}

fn key_lines(keys: &[String]) -> Vec<String> {
    keys.iter()
        .enumerate()
        .map(|(i, k)| format!("    {}. {}", i + 1, suffix(k)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_masked() {
        let lines = key_lines(&["sk-or-v1-secret-1111".into(), "sk-or-v1-secret-2222".into()]);
        assert_eq!(lines, vec!["    1. ...1111", "    2. ...2222"]);
        assert!(lines.iter().all(|l| !l.contains("secret")));
    }
}
