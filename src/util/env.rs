//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        if dotenv::dotenv().is_err() {
            // Fallback to the crate root so `cargo run` from a subdirectory still works
            let candidate = format!("{}/.env", env!("CARGO_MANIFEST_DIR"));
            let _ = dotenv::from_filename(candidate);
        }
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    env_opt(key).ok_or_else(|| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback. Unparseable values fall back too,
/// with a warning.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target = "env", key, value = %raw, "unparseable value; using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// CLI value if given, else the env var, else `default`.
pub fn resolve<T>(cli: Option<T>, key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    match cli {
        Some(v) => v,
        None => env_parse(key, default),
    }
}

fn redact_value(key: &str, val: &str) -> String {
    let k = key.to_ascii_uppercase();
    if k.contains("PASSWORD")
        || k.contains("SECRET")
        || k.contains("KEY")
        || k.contains("TOKEN")
    {
        return if val.is_empty() { String::new() } else { "***".to_string() };
    }
    val.trim().to_string()
}

/// Validate required keys and log a consolidated, redacted snapshot of configuration.
/// Returns error if any required key is missing.
pub fn preflight_check(title: &str, required: &[&str], also_log: &[&str]) -> anyhow::Result<()> {
    init_env();
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|k| env_opt(k).is_none())
        .collect();
    let snapshot: Vec<(String, String)> = required
        .iter()
        .chain(also_log)
        .map(|&k| (k.to_string(), redact_value(k, &env_opt(k).unwrap_or_default())))
        .collect();
    info!(target = "preflight", title, snapshot = ?snapshot, "configuration snapshot");
    if !missing.is_empty() {
        return Err(anyhow::anyhow!("missing required env: {:?}", missing));
    }
    Ok(())
}
