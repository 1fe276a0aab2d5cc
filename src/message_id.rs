//! Message-Id generation.
//!
//! Ids have the form `<nanotime.pid.random@hostname>`.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;

static HOSTNAME: Lazy<String> = Lazy::new(lookup_hostname);

/// Generates a fresh Message-Id, angle brackets included.
///
/// Fails with [`Error::IdGeneration`] if the system random source is
/// unavailable.
///
/// # Examples
///
/// ```
/// let id = tokio_email::message_id::generate().unwrap();
/// assert!(id.starts_with('<') && id.ends_with('>'));
/// assert!(id.contains('@'));
/// ```
pub fn generate() -> Result<String> {
    generate_with(random_u63, unix_nanos, std::process::id(), hostname())
}

/// Builds a Message-Id from injected parts.
///
/// `random` is only called once and its failure is returned unchanged.
pub fn generate_with(
    random: impl FnOnce() -> Result<u64>,
    clock: impl FnOnce() -> i64,
    pid: u32,
    hostname: &str,
) -> Result<String> {
    let random = random()?;
    let nanos = clock();
    let hostname = if hostname.is_empty() {
        "localhost"
    } else {
        hostname
    };
    Ok(format!("<{nanos}.{pid}.{random}@{hostname}>"))
}

/// Returns a cryptographically random non-negative 63-bit integer.
pub fn random_u63() -> Result<u64> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::IdGeneration(e.to_string()))?;
    Ok(u64::from_le_bytes(bytes) & i64::MAX as u64)
}

/// Current UTC time in nanoseconds since the Unix epoch.
pub fn unix_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// The local hostname, looked up once; `localhost` if unavailable.
pub fn hostname() -> &'static str {
    &HOSTNAME
}

#[cfg(unix)]
fn lookup_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn lookup_hostname() -> String {
    std::env::var("COMPUTERNAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
