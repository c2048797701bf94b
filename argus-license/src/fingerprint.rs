//! Hardware fingerprinting for license binding.
//!
//! Produces a stable opaque identifier for this host by hashing
//! hardware identifiers that survive reboots. The license record is
//! bound to this fingerprint at activation; a mismatch at validation
//! time is terminal for the cached license.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;

/// Source of the current hardware identifier.
///
/// The default implementation is [`DeviceFingerprint`]; tests inject a
/// [`FixedFingerprint`].
pub trait FingerprintProvider: Send + Sync {
    /// Returns the current hardware fingerprint.
    fn fingerprint(&self) -> String;
}

/// A stable fingerprint derived from this machine's hardware identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    id: String,
}

impl DeviceFingerprint {
    /// Generates the fingerprint for the current host.
    ///
    /// Combines OS, architecture, hostname, machine ID and CPU count,
    /// then hashes them. Survives reboots; changes if the hardware
    /// changes significantly.
    #[must_use]
    pub fn generate() -> Self {
        let mut components = vec![
            env::consts::OS.to_string(),
            env::consts::ARCH.to_string(),
            get_hostname(),
            cpu_count().to_string(),
        ];
        if let Some(machine_id) = get_machine_id() {
            components.push(machine_id);
        }

        let mut hasher = Sha256::new();
        hasher.update(components.join("|").as_bytes());
        let id = hex::encode(hasher.finalize());

        Self { id }
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FingerprintProvider for DeviceFingerprint {
    fn fingerprint(&self) -> String {
        self.id.clone()
    }
}

/// A fingerprint provider that always returns a fixed value. Test aid.
#[derive(Debug, Clone)]
pub struct FixedFingerprint(pub String);

impl FingerprintProvider for FixedFingerprint {
    fn fingerprint(&self) -> String {
        self.0.clone()
    }
}

/// System information reported alongside heartbeat validations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Operating system name.
    pub os_name: String,
    /// CPU architecture.
    pub arch: String,
    /// Hostname.
    pub hostname: String,
    /// Logical CPU count.
    pub cpu_count: usize,
}

impl SystemInfo {
    /// Collects information about the current host.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            hostname: get_hostname(),
            cpu_count: cpu_count(),
        }
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Gets the machine ID (platform-specific stable identifier).
fn get_machine_id() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/etc/machine-id")
            .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("ioreg")
            .args(["-rd1", "-c", "IOPlatformExpertDevice"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .and_then(|output| {
                output
                    .lines()
                    .find(|l| l.contains("IOPlatformUUID"))
                    .and_then(|l| l.split('"').nth(3))
                    .map(String::from)
            })
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
