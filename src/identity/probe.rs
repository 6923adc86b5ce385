//! Probes for the current execution environment
//!
//! The store only consumes the [`EnvironmentProbe`] trait; how the facts
//! are collected is the caller's concern. [`SystemProbe`] is the default
//! host-backed implementation (Linux /proc plus `gethostname`), with the
//! package inventory supplied by the caller since only the test harness
//! knows which dependency set it runs under. [`StaticProbe`] returns
//! canned descriptors and exists for tests and harness fixtures.

use super::{MachineIdentity, PackageSpec, SoftwareIdentity};
use crate::error::{Result, StoreError};
use std::collections::BTreeMap;
use std::fs;

/// Source of the current machine and software descriptors
///
/// Probe failures are fatal to store construction: without a resolved
/// environment there is nothing to key reference records by.
pub trait EnvironmentProbe {
    /// Snapshot the hardware dimension of the current host
    fn machine(&self) -> Result<MachineIdentity>;

    /// Snapshot the software dimension of the current process
    fn software(&self) -> Result<SoftwareIdentity>;
}

/// Host-backed probe: hardware facts from the OS, software facts supplied
/// at construction
#[derive(Debug, Clone)]
pub struct SystemProbe {
    runtime: String,
    packages: Vec<PackageSpec>,
}

impl SystemProbe {
    /// `runtime` is the interpreter/toolchain version string the harness
    /// runs under; `packages` its installed dependency inventory.
    pub fn new(runtime: impl Into<String>, packages: Vec<PackageSpec>) -> Self {
        Self {
            runtime: runtime.into(),
            packages,
        }
    }
}

impl EnvironmentProbe for SystemProbe {
    fn machine(&self) -> Result<MachineIdentity> {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "arch".to_string(),
            serde_json::json!(std::env::consts::ARCH),
        );
        attributes.insert("os".to_string(), serde_json::json!(std::env::consts::OS));

        let host = nix::unistd::gethostname()
            .map_err(|e| StoreError::IdentityProbe(format!("gethostname failed: {e}")))?;
        attributes.insert(
            "host".to_string(),
            serde_json::json!(host.to_string_lossy()),
        );

        let cpu_count = std::thread::available_parallelism()
            .map_err(|e| StoreError::IdentityProbe(format!("cpu count unavailable: {e}")))?;
        attributes.insert("cpu_count".to_string(), serde_json::json!(cpu_count.get()));

        attributes.insert(
            "cpu_model".to_string(),
            serde_json::json!(read_proc_field("/proc/cpuinfo", "model name")?),
        );
        let memory_kb: u64 = read_proc_field("/proc/meminfo", "MemTotal")?
            .split_whitespace()
            .next()
            .unwrap_or("")
            .parse()
            .map_err(|e| {
                StoreError::IdentityProbe(format!("unparseable MemTotal in /proc/meminfo: {e}"))
            })?;
        attributes.insert("memory_total_kb".to_string(), serde_json::json!(memory_kb));

        Ok(MachineIdentity::new(attributes))
    }

    fn software(&self) -> Result<SoftwareIdentity> {
        Ok(SoftwareIdentity::new(
            self.runtime.clone(),
            self.packages.clone(),
        ))
    }
}

/// First value for `key` in a `key : value`-per-line /proc file
fn read_proc_field(path: &str, key: &str) -> Result<String> {
    let text = fs::read_to_string(path)
        .map_err(|e| StoreError::IdentityProbe(format!("cannot read {path}: {e}")))?;
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim().to_string())
        .ok_or_else(|| StoreError::IdentityProbe(format!("no '{key}' entry in {path}")))
}

/// Probe returning fixed descriptors; for tests and reproducible fixtures
#[derive(Debug, Clone)]
pub struct StaticProbe {
    pub machine_attributes: BTreeMap<String, serde_json::Value>,
    pub runtime: String,
    pub packages: Vec<PackageSpec>,
}

impl StaticProbe {
    pub fn new(
        machine_attributes: BTreeMap<String, serde_json::Value>,
        runtime: impl Into<String>,
        packages: Vec<PackageSpec>,
    ) -> Self {
        Self {
            machine_attributes,
            runtime: runtime.into(),
            packages,
        }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn machine(&self) -> Result<MachineIdentity> {
        Ok(MachineIdentity::new(self.machine_attributes.clone()))
    }

    fn software(&self) -> Result<SoftwareIdentity> {
        Ok(SoftwareIdentity::new(
            self.runtime.clone(),
            self.packages.clone(),
        ))
    }
}
