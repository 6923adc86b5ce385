//! Environment identity descriptors
//!
//! Two descriptor variants capture the dimensions of an execution
//! environment: the machine (hardware facts) and the software stack
//! (runtime version plus installed packages). Each carries a stable
//! random [`ConfigId`] assigned on first sight and never recomputed.
//!
//! Matching rules are explicitly named functions
//! ([`MachineIdentity::same_hardware_profile`],
//! [`SoftwareIdentity::same_software_profile`]) rather than `PartialEq`
//! overloads, so the business rules stay auditable: a descriptor may
//! carry facts that identify an environment (hostname, MAC address,
//! package install location) without participating in the match.

mod probe;
mod registry;

pub use probe::{EnvironmentProbe, StaticProbe, SystemProbe};
pub use registry::{IdentityDescriptor, IdentityRegistry};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Machine facts recorded for identification only, skipped by
/// [`MachineIdentity::same_hardware_profile`]: the same hardware config
/// may run under a different hostname or NIC.
const IDENTIFYING_ONLY_KEYS: &[&str] = &["host", "mac_address"];

/// Opaque stable identifier for a descriptor: 16 random bytes, hex-encoded
///
/// Generated once per new descriptor; equal descriptors adopt the
/// already-registered id instead of generating a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigId(String);

impl ConfigId {
    /// Generate a new cryptographically random id
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Clipped 7-character prefix for table display
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(7)]
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConfigId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Snapshot of the hardware dimension of an environment
///
/// Attributes are an ordered mapping of named facts (cpu model, core
/// count, total memory, architecture, ...) that the store treats as
/// opaque beyond equality. The `host` and `mac_address` keys are
/// persisted but excluded from profile matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub id: ConfigId,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl MachineIdentity {
    /// Wrap freshly probed facts in a descriptor with a new id
    pub fn new(attributes: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            id: ConfigId::generate(),
            attributes,
        }
    }

    /// Whether two descriptors describe the same hardware configuration
    ///
    /// Compares all attributes except the identifying-only keys.
    pub fn same_hardware_profile(&self, other: &Self) -> bool {
        fn comparable(m: &MachineIdentity) -> BTreeMap<&String, &serde_json::Value> {
            m.attributes
                .iter()
                .filter(|(k, _)| !IDENTIFYING_ONLY_KEYS.contains(&k.as_str()))
                .collect()
        }
        comparable(self) == comparable(other)
    }
}

/// One installed package: name, version, and optional install location
///
/// Two packages [`match`](PackageSpec::matches) on name and version;
/// the location is recorded for auditing but never compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            location: None,
        }
    }

    /// Exact name+version pair match
    pub fn matches(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

/// Software-stack attributes: runtime version and installed packages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareAttributes {
    /// Interpreter/runtime version string (toolchain release, etc.)
    pub runtime: String,
    pub packages: Vec<PackageSpec>,
}

/// Snapshot of the software dimension of an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftwareIdentity {
    pub id: ConfigId,
    pub attributes: SoftwareAttributes,
}

impl SoftwareIdentity {
    /// Wrap a probed software stack in a descriptor with a new id
    pub fn new(runtime: impl Into<String>, packages: Vec<PackageSpec>) -> Self {
        Self {
            id: ConfigId::generate(),
            attributes: SoftwareAttributes {
                runtime: runtime.into(),
                packages,
            },
        }
    }

    fn package_set(&self) -> BTreeSet<(&str, &str)> {
        self.attributes
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.version.as_str()))
            .collect()
    }

    /// Whether two descriptors describe the same software stack
    ///
    /// Runtime versions must be equal and the installed package sets must
    /// match as name+version pairs. Package order and install locations
    /// are irrelevant.
    pub fn same_software_profile(&self, other: &Self) -> bool {
        self.attributes.runtime == other.attributes.runtime
            && self.package_set() == other.package_set()
    }

    /// Size of the name+version package intersection with `other`
    ///
    /// The similarity heuristic behind approximate reference matching.
    pub fn package_overlap(&self, other: &Self) -> usize {
        self.package_set()
            .intersection(&other.package_set())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_attrs() -> BTreeMap<String, serde_json::Value> {
        let mut attrs = BTreeMap::new();
        attrs.insert("arch".to_string(), serde_json::json!("x86_64"));
        attrs.insert("cpu_count".to_string(), serde_json::json!(8));
        attrs.insert("cpu_model".to_string(), serde_json::json!("Example CPU"));
        attrs.insert("host".to_string(), serde_json::json!("ci-worker-01"));
        attrs.insert("mac_address".to_string(), serde_json::json!("aa:bb:cc"));
        attrs.insert("memory_total_kb".to_string(), serde_json::json!(16_000_000));
        attrs
    }

    #[test]
    fn test_config_id_generation_is_unique_hex() {
        let a = ConfigId::generate();
        let b = ConfigId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.short().len(), 7);
    }

    #[test]
    fn test_hardware_profile_ignores_identifying_keys() {
        let a = MachineIdentity::new(machine_attrs());
        let mut attrs = machine_attrs();
        attrs.insert("host".to_string(), serde_json::json!("ci-worker-02"));
        attrs.insert("mac_address".to_string(), serde_json::json!("dd:ee:ff"));
        let b = MachineIdentity::new(attrs);
        assert!(a.same_hardware_profile(&b));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_hardware_profile_detects_real_differences() {
        let a = MachineIdentity::new(machine_attrs());
        let mut attrs = machine_attrs();
        attrs.insert("cpu_count".to_string(), serde_json::json!(16));
        let b = MachineIdentity::new(attrs);
        assert!(!a.same_hardware_profile(&b));
    }

    #[test]
    fn test_package_match_ignores_location() {
        let mut a = PackageSpec::new("serde", "1.0.200");
        a.location = Some("/opt/registry".to_string());
        let b = PackageSpec::new("serde", "1.0.200");
        assert!(a.matches(&b));
        assert!(!a.matches(&PackageSpec::new("serde", "1.0.100")));
    }

    #[test]
    fn test_software_profile_is_order_insensitive() {
        let a = SoftwareIdentity::new(
            "1.80.0",
            vec![PackageSpec::new("serde", "1.0"), PackageSpec::new("rand", "0.8")],
        );
        let b = SoftwareIdentity::new(
            "1.80.0",
            vec![PackageSpec::new("rand", "0.8"), PackageSpec::new("serde", "1.0")],
        );
        assert!(a.same_software_profile(&b));
    }

    #[test]
    fn test_software_profile_differs_on_version_drift() {
        let a = SoftwareIdentity::new("1.80.0", vec![PackageSpec::new("serde", "1.0")]);
        let b = SoftwareIdentity::new("1.80.0", vec![PackageSpec::new("serde", "1.1")]);
        let c = SoftwareIdentity::new("1.81.0", vec![PackageSpec::new("serde", "1.0")]);
        assert!(!a.same_software_profile(&b));
        assert!(!a.same_software_profile(&c));
    }

    #[test]
    fn test_package_overlap_counts_exact_pairs() {
        let a = SoftwareIdentity::new(
            "1.80.0",
            vec![
                PackageSpec::new("serde", "1.0"),
                PackageSpec::new("rand", "0.8"),
                PackageSpec::new("hex", "0.4"),
            ],
        );
        let b = SoftwareIdentity::new(
            "1.80.0",
            vec![
                PackageSpec::new("serde", "1.0"),
                PackageSpec::new("rand", "0.7"),
                PackageSpec::new("hex", "0.4"),
            ],
        );
        assert_eq!(a.package_overlap(&b), 2);
    }

    #[test]
    fn test_descriptor_serialization_round_trip() {
        let machine = MachineIdentity::new(machine_attrs());
        let text = serde_json::to_string(&machine).unwrap();
        let loaded: MachineIdentity = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, machine);

        let software = SoftwareIdentity::new("1.80.0", vec![PackageSpec::new("serde", "1.0")]);
        let text = serde_json::to_string(&software).unwrap();
        let loaded: SoftwareIdentity = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded, software);
    }
}
