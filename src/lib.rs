//! Remarca - environment-identity-aware runtime reference store
//!
//! Records how long named workloads take to run on a given execution
//! environment, fits a probabilistic model to each runtime distribution,
//! and later answers "is a new observed runtime typical?" by ranking it
//! against the stored model. Multiple machines and software stacks can
//! share one on-disk store root: environments are fingerprinted and
//! deduplicated, lookups fall back from exact to approximate environment
//! matches, and writes are atomic per document under an advisory lock.
//!
//! # Example
//!
//! ```no_run
//! use remarca::{ModelFamily, PackageSpec, Store, SystemProbe};
//!
//! # fn main() -> remarca::Result<()> {
//! let probe = SystemProbe::new("1.80.0", vec![PackageSpec::new("serde", "1.0.200")]);
//! let mut store = Store::open(".remarca", &probe)?;
//!
//! // Baseline a workload from measured runtimes, then rank a fresh run.
//! store.create_reference(
//!     "suite::case_a",
//!     vec![0.1, 0.12, 0.11, 0.13],
//!     Some(ModelFamily::Gamma),
//! )?;
//! if let Some((exact, rank)) = store.rank_runtime("suite::case_a", 0.115)? {
//!     println!("exact={exact} rank={rank:.3}");
//! }
//! store.write()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod persist;
pub mod reference;
pub mod report;
pub mod store;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use identity::{
    ConfigId, EnvironmentProbe, IdentityRegistry, MachineIdentity, PackageSpec, SoftwareIdentity,
    StaticProbe, SystemProbe,
};
pub use model::{ModelFamily, ProbModel};
pub use reference::{Reference, ReferenceKey};
pub use report::{render_report, ReferenceSummary, ResultRecord};
pub use store::Store;
