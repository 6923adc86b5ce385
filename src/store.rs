//! The reference store
//!
//! Orchestrates the identity registries and the reference collection:
//! resolves "this environment" once at construction, answers exact and
//! approximate reference lookups, ranks observed runtimes, and persists
//! the three collections under one root directory.
//!
//! A store owns its in-memory collections exclusively for its lifetime.
//! It is not designed for concurrent calls from multiple threads; wrap
//! the instance in a mutex if the harness is threaded. Cross-process
//! sharing of one root is the supported concurrency model: each process
//! loads its own snapshot and the write path takes an advisory lock.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::identity::{
    ConfigId, EnvironmentProbe, IdentityRegistry, MachineIdentity, SoftwareIdentity,
};
use crate::model::ModelFamily;
use crate::persist::{
    ensure_root, load_records, write_records, StoreLock, MACHINE_CONFIGS_FILE, REFERENCES_FILE,
    SOFTWARE_CONFIGS_FILE,
};
use crate::reference::{Reference, ReferenceKey};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment-identity-aware store of runtime reference records
pub struct Store {
    root: PathBuf,
    config: StoreConfig,
    machines: IdentityRegistry<MachineIdentity>,
    software: IdentityRegistry<SoftwareIdentity>,
    references: Vec<Reference>,
    this_machine: ConfigId,
    this_software: ConfigId,
    /// Set when a reference was created or replaced since load; gates
    /// whether a write-back is worth doing.
    dirty: bool,
}

impl Store {
    /// Open (or initialize) the store at `root` with default configuration
    pub fn open(root: impl Into<PathBuf>, probe: &dyn EnvironmentProbe) -> Result<Self> {
        Self::open_with_config(root, probe, StoreConfig::default())
    }

    /// Open (or initialize) the store at `root`
    ///
    /// Loads the three documents (treating missing files as empty),
    /// probes the current environment, and resolves it through the
    /// registries, inserting new identity descriptors as needed. The
    /// insertion mutates in-memory state only; nothing is written back
    /// until [`write`](Self::write).
    ///
    /// Loading takes no lock: a load concurrent with another process's
    /// in-flight write may observe a partially updated file set. Callers
    /// needing strict consistency must avoid overlapping load/write
    /// windows externally.
    pub fn open_with_config(
        root: impl Into<PathBuf>,
        probe: &dyn EnvironmentProbe,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let root = root.into();
        ensure_root(&root)?;

        let machines = IdentityRegistry::from_entries(load_records(
            &root.join(MACHINE_CONFIGS_FILE),
            "machine configs",
        )?);
        let software = IdentityRegistry::from_entries(load_records(
            &root.join(SOFTWARE_CONFIGS_FILE),
            "software configs",
        )?);
        let references: Vec<Reference> =
            load_records(&root.join(REFERENCES_FILE), "references")?;

        let mut store = Self {
            root,
            config,
            machines,
            software,
            references,
            this_machine: ConfigId::from(""),
            this_software: ConfigId::from(""),
            dirty: false,
        };
        store.this_machine = store.machines.resolve(probe.machine()?);
        store.this_software = store.software.resolve(probe.software()?);
        debug!(
            root = %store.root.display(),
            machine = %store.this_machine,
            software = %store.this_software,
            references = store.references.len(),
            "opened reference store"
        );
        Ok(store)
    }

    /// Identity id resolved for the current machine
    pub fn this_machine(&self) -> &ConfigId {
        &self.this_machine
    }

    /// Identity id resolved for the current software stack
    pub fn this_software(&self) -> &ConfigId {
        &self.this_software
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn machine_configs(&self) -> &[MachineIdentity] {
        self.machines.entries()
    }

    pub fn software_configs(&self) -> &[SoftwareIdentity] {
        self.software.entries()
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Whether a reference was created or replaced since load
    pub fn created_new_reference(&self) -> bool {
        self.dirty
    }

    /// Key for `workload_id` under the current environment
    fn key_for(&self, workload_id: &str) -> ReferenceKey {
        ReferenceKey {
            machine_id: self.this_machine.clone(),
            software_id: self.this_software.clone(),
            workload_id: workload_id.to_string(),
        }
    }

    fn current_software(&self) -> Result<&SoftwareIdentity> {
        self.software.find_by_id(&self.this_software).ok_or_else(|| {
            StoreError::InvalidState(
                "resolved software identity missing from registry".to_string(),
            )
        })
    }

    /// Find the reference whose key exactly matches the current
    /// environment and `workload_id`
    ///
    /// At most one such record may exist; finding more is a
    /// `ConsistencyError` (a hand-edited store or a bug in insert logic),
    /// not a user error.
    pub fn find_exact(&self, workload_id: &str) -> Result<Option<&Reference>> {
        let key = self.key_for(workload_id);
        let mut matches = self.references.iter().filter(|r| r.key == key);
        let first = matches.next();
        let extra = matches.count();
        if extra > 0 {
            return Err(StoreError::Consistency {
                key: key.to_string(),
                count: extra + 1,
            });
        }
        Ok(first)
    }

    /// Find the closest reference for `workload_id` under relaxed
    /// environment matching
    ///
    /// Candidates share the workload id, plus the current machine
    /// identity if `match_machine` and the current software identity if
    /// `match_software`. Among them, the record whose software identity
    /// has the largest installed-package intersection (exact name+version
    /// pairs) with the current software descriptor wins.
    ///
    /// Ties break by insertion order: the first record found wins. That
    /// is a deliberate, deterministic rule kept for compatibility, not a
    /// guarantee of best selection.
    pub fn find_approximate(
        &self,
        workload_id: &str,
        match_machine: bool,
        match_software: bool,
    ) -> Result<Option<&Reference>> {
        let current = self.current_software()?;
        let mut best: Option<(&Reference, usize)> = None;
        for reference in &self.references {
            if reference.key.workload_id != workload_id {
                continue;
            }
            if match_machine && reference.key.machine_id != self.this_machine {
                continue;
            }
            if match_software && reference.key.software_id != self.this_software {
                continue;
            }
            let overlap = match self.software.find_by_id(&reference.key.software_id) {
                Some(identity) => identity.package_overlap(current),
                None => {
                    // A reference may name a software id written by another
                    // process whose config document we have not seen.
                    warn!(key = %reference.key, "reference names an unknown software identity");
                    0
                }
            };
            if best.map_or(true, |(_, so_far)| overlap > so_far) {
                best = Some((reference, overlap));
            }
        }
        Ok(best.map(|(reference, _)| reference))
    }

    /// Two-tier reference lookup: exact if present, otherwise approximate
    /// with machine matched and software relaxed
    ///
    /// Software environments drift far more often than hardware, so a
    /// same-machine/different-stack baseline is informative but flagged
    /// inexact (`false` in the returned pair).
    pub fn reference_model(&self, workload_id: &str) -> Result<Option<(bool, &Reference)>> {
        if let Some(reference) = self.find_exact(workload_id)? {
            return Ok(Some((true, reference)));
        }
        Ok(self
            .find_approximate(workload_id, true, false)?
            .map(|reference| (false, reference)))
    }

    /// Whether a reference exists for `workload_id` under the exact
    /// current environment
    pub fn reference_exists(&self, workload_id: &str) -> Result<bool> {
        Ok(self.find_exact(workload_id)?.is_some())
    }

    /// Rank an observed runtime against the resolved reference model
    ///
    /// Returns `(exact, rank)` with the rank in [0, 1], or `None` when no
    /// reference matches even approximately. The rank is the fraction of
    /// the reference population expected to run faster.
    pub fn rank_runtime(&self, workload_id: &str, runtime: f64) -> Result<Option<(bool, f64)>> {
        match self.reference_model(workload_id)? {
            Some((exact, reference)) => Ok(Some((exact, reference.rank(runtime)?))),
            None => Ok(None),
        }
    }

    /// Create or replace the reference for `workload_id` under the exact
    /// current environment
    ///
    /// Fits a model of `family` (the configured default if `None`) over
    /// `samples`, then overwrites the existing exact-match record or
    /// appends a new one. Approximate matches are never overwritten, so
    /// baselines recorded under other environments survive. Returns
    /// whether an existing record was replaced, plus the new record.
    ///
    /// On fit failure nothing changes, in memory or on disk.
    pub fn create_reference(
        &mut self,
        workload_id: &str,
        samples: Vec<f64>,
        family: Option<ModelFamily>,
    ) -> Result<(bool, &Reference)> {
        let family = family.unwrap_or(self.config.default_family);
        let key = self.key_for(workload_id);
        let reference = Reference::from_samples(key, samples, family)?;

        // Enforces exact-match uniqueness before touching the collection.
        self.find_exact(workload_id)?;
        let existing = self.references.iter().position(|r| r.key == reference.key);
        let index = match existing {
            Some(index) => {
                debug!(key = %reference.key, "replacing existing reference");
                self.references[index] = reference;
                index
            }
            None => {
                debug!(key = %reference.key, "creating new reference");
                self.references.push(reference);
                self.references.len() - 1
            }
        };
        self.dirty = true;
        Ok((existing.is_some(), &self.references[index]))
    }

    /// Persist the three collections under the store root
    ///
    /// Takes the advisory lock for the duration of the pass (bounded by
    /// the configured timeout), then writes each document to a temporary
    /// file and renames it into place. The three renames are not one
    /// atomic transaction: a crash between them can leave the documents
    /// mutually inconsistent. Known limitation; loaders tolerate records
    /// that name unknown identity ids.
    pub fn write(&self) -> Result<()> {
        ensure_root(&self.root)?;
        let _lock = StoreLock::acquire(&self.root, self.config.lock_timeout, self.config.lock_poll)?;
        write_records(&self.root, MACHINE_CONFIGS_FILE, self.machines.entries())?;
        write_records(&self.root, SOFTWARE_CONFIGS_FILE, self.software.entries())?;
        write_records(&self.root, REFERENCES_FILE, &self.references)?;
        debug!(root = %self.root.display(), "wrote reference store");
        Ok(())
    }
}
