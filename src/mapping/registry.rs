//! Mapping registry.
//!
//! The map of id → entry sits behind an `RwLock` that is held only long
//! enough to insert, remove, or snapshot handles. Each entry owns its own
//! mutex, so invocations on different mappings never contend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info};

use super::{
    Curve, Health, Mapping, MappingId, MappingPatch, MappingSummary, Mode, Range, RuntimeState,
    SourceSelector, MIN_SMOOTHING, SMOOTHING_OFF,
};
use crate::expr::{CompileError, Compiler};
use crate::input::SourceKey;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("no mapping with id {0}")]
    NotFound(MappingId),
    #[error("invalid expression: {0}")]
    Compile(#[from] CompileError),
}

/// One registered mapping.
///
/// The selector and tick flag are mirrored outside the mutex so the
/// scheduler can route samples and ticks without locking mappings it will
/// not run.
#[derive(Debug)]
pub struct MappingEntry {
    id: MappingId,
    retired: AtomicBool,
    selector: RwLock<SourceSelector>,
    ticks: AtomicBool,
    write_gate: Mutex<()>,
    cell: Mutex<Mapping>,
}

impl MappingEntry {
    fn new(mapping: Mapping) -> Self {
        Self {
            id: mapping.id,
            retired: AtomicBool::new(false),
            selector: RwLock::new(mapping.source_selector),
            ticks: AtomicBool::new(mapping.wants_tick()),
            write_gate: Mutex::new(()),
            cell: Mutex::new(mapping),
        }
    }

    pub fn id(&self) -> MappingId {
        self.id
    }

    /// Lock the mapping. A poisoned lock is recovered; state stays usable.
    pub fn lock(&self) -> MutexGuard<'_, Mapping> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the mapping listens to `source`. Never takes the mapping lock.
    pub fn matches(&self, source: &SourceKey) -> bool {
        self.selector
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .matches(source)
    }

    /// Whether periodic ticks should run this mapping. Never takes the
    /// mapping lock.
    pub fn wants_tick(&self) -> bool {
        self.ticks.load(Ordering::Acquire)
    }

    /// Refresh the routing mirror. Call with the mapping locked after any
    /// change to its selector, mode, expression or primed state.
    pub(crate) fn sync_routing(&self, mapping: &Mapping) {
        *self.selector.write().unwrap_or_else(PoisonError::into_inner) = mapping.source_selector;
        self.ticks.store(mapping.wants_tick(), Ordering::Release);
    }

    /// Refresh only the tick flag, after an invocation changed primed or
    /// smoothing state.
    pub(crate) fn refresh_ticks(&self, mapping: &Mapping) {
        self.ticks.store(mapping.wants_tick(), Ordering::Release);
    }

    /// Set once the mapping has been deleted. Writes must be dropped.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Held by the runtime from its last retired check through the write.
    pub(crate) fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flag the entry, then wait out a write already past its check.
    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        drop(self.write_gate());
    }
}

/// All live mappings.
#[derive(Debug)]
pub struct Registry {
    entries: RwLock<BTreeMap<MappingId, Arc<MappingEntry>>>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new mapping. The expression is compiled before anything is
    /// stored; a compile error leaves the registry unchanged.
    pub fn create(
        &self,
        source_selector: SourceSelector,
        target_path: &str,
        mode: Mode,
        range: Range,
        expression_source: &str,
    ) -> Result<MappingId, CompileError> {
        let expression = Compiler::compile(expression_source)?;
        let id = self.allocate_id();
        let mapping = Mapping {
            id,
            name: source_selector.to_string(),
            source_selector,
            target_path: target_path.to_string(),
            mode,
            range,
            curve: Curve::default(),
            expression,
            smoothing: SMOOTHING_OFF,
            absolute: false,
            state: RuntimeState::default(),
            health: Health::Healthy,
        };
        self.insert(mapping);
        info!(mapping = %id, target = target_path, %mode, "mapping created");
        Ok(id)
    }

    /// Apply a partial edit.
    ///
    /// A changed expression is compiled first; on error nothing changes.
    /// Any successful update resets runtime state and clears health.
    pub fn update(&self, id: MappingId, patch: MappingPatch) -> Result<(), RegistryError> {
        let entry = self.entry(id).ok_or(RegistryError::NotFound(id))?;
        let expression = patch
            .expression
            .as_deref()
            .map(Compiler::compile)
            .transpose()?;

        let mut mapping = entry.lock();
        if let Some(name) = patch.name {
            mapping.name = name;
        }
        if let Some(selector) = patch.source_selector {
            mapping.source_selector = selector;
        }
        if let Some(path) = patch.target_path {
            mapping.target_path = path;
        }
        if let Some(mode) = patch.mode {
            mapping.mode = mode;
        }
        if let Some(range) = patch.range {
            mapping.range = range;
        }
        if let Some(curve) = patch.curve {
            mapping.curve = curve;
        }
        if let Some(expression) = expression {
            mapping.expression = expression;
        }
        if let Some(speed) = patch.smoothing {
            mapping.smoothing = if speed.is_nan() {
                SMOOTHING_OFF
            } else {
                speed.clamp(MIN_SMOOTHING, SMOOTHING_OFF)
            };
        }
        if let Some(absolute) = patch.absolute {
            mapping.absolute = absolute;
        }
        mapping.reset();
        entry.sync_routing(&mapping);
        debug!(mapping = %id, "mapping updated");
        Ok(())
    }

    /// Remove a mapping. Returns whether it existed.
    ///
    /// Does not wait for an in-flight evaluation; the entry is flagged
    /// retired so that invocation drops its write. Only a write already
    /// under way is waited for, so nothing lands after this returns.
    pub fn delete(&self, id: MappingId) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match removed {
            Some(entry) => {
                entry.retire();
                info!(mapping = %id, "mapping deleted");
                true
            }
            None => false,
        }
    }

    /// Summaries of all mappings in id order.
    pub fn list(&self) -> Vec<MappingSummary> {
        self.handles().iter().map(|e| e.lock().summary()).collect()
    }

    pub fn get(&self, id: MappingId) -> Option<MappingSummary> {
        self.entry(id).map(|e| e.lock().summary())
    }

    /// Copy a mapping's configuration under a new id with fresh state.
    pub fn duplicate(&self, id: MappingId) -> Result<MappingId, RegistryError> {
        let entry = self.entry(id).ok_or(RegistryError::NotFound(id))?;
        let mut copy = entry.lock().clone();
        let new_id = self.allocate_id();
        copy.id = new_id;
        copy.name = format!("{} copy", copy.name);
        copy.reset();
        self.insert(copy);
        info!(mapping = %new_id, from = %id, "mapping duplicated");
        Ok(new_id)
    }

    /// Clear an unresolved flag so the next invocation retries the path.
    ///
    /// Runtime state is kept. Returns whether the mapping was unresolved.
    pub fn reresolve(&self, id: MappingId) -> Result<bool, RegistryError> {
        let entry = self.entry(id).ok_or(RegistryError::NotFound(id))?;
        let mut mapping = entry.lock();
        if mapping.health.is_unresolved() {
            mapping.health = Health::Healthy;
            debug!(mapping = %id, "mapping re-resolving");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Clear the unresolved flag on every mapping.
    pub fn reresolve_all(&self) -> usize {
        self.handles()
            .iter()
            .filter(|e| {
                let mut mapping = e.lock();
                let unresolved = mapping.health.is_unresolved();
                if unresolved {
                    mapping.health = Health::Healthy;
                }
                unresolved
            })
            .count()
    }

    pub fn entry(&self, id: MappingId) -> Option<Arc<MappingEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of every entry in ascending id order.
    pub fn handles(&self) -> Vec<Arc<MappingEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Entries whose selector matches `source`, in ascending id order.
    pub fn matching(&self, source: &SourceKey) -> Vec<Arc<MappingEntry>> {
        self.handles()
            .into_iter()
            .filter(|e| e.matches(source))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn allocate_id(&self) -> MappingId {
        MappingId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn insert(&self, mapping: Mapping) {
        let id = mapping.id;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(MappingEntry::new(mapping)));
    }
}
