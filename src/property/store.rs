//! In-memory property host.
//!
//! A flat table of typed properties keyed by canonical path. It stands in
//! for the host application in the CLI and in tests: writes are coerced to
//! the property's type (bools threshold at 0.5, ints round half to even)
//! and clamped to its hard range.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::path::PropertyPath;
use super::{ResolutionError, Resolver, Slot, SlotMeta, ValueKind, WriteError};

/// A stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Array(Vec<f64>),
}

/// A property plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub value: PropertyValue,
    #[serde(default)]
    pub range: Option<(f64, f64)>,
    #[serde(default)]
    pub read_only: bool,
}

impl Property {
    pub fn float(v: f64) -> Self {
        Self::new(PropertyValue::Float(v))
    }

    pub fn int(v: i64) -> Self {
        Self::new(PropertyValue::Int(v))
    }

    pub fn boolean(v: bool) -> Self {
        Self::new(PropertyValue::Bool(v))
    }

    pub fn array(values: Vec<f64>) -> Self {
        Self::new(PropertyValue::Array(values))
    }

    pub fn with_range(mut self, lo: f64, hi: f64) -> Self {
        self.range = Some((lo.min(hi), lo.max(hi)));
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn new(value: PropertyValue) -> Self {
        Self {
            value,
            range: None,
            read_only: false,
        }
    }
}

/// A successful write, recorded when history is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub path: String,
    pub value: f64,
}

#[derive(Debug, Default)]
struct Inner {
    props: BTreeMap<PropertyPath, Property>,
    history: Option<Vec<WriteRecord>>,
}

/// Thread-safe property table implementing [`Resolver`].
#[derive(Debug, Default)]
pub struct PropertyStore {
    inner: Mutex<Inner>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that records every successful write.
    pub fn with_history() -> Self {
        Self {
            inner: Mutex::new(Inner {
                props: BTreeMap::new(),
                history: Some(Vec::new()),
            }),
        }
    }

    /// Add or replace a property.
    pub fn insert(&self, path: &str, property: Property) -> Result<(), ResolutionError> {
        let key = parse(path)?;
        self.lock().props.insert(key, property);
        Ok(())
    }

    /// Remove every property at or below `prefix`, the way deleting a host
    /// object invalidates all paths through it. Returns how many went.
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize, ResolutionError> {
        let prefix = parse(prefix)?;
        let mut inner = self.lock();
        let before = inner.props.len();
        inner.props.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - inner.props.len();
        debug!(prefix = %prefix, removed, "properties removed");
        Ok(removed)
    }

    /// Read the scalar (or array component) at `path`.
    pub fn value(&self, path: &str) -> Result<f64, ResolutionError> {
        Ok(self.resolve(path)?.get())
    }

    /// Copy of every property, in path order.
    pub fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        self.lock()
            .props
            .iter()
            .map(|(k, p)| (k.to_string(), p.value.clone()))
            .collect()
    }

    /// Writes recorded so far; empty unless built with [`Self::with_history`].
    pub fn history(&self) -> Vec<WriteRecord> {
        self.lock().history.clone().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().props.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Resolver for PropertyStore {
    fn resolve(&self, path: &str) -> Result<Box<dyn Slot + '_>, ResolutionError> {
        let (key, component) = parse(path)?.split_component();
        let guard = self.lock();

        let property = guard
            .props
            .get(&key)
            .ok_or_else(|| ResolutionError::NotFound(path.to_string()))?;

        match (&property.value, component) {
            (PropertyValue::Array(_), None) => {
                return Err(ResolutionError::NotScalar(path.to_string()));
            }
            (PropertyValue::Array(values), Some(index)) if index >= values.len() => {
                return Err(ResolutionError::IndexOutOfRange {
                    path: key.to_string(),
                    index,
                    len: values.len(),
                });
            }
            (PropertyValue::Array(_), Some(_)) => {}
            (_, Some(_)) => return Err(ResolutionError::NotIndexable(key.to_string())),
            (_, None) => {}
        }

        Ok(Box::new(StoreSlot {
            guard,
            key,
            component,
            path: path.to_string(),
        }))
    }
}

fn parse(path: &str) -> Result<PropertyPath, ResolutionError> {
    PropertyPath::parse(path).map_err(|e| ResolutionError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// A resolved property. Holds the store lock, so a get/set pair within one
/// invocation cannot interleave with another writer.
struct StoreSlot<'a> {
    guard: MutexGuard<'a, Inner>,
    key: PropertyPath,
    component: Option<usize>,
    path: String,
}

impl StoreSlot<'_> {
    fn property(&self) -> Option<&Property> {
        self.guard.props.get(&self.key)
    }
}

impl Slot for StoreSlot<'_> {
    fn get(&self) -> f64 {
        // Present: the lock has been held since resolve checked it.
        match self.property().map(|p| &p.value) {
            Some(PropertyValue::Float(v)) => *v,
            Some(PropertyValue::Int(v)) => *v as f64,
            Some(PropertyValue::Bool(v)) => f64::from(u8::from(*v)),
            Some(PropertyValue::Array(values)) => self
                .component
                .and_then(|i| values.get(i).copied())
                .unwrap_or_default(),
            None => 0.0,
        }
    }

    fn set(&mut self, value: f64) -> Result<(), WriteError> {
        if value.is_nan() {
            return Err(WriteError::Rejected {
                path: self.path.clone(),
                value,
            });
        }

        let component = self.component;
        let inner = &mut *self.guard;
        let Some(property) = inner.props.get_mut(&self.key) else {
            return Err(WriteError::Rejected {
                path: self.path.clone(),
                value,
            });
        };
        if property.read_only {
            return Err(WriteError::ReadOnly(self.path.clone()));
        }

        let range = property.range;
        let clamp = |v: f64| match range {
            Some((lo, hi)) => v.clamp(lo.min(hi), lo.max(hi)),
            None => v,
        };

        let stored = match &mut property.value {
            PropertyValue::Float(v) => {
                *v = clamp(value);
                *v
            }
            PropertyValue::Int(v) => {
                *v = clamp(value.round_ties_even()) as i64;
                *v as f64
            }
            PropertyValue::Bool(v) => {
                *v = value >= 0.5;
                f64::from(u8::from(*v))
            }
            PropertyValue::Array(values) => {
                let Some(slot) = component.and_then(|i| values.get_mut(i)) else {
                    return Err(WriteError::Rejected {
                        path: self.path.clone(),
                        value,
                    });
                };
                *slot = clamp(value);
                *slot
            }
        };

        if let Some(history) = inner.history.as_mut() {
            history.push(WriteRecord {
                path: self.path.clone(),
                value: stored,
            });
        }
        Ok(())
    }

    fn meta(&self) -> SlotMeta {
        let (kind, range) = match self.property() {
            Some(p) => (
                match p.value {
                    PropertyValue::Int(_) => ValueKind::Int,
                    PropertyValue::Bool(_) => ValueKind::Bool,
                    PropertyValue::Float(_) | PropertyValue::Array(_) => ValueKind::Float,
                },
                p.range,
            ),
            None => (ValueKind::Float, None),
        };
        SlotMeta { kind, range }
    }
}
