//! Filtering a requested list of extension or layer names down to what the
//! driver actually offers.

use std::collections::HashSet;
use std::fmt;

use crate::catalog::CapabilitySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    InstanceExtension,
    InstanceLayer,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::InstanceExtension => f.write_str("instance extension"),
            CapabilityKind::InstanceLayer => f.write_str("instance layer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The name was already requested earlier in the list.
    Duplicate,
    /// The driver does not report the name.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedCapability {
    pub name: String,
    pub reason: DropReason,
}

/// Filter `requested` in place to the names `available` contains.
///
/// The first occurrence of a name is kept and later duplicates are dropped.
/// Names the driver does not report are dropped. Neither case is an error:
/// each drop is logged as a warning and returned so callers can inspect it.
/// Surviving names keep their relative order.
pub fn negotiate(
    requested: &mut Vec<String>,
    available: &CapabilitySet,
    kind: CapabilityKind,
) -> Vec<DroppedCapability> {
    let mut seen = HashSet::with_capacity(requested.len());
    let mut dropped = Vec::new();

    requested.retain(|name| {
        if !seen.insert(name.clone()) {
            tracing::warn!("Tried to add {} '{}' twice", kind, name);
            dropped.push(DroppedCapability {
                name: name.clone(),
                reason: DropReason::Duplicate,
            });
            return false;
        }
        if !available.contains(name) {
            tracing::warn!("Unsupported {} '{}', continuing without", kind, name);
            dropped.push(DroppedCapability {
                name: name.clone(),
                reason: DropReason::Unsupported,
            });
            return false;
        }
        true
    });

    tracing::debug!("Selected [{}] {}s:", requested.len(), kind);
    for name in requested.iter() {
        tracing::debug!("\t{}", name);
    }

    dropped
}
