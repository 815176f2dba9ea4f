//! Catalogue merge engine
//!
//! Folds documents into one `Operations` catalogue. Records are checked in a
//! fixed order (observations, reactions, actions, defaults, implements) against
//! a conflict index keyed by `Entity::hash_keys`, so the record merged first
//! always owns a key and the later one is reported as the offender.
//!
//! Merging is fail-fast and not transactional: records upserted before the
//! first error stay in the catalogue. Use [`Operations::merge_atomic`] when
//! the caller wants all-or-nothing.

use std::collections::HashMap;
use tracing::{debug, info};

use super::defaults::DefaultImplements;
use super::models::{Entity, EntityKind, Operations};
use crate::error::{RegulatorError, Result};

/// Record that claimed a conflict key
#[derive(Debug, Clone, PartialEq, Eq)]
struct Owner {
    kind: EntityKind,
    name: String,
}

impl Owner {
    fn new(kind: EntityKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
        }
    }
}

/// Conflict key -> records claiming it, first claimant first.
///
/// Only observations with identical expectations ever share a key.
#[derive(Debug, Default)]
struct ConflictIndex {
    owners: HashMap<String, Vec<Owner>>,
}

impl ConflictIndex {
    /// Index every record already in the catalogue
    fn seeded(ops: &Operations) -> Self {
        let mut index = Self::default();
        for (name, obsv) in &ops.observations {
            index.claim_all(obsv, EntityKind::Observation, name);
        }
        for (name, rctn) in &ops.reactions {
            index.claim_all(rctn, EntityKind::Reaction, name);
        }
        for (name, actn) in &ops.actions {
            index.claim_all(actn, EntityKind::Action, name);
        }
        for (name, implement) in &ops.implements {
            index.claim_all(implement, EntityKind::Implement, name);
        }
        index
    }

    fn claim_all(&mut self, entity: &impl Entity, kind: EntityKind, name: &str) {
        for key in entity.hash_keys() {
            self.claim(key, Owner::new(kind, name));
        }
    }

    fn claim(&mut self, key: String, owner: Owner) {
        let owners = self.owners.entry(key).or_default();
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }

    /// Make `owner` the sole claimant of `key`
    fn assign(&mut self, key: String, owner: Owner) {
        self.owners.insert(key, vec![owner]);
    }

    /// Forget every key claimed by a record that is about to be replaced
    fn release(&mut self, kind: EntityKind, name: &str) {
        self.owners.retain(|_, owners| {
            owners.retain(|o| !(o.kind == kind && o.name == name));
            !owners.is_empty()
        });
    }

    /// Claimants of `key` other than the record itself, in claim order
    fn others<'a>(
        &'a self,
        key: &str,
        kind: EntityKind,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Owner> + 'a {
        self.owners
            .get(key)
            .into_iter()
            .flatten()
            .filter(move |o| !(o.kind == kind && o.name == name))
    }
}

fn empty_error(kind: EntityKind, name: &str) -> RegulatorError {
    let requirement = match kind {
        EntityKind::Observation => "observations must have all of 'entity', 'query', and 'instance' set",
        EntityKind::Reaction => {
            "reactions must have all of 'observation', 'action', and 'condition check/value' set"
        }
        EntityKind::Action => "actions must have 'exe' and one of 'path' or 'script' set",
        EntityKind::Implement => {
            "implements must have 'exe' set, one of 'path' or 'script' set, and either react or observe or both"
        }
    };
    RegulatorError::InvalidInput(format!(
        "{} '{}' is empty, {}",
        kind, name, requirement
    ))
}

fn conflict_error(kind: EntityKind, name: &str, owner: &Owner, reason: &str) -> RegulatorError {
    RegulatorError::InvalidInput(format!(
        "{} '{}' conflicts with {} '{}': {}",
        kind,
        name,
        owner.kind.to_string().to_lowercase(),
        owner.name,
        reason
    ))
}

impl Operations {
    /// Merge `incoming` into this catalogue.
    ///
    /// Re-injects every default implement, overwriting whatever sits under a
    /// default's name; incoming implements named like a default are dropped.
    /// Merging the same document twice is a no-op the second time.
    pub fn merge(&mut self, incoming: &Operations, defaults: &DefaultImplements) -> Result<()> {
        let mut conflicts = ConflictIndex::seeded(self);

        for (name, obsv) in &incoming.observations {
            let kind = EntityKind::Observation;
            if obsv.is_empty() {
                return Err(empty_error(kind, name));
            }
            conflicts.release(kind, name);
            for key in obsv.hash_keys() {
                for owner in conflicts.others(&key, kind, name) {
                    // Same check, same expectation: a harmless duplicate
                    let duplicate = owner.kind == EntityKind::Observation
                        && self
                            .observations
                            .get(&owner.name)
                            .is_some_and(|existing| existing.expect == obsv.expect);
                    if !duplicate {
                        let reason = if owner.kind == EntityKind::Observation {
                            "duplicate key with different expectation"
                        } else {
                            "duplicate key"
                        };
                        return Err(conflict_error(kind, name, owner, reason));
                    }
                }
                conflicts.claim(key, Owner::new(kind, name));
            }
            debug!(name = %name, entity = %obsv.entity, query = %obsv.query, "Merged observation");
            self.observations.insert(name.clone(), obsv.clone());
        }

        for (name, rctn) in &incoming.reactions {
            let kind = EntityKind::Reaction;
            if rctn.is_empty() {
                return Err(empty_error(kind, name));
            }
            claim_exclusive(&mut conflicts, rctn, kind, name)?;
            debug!(name = %name, observation = %rctn.observation, "Merged reaction");
            self.reactions.insert(name.clone(), rctn.clone());
        }

        for (name, actn) in &incoming.actions {
            let kind = EntityKind::Action;
            if actn.is_empty() {
                return Err(empty_error(kind, name));
            }
            claim_exclusive(&mut conflicts, actn, kind, name)?;
            debug!(name = %name, exe = %actn.exe, "Merged action");
            self.actions.insert(name.clone(), actn.clone());
        }

        for (name, implement) in defaults.iter() {
            conflicts.release(EntityKind::Implement, name);
            for key in implement.hash_keys() {
                conflicts.assign(key, Owner::new(EntityKind::Implement, name));
            }
            self.implements.insert(name.clone(), implement.clone());
        }

        let mut skipped = 0;
        for (name, implement) in &incoming.implements {
            let kind = EntityKind::Implement;
            if defaults.contains(name) {
                debug!(name = %name, "Ignoring implement shadowing a default");
                skipped += 1;
                continue;
            }
            if implement.is_empty() {
                return Err(empty_error(kind, name));
            }
            claim_exclusive(&mut conflicts, implement, kind, name)?;
            debug!(name = %name, exe = %implement.exe, "Merged implement");
            self.implements.insert(name.clone(), implement.clone());
        }

        info!(
            observations = incoming.observations.len(),
            reactions = incoming.reactions.len(),
            actions = incoming.actions.len(),
            implements = incoming.implements.len() - skipped,
            total = self.len(),
            "Merged catalogue document"
        );
        Ok(())
    }

    /// Like [`Operations::merge`], but leaves the catalogue untouched on error
    pub fn merge_atomic(&mut self, incoming: &Operations, defaults: &DefaultImplements) -> Result<()> {
        let mut staged = self.clone();
        staged.merge(incoming, defaults)?;
        *self = staged;
        Ok(())
    }
}

/// Claim every key of a record that tolerates no sharing at all
fn claim_exclusive(
    conflicts: &mut ConflictIndex,
    entity: &impl Entity,
    kind: EntityKind,
    name: &str,
) -> Result<()> {
    conflicts.release(kind, name);
    for key in entity.hash_keys() {
        if let Some(owner) = conflicts.others(&key, kind, name).next() {
            return Err(conflict_error(kind, name, owner, "duplicate key"));
        }
        conflicts.claim(key, Owner::new(kind, name));
    }
    Ok(())
}

/// Strictly parse one YAML document and merge it into `data`.
///
/// Can be called once per source to build a catalogue from many documents.
pub fn parse_operations(
    raw_data: &[u8],
    data: &mut Operations,
    defaults: &DefaultImplements,
) -> Result<()> {
    let incoming = parse_document(raw_data)?;
    data.merge(&incoming, defaults)
}

/// Deserialize a document without merging it anywhere
pub fn parse_document(raw_data: &[u8]) -> Result<Operations> {
    let text = String::from_utf8_lossy(raw_data);
    if text.trim().is_empty() {
        return Ok(Operations::default());
    }
    Ok(serde_yaml::from_str(&text)?)
}
