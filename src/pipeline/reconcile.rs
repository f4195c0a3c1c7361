// src/pipeline/reconcile.rs

//! Snapshot reconciliation and lifecycle bookkeeping.
//!
//! One engine owns the last-known entities of one source. Each successful
//! poll is merged against that state:
//!
//! - ids new to the source are **created**
//! - ids whose material fields changed are **updated**
//! - ids missing from enough consecutive polls are **removed** and evicted
//!
//! Merging the same snapshot twice yields no changes the second time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::InvariantViolation;
use crate::models::{Lifecycle, RemovalPolicy, TrackedEntity};

/// Changes produced by one merge, in emission order.
#[derive(Debug, Clone)]
pub struct MergeOutcome<T> {
    pub created: Vec<T>,
    pub updated: Vec<T>,
    pub removed: Vec<T>,
    /// Identity conflicts resolved during the merge
    pub violations: Vec<InvariantViolation>,
}

impl<T> Default for MergeOutcome<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            violations: Vec::new(),
        }
    }
}

impl<T> MergeOutcome<T> {
    /// Check if there are any lifecycle changes.
    pub fn has_changes(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.removed.len()
    }
}

#[derive(Debug, Clone)]
struct Tracked<T> {
    entity: T,
    /// Consecutive successful polls this entity was missing from
    absent_polls: u32,
}

/// Last-known entities of one source and the rules for merging into them.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine<T: TrackedEntity> {
    source: String,
    policy: RemovalPolicy,
    state: HashMap<String, Tracked<T>>,
}

impl<T: TrackedEntity> ReconciliationEngine<T> {
    pub fn new(source: impl Into<String>, policy: RemovalPolicy) -> Self {
        Self {
            source: source.into(),
            policy,
            state: HashMap::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn policy(&self) -> RemovalPolicy {
        self.policy
    }

    /// Number of live entities, including ones currently absent but not
    /// yet removed.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn get(&self, source_id: &str) -> Option<&T> {
        self.state.get(source_id).map(|t| &t.entity)
    }

    /// Consecutive polls `source_id` has been missing from.
    pub fn absent_polls(&self, source_id: &str) -> Option<u32> {
        self.state.get(source_id).map(|t| t.absent_polls)
    }

    pub fn entities(&self) -> impl Iterator<Item = &T> {
        self.state.values().map(|t| &t.entity)
    }

    /// Owned copy of every live entity, ordered by `source_id`.
    pub fn snapshot(&self) -> Vec<T> {
        let mut entities: Vec<T> = self.entities().cloned().collect();
        entities.sort_by(|a, b| a.source_id().cmp(b.source_id()));
        entities
    }

    /// Merge a freshly normalized snapshot taken at `now`.
    ///
    /// Duplicate ids within the snapshot resolve last-write-wins. A clock
    /// that steps backwards never moves an entity's timestamps backwards.
    pub fn merge(&mut self, snapshot: Vec<T>, now: DateTime<Utc>) -> MergeOutcome<T> {
        let mut outcome = MergeOutcome::default();

        // Step 1: index the snapshot, keeping first-appearance order.
        let mut order: Vec<String> = Vec::with_capacity(snapshot.len());
        let mut incoming: HashMap<String, T> = HashMap::with_capacity(snapshot.len());
        for entity in snapshot {
            let id = entity.source_id().to_string();
            if incoming.insert(id.clone(), entity).is_some() {
                let violation = InvariantViolation::DuplicateSourceId {
                    source_name: self.source.clone(),
                    source_id: id,
                };
                log::warn!("[{}] {}; keeping the last record", self.source, violation);
                outcome.violations.push(violation);
            } else {
                order.push(id);
            }
        }

        // Steps 2-3: created and updated, committed with fresh lifecycle.
        let seen: HashSet<String> = order.iter().cloned().collect();
        for id in order {
            let Some(mut entity) = incoming.remove(&id) else {
                continue;
            };

            match self.state.get_mut(&id) {
                None => {
                    *entity.lifecycle_mut() = Lifecycle::starting_at(now);
                    outcome.created.push(entity.clone());
                    self.state.insert(
                        id,
                        Tracked {
                            entity,
                            absent_polls: 0,
                        },
                    );
                }
                Some(tracked) => {
                    let previous = *tracked.entity.lifecycle();
                    let now = now.max(previous.last_seen);
                    let changed = !tracked.entity.materially_eq(&entity);

                    *entity.lifecycle_mut() = Lifecycle {
                        first_seen: previous.first_seen,
                        last_seen: now,
                        last_changed: if changed { now } else { previous.last_changed },
                    };
                    if changed {
                        outcome.updated.push(entity.clone());
                    }
                    // Store the new record even when unchanged so derived
                    // fields such as zone membership stay current.
                    tracked.entity = entity;
                    tracked.absent_polls = 0;
                }
            }
        }

        // Step 4: absence counting and removal.
        let threshold = self.policy.threshold();
        let mut expired: Vec<String> = Vec::new();
        for (id, tracked) in self.state.iter_mut() {
            if seen.contains(id) {
                continue;
            }
            tracked.absent_polls = tracked.absent_polls.saturating_add(1);
            if tracked.absent_polls >= threshold {
                expired.push(id.clone());
            } else {
                log::debug!(
                    "[{}] {} absent for {}/{} poll(s)",
                    self.source,
                    id,
                    tracked.absent_polls,
                    threshold
                );
            }
        }
        expired.sort();
        for id in expired {
            if let Some(tracked) = self.state.remove(&id) {
                outcome.removed.push(tracked.entity);
            }
        }

        if outcome.has_changes() {
            log::info!(
                "[{}] merged: {} created, {} updated, {} removed ({} live)",
                self.source,
                outcome.created.len(),
                outcome.updated.len(),
                outcome.removed.len(),
                self.state.len()
            );
        }
        outcome
    }
}
