// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Checkpoints: materialized "latest observation per data item" snapshots.
//!
//! The buffer maintains one live checkpoint (the latest map), a trailing
//! checkpoint at the buffer head, and a ring of periodic snapshots used to
//! answer `current?at=` queries by bounded replay. Merging is type-aware:
//! conditions chain by code, data sets merge cell-wise, everything else
//! replaces.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::entity::{DataSet, Value};
use crate::observation::{ConditionLevel, Observation, ObservationKind, ObservationPtr};

/// Set of data-item ids scoping a query or subscription.
pub type FilterSet = HashSet<String>;

/// Latest-observation-per-data-item snapshot.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    /// Keyed by data-item id; ordered for deterministic document output.
    observations: BTreeMap<String, ObservationPtr>,
    filter: Option<FilterSet>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: FilterSet) -> Self {
        Self {
            observations: BTreeMap::new(),
            filter: Some(filter),
        }
    }

    /// Copy another checkpoint, optionally narrowing to a filter set. When
    /// no filter is given the source's own filter is inherited.
    pub fn copy_from(source: &Checkpoint, filter: Option<FilterSet>) -> Self {
        let filter = filter.or_else(|| source.filter.clone());
        let observations = source
            .observations
            .iter()
            .filter(|(id, _)| filter.as_ref().map_or(true, |f| f.contains(*id)))
            .map(|(id, obs)| (id.clone(), Arc::clone(obs)))
            .collect();
        Self {
            observations,
            filter,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }

    pub fn get(&self, data_item_id: &str) -> Option<&ObservationPtr> {
        self.observations.get(data_item_id)
    }

    /// Admit an observation, merging it against the current latest entry
    /// for its data item.
    pub fn add_observation(&mut self, obs: &ObservationPtr) {
        let id = obs.data_item().id().to_string();
        if let Some(filter) = &self.filter {
            if !filter.contains(&id) {
                return;
            }
        }

        let merged = match self.observations.get(&id) {
            Some(old) if obs.kind() == &ObservationKind::Condition => merge_condition(obs, old),
            Some(old)
                if matches!(
                    obs.kind(),
                    ObservationKind::DataSetEvent | ObservationKind::TableEvent
                ) =>
            {
                merge_data_set(obs, old)
            }
            _ => Arc::clone(obs),
        };

        self.observations.insert(id, merged);
    }

    /// Flatten into an observation list, expanding condition chains so the
    /// full set of active alarms appears.
    pub fn observations(&self, filter: Option<&FilterSet>) -> Vec<ObservationPtr> {
        let mut out = Vec::new();
        for (id, obs) in &self.observations {
            if let Some(f) = filter {
                if !f.contains(id) {
                    continue;
                }
            }
            if obs.kind() == &ObservationKind::Condition {
                out.extend(obs.chain());
            } else {
                out.push(Arc::clone(obs));
            }
        }
        out
    }

    /// Trim a new data-set observation against this checkpoint: entries
    /// already present with the same value are dropped. Returns `None`
    /// when nothing would change, the (possibly trimmed) observation
    /// otherwise.
    pub fn data_set_difference(&self, obs: &Observation) -> Option<Observation> {
        let old = match self.observations.get(obs.data_item().id()) {
            Some(old) => old,
            None => return Some(obs.clone()),
        };

        let (Some(Value::DataSet(new_set) | Value::Table(new_set)), Some(Value::DataSet(old_set) | Value::Table(old_set))) =
            (obs.value(), old.value())
        else {
            return Some(obs.clone());
        };

        if new_set.is_empty() || obs.properties().contains("resetTriggered") {
            return Some(obs.clone());
        }

        let mut trimmed = DataSet::new();
        let mut changed = false;
        for entry in new_set.iter() {
            match old_set.get(&entry.key) {
                Some(existing) if existing.same(entry) => changed = true,
                _ => trimmed.insert(entry.clone()),
            }
        }

        if !changed {
            return Some(obs.clone());
        }
        if trimmed.is_empty() {
            return None;
        }

        let mut copy = obs.clone();
        let value = if obs.kind() == &ObservationKind::TableEvent {
            Value::Table(trimmed)
        } else {
            Value::DataSet(trimmed)
        };
        copy.replace_value(value);
        Some(copy)
    }
}

/// Merge a new condition into the existing chain for its data item.
///
/// Active levels chain (same code replaces in place); a Normal with a code
/// clears just that entry; Normal or Unavailable without a code resets the
/// chain to the new observation alone.
fn merge_condition(event: &ObservationPtr, old: &ObservationPtr) -> ObservationPtr {
    let event_level = event.level().unwrap_or(ConditionLevel::Unavailable);
    let old_level = old.level().unwrap_or(ConditionLevel::Unavailable);

    if event_level.is_active() && old_level.is_active() {
        // Same code supersedes its previous entry in the chain.
        let chain = match event.code() {
            Some(code) if old.find_code(code).is_some() => old.without_code(code),
            _ => Some(Arc::clone(old)),
        };
        return event.chained_to(chain);
    }

    if event_level == ConditionLevel::Normal {
        if let Some(code) = event.code() {
            if old.find_code(code).is_some() {
                return match old.without_code(code) {
                    // Clearing one alarm leaves the rest of the chain.
                    Some(remaining) => remaining,
                    // Last one out: a bare normal with no code.
                    None => bare_normal(event),
                };
            }
            return Arc::clone(event);
        }
    }

    Arc::clone(event)
}

/// Copy of a normal condition stripped of its code properties.
fn bare_normal(event: &ObservationPtr) -> ObservationPtr {
    let mut copy = (**event).clone();
    copy.strip_condition_code();
    Arc::new(copy)
}

fn merge_data_set(event: &ObservationPtr, old: &ObservationPtr) -> ObservationPtr {
    if event.is_unavailable()
        || old.is_unavailable()
        || event.properties().contains("resetTriggered")
    {
        return Arc::clone(event);
    }

    let (Some(Value::DataSet(update) | Value::Table(update)), Some(Value::DataSet(base) | Value::Table(base))) =
        (event.value(), old.value())
    else {
        return Arc::clone(event);
    };

    let mut merged = base.clone();
    merged.merge(update);

    let mut copy = (**event).clone();
    let count = merged.len() as i64;
    let value = if event.kind() == &ObservationKind::TableEvent {
        Value::Table(merged)
    } else {
        Value::DataSet(merged)
    };
    copy.replace_value(value);
    copy.set_count(count);
    Arc::new(copy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::{DataItem, DataItemPtr};
    use crate::entity::{parse_timestamp, ErrorList, Properties};

    fn item(pairs: &[(&str, &str)]) -> DataItemPtr {
        let mut p = Properties::new();
        for (k, v) in pairs {
            p.insert(*k, *v);
        }
        DataItem::make(p).expect("data item should build")
    }

    fn obs(data_item: &DataItemPtr, pairs: &[(&str, &str)]) -> ObservationPtr {
        let mut props = Properties::new();
        for (k, v) in pairs {
            props.insert(*k, *v);
        }
        let mut errors = ErrorList::new();
        Arc::new(
            Observation::make(
                data_item,
                props,
                parse_timestamp("2026-01-01T12:00:00Z").expect("timestamp"),
                &mut errors,
            )
            .expect("observation should build"),
        )
    }

    fn condition_item() -> DataItemPtr {
        item(&[("id", "c1"), ("type", "LOAD"), ("category", "CONDITION")])
    }

    #[test]
    fn test_replacement_for_plain_events() {
        let exec = item(&[("id", "exec"), ("type", "EXECUTION"), ("category", "EVENT")]);
        let mut cp = Checkpoint::new();
        cp.add_observation(&obs(&exec, &[("VALUE", "READY")]));
        cp.add_observation(&obs(&exec, &[("VALUE", "ACTIVE")]));
        assert_eq!(cp.len(), 1);
        assert_eq!(
            cp.get("exec").and_then(|o| o.value_text()).as_deref(),
            Some("ACTIVE")
        );
    }

    #[test]
    fn test_condition_chain_grows_and_clears() {
        let c = condition_item();
        let mut cp = Checkpoint::new();

        cp.add_observation(&obs(&c, &[("level", "WARNING"), ("nativeCode", "A")]));
        cp.add_observation(&obs(&c, &[("level", "WARNING"), ("nativeCode", "B")]));
        let head = cp.get("c1").expect("chain head");
        assert_eq!(head.chain().len(), 2);
        assert_eq!(head.code(), Some("B"));

        // Same code replaces, chain length stays.
        cp.add_observation(&obs(&c, &[("level", "FAULT"), ("nativeCode", "A")]));
        let head = cp.get("c1").expect("chain head");
        assert_eq!(head.chain().len(), 2);
        assert_eq!(head.level(), Some(ConditionLevel::Fault));

        // Normal with code clears only that entry.
        cp.add_observation(&obs(&c, &[("level", "NORMAL"), ("nativeCode", "A")]));
        let head = cp.get("c1").expect("chain head");
        assert_eq!(head.chain().len(), 1);
        assert_eq!(head.code(), Some("B"));

        // Clearing the last entry leaves a bare normal.
        cp.add_observation(&obs(&c, &[("level", "NORMAL"), ("nativeCode", "B")]));
        let head = cp.get("c1").expect("chain head");
        assert_eq!(head.level(), Some(ConditionLevel::Normal));
        assert_eq!(head.code(), None);
        assert_eq!(head.chain().len(), 1);
    }

    #[test]
    fn test_bare_normal_resets_chain() {
        let c = condition_item();
        let mut cp = Checkpoint::new();
        cp.add_observation(&obs(&c, &[("level", "WARNING"), ("nativeCode", "A")]));
        cp.add_observation(&obs(&c, &[("level", "WARNING"), ("nativeCode", "B")]));
        cp.add_observation(&obs(&c, &[("level", "NORMAL")]));
        let head = cp.get("c1").expect("chain head");
        assert_eq!(head.chain().len(), 1);
        assert_eq!(head.level(), Some(ConditionLevel::Normal));
    }

    #[test]
    fn test_data_set_merge() {
        let ds = item(&[
            ("id", "v1"),
            ("type", "VARIABLE"),
            ("category", "EVENT"),
            ("representation", "DATA_SET"),
        ]);
        let mut cp = Checkpoint::new();
        cp.add_observation(&obs(&ds, &[("VALUE", "a=1 b=2")]));
        cp.add_observation(&obs(&ds, &[("VALUE", "b=3 c=4")]));

        let latest = cp.get("v1").expect("latest");
        let Some(Value::DataSet(set)) = latest.value() else {
            panic!("expected data set");
        };
        assert_eq!(set.len(), 3);
        assert_eq!(set.get("b").map(|e| e.value.to_string()), Some("3".into()));
        assert_eq!(latest.properties().get("count"), Some(&Value::Integer(3)));

        // Removal merges away.
        cp.add_observation(&obs(&ds, &[("VALUE", "a")]));
        let latest = cp.get("v1").expect("latest");
        let Some(Value::DataSet(set)) = latest.value() else {
            panic!("expected data set");
        };
        assert!(set.get("a").is_none());
    }

    #[test]
    fn test_data_set_difference() {
        let ds = item(&[
            ("id", "v1"),
            ("type", "VARIABLE"),
            ("category", "EVENT"),
            ("representation", "DATA_SET"),
        ]);
        let mut cp = Checkpoint::new();
        cp.add_observation(&obs(&ds, &[("VALUE", "a=1 b=2")]));

        // Unchanged set collapses to nothing.
        let dup = obs(&ds, &[("VALUE", "a=1 b=2")]);
        assert!(cp.data_set_difference(&dup).is_none());

        // Partially-changed set trims to the changed entries.
        let partial = obs(&ds, &[("VALUE", "a=1 b=9")]);
        let trimmed = cp.data_set_difference(&partial).expect("changed entries remain");
        let Some(Value::DataSet(set)) = trimmed.value() else {
            panic!("expected data set");
        };
        assert_eq!(set.len(), 1);
        assert!(set.get("b").is_some());
    }

    #[test]
    fn test_filtered_checkpoint_ignores_other_items() {
        let exec = item(&[("id", "exec"), ("type", "EXECUTION"), ("category", "EVENT")]);
        let mode = item(&[("id", "mode"), ("type", "CONTROLLER_MODE"), ("category", "EVENT")]);

        let mut cp = Checkpoint::with_filter(FilterSet::from(["exec".to_string()]));
        cp.add_observation(&obs(&exec, &[("VALUE", "READY")]));
        cp.add_observation(&obs(&mode, &[("VALUE", "AUTOMATIC")]));
        assert_eq!(cp.len(), 1);
        assert!(cp.get("mode").is_none());
    }
}
