// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Count-bounded asset storage with secondary indices.
//!
//! Primary index is an LRU over `assetId`; re-submitting an id replaces the
//! document and refreshes its position. Secondary indices by device uuid
//! and asset type are kept write-through. Eviction hands the displaced
//! asset back to the caller so an `AssetRemoved` event can be synthesized
//! into the pipeline.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::{Asset, AssetPtr};

pub struct AssetBuffer {
    buffer: LruCache<String, AssetPtr>,
    by_device: HashMap<String, HashSet<String>>,
    by_type: HashMap<String, HashSet<String>>,
    /// Active (non-removed) count; the LRU len includes tombstones.
    active: usize,
}

impl AssetBuffer {
    pub fn new(max_assets: usize) -> Self {
        Self {
            buffer: LruCache::new(
                NonZeroUsize::new(max_assets.max(1)).expect("max asset count must be positive"),
            ),
            by_device: HashMap::new(),
            by_type: HashMap::new(),
            active: 0,
        }
    }

    pub fn max_assets(&self) -> usize {
        self.buffer.cap().into()
    }

    /// Active asset count; tombstoned assets are excluded.
    pub fn count(&self) -> usize {
        self.active
    }

    pub fn total_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn count_for_device(&self, device_uuid: &str) -> usize {
        self.by_device.get(device_uuid).map_or(0, HashSet::len)
    }

    pub fn count_for_type(&self, asset_type: &str) -> usize {
        self.by_type.get(asset_type).map_or(0, HashSet::len)
    }

    /// Per-type counts for document headers.
    pub fn counts_by_type(&self) -> HashMap<String, usize> {
        self.by_type
            .iter()
            .map(|(t, ids)| (t.clone(), ids.len()))
            .collect()
    }

    /// Insert or replace. Returns the asset evicted to make room, if any.
    pub fn add_asset(&mut self, asset: Asset) -> Option<AssetPtr> {
        let id = asset.asset_id().to_string();
        let asset = Arc::new(asset);

        if let Some(old) = self.buffer.pop(&id) {
            self.unindex(&old);
        }

        let mut evicted = None;
        if self.buffer.len() >= self.max_assets() {
            if let Some((_, old)) = self.buffer.pop_lru() {
                self.unindex(&old);
                if !old.is_removed() {
                    evicted = Some(old);
                }
            }
        }

        self.index(&asset);
        self.buffer.put(id, asset);
        evicted
    }

    pub fn get(&self, asset_id: &str) -> Option<&AssetPtr> {
        // peek: reads do not refresh recency.
        self.buffer.peek(asset_id)
    }

    /// Tombstone an asset in place. Returns the marked asset.
    pub fn remove_asset(&mut self, asset_id: &str) -> Option<AssetPtr> {
        let existing = Arc::clone(self.buffer.peek(asset_id)?);
        if existing.is_removed() {
            return Some(existing);
        }
        let tombstone = Arc::new(existing.tombstone());
        self.unindex(&existing);
        self.buffer.put(asset_id.to_string(), Arc::clone(&tombstone));
        Some(tombstone)
    }

    /// Tombstone every active asset matching the device and type filters.
    /// Returns the assets removed.
    pub fn remove_all(
        &mut self,
        device_uuid: Option<&str>,
        asset_type: Option<&str>,
    ) -> Vec<AssetPtr> {
        let ids: Vec<String> = self
            .buffer
            .iter()
            .filter(|(_, a)| {
                !a.is_removed()
                    && device_uuid.map_or(true, |d| a.device_uuid() == Some(d))
                    && asset_type.map_or(true, |t| a.asset_type() == t)
            })
            .map(|(id, _)| id.clone())
            .collect();

        ids.iter().filter_map(|id| self.remove_asset(id)).collect()
    }

    /// Query assets newest-first. `include_removed` admits tombstones.
    pub fn assets(
        &self,
        count: usize,
        include_removed: bool,
        device_uuid: Option<&str>,
        asset_type: Option<&str>,
    ) -> Vec<AssetPtr> {
        self.buffer
            .iter()
            .map(|(_, a)| a)
            .filter(|a| include_removed || !a.is_removed())
            .filter(|a| device_uuid.map_or(true, |d| a.device_uuid() == Some(d)))
            .filter(|a| asset_type.map_or(true, |t| a.asset_type() == t))
            .take(count)
            .cloned()
            .collect()
    }

    fn index(&mut self, asset: &AssetPtr) {
        if asset.is_removed() {
            return;
        }
        self.active += 1;
        if let Some(device) = asset.device_uuid() {
            self.by_device
                .entry(device.to_string())
                .or_default()
                .insert(asset.asset_id().to_string());
        }
        self.by_type
            .entry(asset.asset_type().to_string())
            .or_default()
            .insert(asset.asset_id().to_string());
    }

    fn unindex(&mut self, asset: &AssetPtr) {
        if asset.is_removed() {
            return;
        }
        self.active -= 1;
        if let Some(device) = asset.device_uuid() {
            if let Some(ids) = self.by_device.get_mut(device) {
                ids.remove(asset.asset_id());
                if ids.is_empty() {
                    self.by_device.remove(device);
                }
            }
        }
        if let Some(ids) = self.by_type.get_mut(asset.asset_type()) {
            ids.remove(asset.asset_id());
            if ids.is_empty() {
                self.by_type.remove(asset.asset_type());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(id: &str, device: &str) -> Asset {
        let xml = format!(r#"<Part assetId="{}" deviceUuid="{}"/>"#, id, device);
        Asset::parse_xml(&xml).expect("asset should parse").0
    }

    #[test]
    fn test_add_and_count() {
        let mut buf = AssetBuffer::new(10);
        assert!(buf.add_asset(asset("A1", "D1")).is_none());
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.count_for_type("Part"), 1);
        assert_eq!(buf.count_for_device("D1"), 1);
    }

    #[test]
    fn test_replace_moves_device_index() {
        let mut buf = AssetBuffer::new(10);
        buf.add_asset(asset("A1", "D1"));
        buf.add_asset(asset("A1", "D2"));
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.count_for_device("D1"), 0);
        assert_eq!(buf.count_for_device("D2"), 1);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let mut buf = AssetBuffer::new(10);
        for i in 0..10 {
            let device = format!("D{}", i % 3);
            buf.add_asset(asset(&format!("A{}", i), &device));
        }
        assert_eq!(buf.count(), 10);
        assert_eq!(buf.count_for_device("D0"), 4);

        // Adding the 11th evicts A0 (oldest) and reports it.
        let evicted = buf
            .add_asset(asset("A10", "D3"))
            .expect("eviction should report displaced asset");
        assert_eq!(evicted.asset_id(), "A0");
        assert_eq!(buf.count(), 10);
        assert_eq!(buf.count_for_device("D0"), 3);
        assert_eq!(buf.count_for_device("D3"), 1);
        assert!(buf.get("A0").is_none());
    }

    #[test]
    fn test_remove_keeps_tombstone() {
        let mut buf = AssetBuffer::new(10);
        buf.add_asset(asset("A1", "D1"));
        buf.add_asset(asset("A2", "D1"));

        let removed = buf.remove_asset("A1").expect("asset exists");
        assert!(removed.is_removed());
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.total_count(), 2);

        // Queries exclude tombstones unless asked for.
        assert_eq!(buf.assets(100, false, None, None).len(), 1);
        assert_eq!(buf.assets(100, true, None, None).len(), 2);
        assert!(buf.get("A1").expect("still resident").is_removed());
    }

    #[test]
    fn test_remove_all_by_device() {
        let mut buf = AssetBuffer::new(10);
        buf.add_asset(asset("A1", "D1"));
        buf.add_asset(asset("A2", "D1"));
        buf.add_asset(asset("A3", "D2"));

        let removed = buf.remove_all(Some("D1"), None);
        assert_eq!(removed.len(), 2);
        assert_eq!(buf.count(), 1);
        assert_eq!(buf.count_for_device("D1"), 0);
    }

    #[test]
    fn test_assets_newest_first() {
        let mut buf = AssetBuffer::new(10);
        buf.add_asset(asset("A1", "D1"));
        buf.add_asset(asset("A2", "D1"));
        buf.add_asset(asset("A3", "D1"));

        let ids: Vec<_> = buf
            .assets(2, false, None, None)
            .iter()
            .map(|a| a.asset_id().to_string())
            .collect();
        assert_eq!(ids, vec!["A3", "A2"]);
    }
}
