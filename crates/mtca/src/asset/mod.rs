// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Assets: standalone documents with a lifecycle independent of the
//! observation stream.
//!
//! An asset wraps a factory-validated entity tree plus the identity fields
//! the store indexes on. The schema is deliberately shallow: known asset
//! roots validate their identity attributes and common structures, and an
//! any-extension factory absorbs vendor content.

mod asset_buffer;

pub use asset_buffer::AssetBuffer;

use std::sync::{Arc, OnceLock};

use crate::entity::{
    any_factory, parse_entity_xml, Entity, EntityError, EntityPtr, ErrorList, Factory, FactoryPtr,
    Requirement, Timestamp, Value, ValueKind,
};

pub type AssetPtr = Arc<Asset>;

/// Asset root element names the agent understands natively. Anything else
/// still parses through the extension factory.
pub const KNOWN_ASSET_TYPES: &[&str] = &[
    "CuttingTool",
    "CuttingToolArchetype",
    "Part",
    "PartArchetype",
    "Process",
    "ProcessArchetype",
    "Task",
    "TaskArchetype",
    "RawMaterial",
    "Fixture",
    "PhysicalAsset",
    "QIFDocumentWrapper",
    "ComponentConfigurationParameters",
];

/// One asset document.
#[derive(Debug, Clone)]
pub struct Asset {
    entity: EntityPtr,
    asset_id: String,
    asset_type: String,
    device_uuid: Option<String>,
    timestamp: Option<Timestamp>,
    removed: bool,
}

impl Asset {
    /// Wrap a validated entity as an asset. The entity must carry `assetId`.
    pub fn new(entity: EntityPtr) -> Result<Asset, EntityError> {
        let asset_id = entity
            .get_string("assetId")
            .ok_or_else(|| EntityError::MissingProperty {
                entity: entity.name().to_string(),
                property: "assetId".into(),
            })?
            .to_string();

        let timestamp = match entity.property("timestamp") {
            Some(Value::Timestamp(ts)) => Some(*ts),
            _ => None,
        };

        let removed = matches!(entity.property("removed"), Some(Value::Bool(true)));

        Ok(Asset {
            asset_type: entity.name().to_string(),
            device_uuid: entity.get_string("deviceUuid").map(String::from),
            asset_id,
            timestamp,
            removed,
            entity,
        })
    }

    /// Parse an asset XML document, collecting validation errors.
    pub fn parse_xml(xml: &str) -> Result<(Asset, ErrorList), EntityError> {
        let (entity, errors) = parse_entity_xml(xml, asset_factory())?;
        let asset = Asset::new(entity)?;
        Ok((asset, errors))
    }

    pub fn entity(&self) -> &EntityPtr {
        &self.entity
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn asset_type(&self) -> &str {
        &self.asset_type
    }

    pub fn device_uuid(&self) -> Option<&str> {
        self.device_uuid.as_deref()
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.timestamp.as_ref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Tombstone copy: same document, `removed` set.
    pub fn tombstone(&self) -> Asset {
        let mut props = self.entity.properties().clone();
        props.insert("removed", Value::Bool(true));
        let entity = Arc::new(Entity::new(self.entity.name(), props));
        Asset {
            entity,
            removed: true,
            ..self.clone()
        }
    }

    /// Copy with a device uuid assigned (PUT requests carry the device in
    /// the path, not the document).
    pub fn with_device(&self, uuid: &str) -> Asset {
        let mut props = self.entity.properties().clone();
        props.insert("deviceUuid", Value::String(uuid.to_string()));
        let entity = Arc::new(Entity::new(self.entity.name(), props));
        Asset {
            entity,
            device_uuid: Some(uuid.to_string()),
            ..self.clone()
        }
    }
}

/// Root dispatch factory for asset documents. Built once at bootstrap.
pub fn asset_factory() -> &'static FactoryPtr {
    static FACTORY: OnceLock<FactoryPtr> = OnceLock::new();
    FACTORY.get_or_init(|| {
        let common = vec![
            Requirement::required("assetId"),
            Requirement::new("timestamp", ValueKind::Timestamp, false),
            Requirement::optional("deviceUuid"),
            Requirement::new("removed", ValueKind::Bool, false),
            Requirement::optional("hash"),
        ];

        // Part archetypes carry customer and relationship lists the REST
        // layer reads back; everything else is extension content.
        let customer = Arc::new({
            let mut f = Factory::new(vec![
                Requirement::required("customerId"),
                Requirement::new("VALUE", ValueKind::String, false),
            ]);
            f.set_any(any_factory());
            f
        });
        let mut customers = Factory::new(vec![]);
        customers.set_list(true);
        customers.register("Customer", customer);
        let customers = Arc::new(customers);

        let relationship = Arc::new({
            let mut f = Factory::new(vec![Requirement::new("VALUE", ValueKind::String, false)]);
            f.set_any(any_factory());
            f
        });
        let mut relationships = Factory::new(vec![]);
        relationships.set_list(true);
        relationships.register("AssetRelationship", Arc::clone(&relationship));
        relationships.register("DeviceRelationship", relationship);
        let relationships = Arc::new(relationships);

        let mut configuration = Factory::new(vec![]);
        configuration.register("Relationships", relationships);
        configuration.set_any(any_factory());
        let configuration = Arc::new(configuration);

        let mut part = Factory::new(common.clone());
        part.register("Customers", customers);
        part.register("Configuration", configuration);
        part.set_any(any_factory());
        let part = Arc::new(part);

        let generic = Arc::new({
            let mut f = Factory::new(common);
            f.set_any(any_factory());
            f
        });

        let mut root = Factory::new(vec![]);
        root.register("Part", Arc::clone(&part));
        root.register("PartArchetype", part);
        for name in KNOWN_ASSET_TYPES {
            if *name != "Part" && *name != "PartArchetype" {
                root.register(*name, Arc::clone(&generic));
            }
        }
        root.set_any(generic);
        Arc::new(root)
    })
}
