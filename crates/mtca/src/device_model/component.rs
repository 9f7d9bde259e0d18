// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Component tree nodes of the device model.
//!
//! Components reference their data items by shared handle and their parent
//! by id only; ownership always flows root-to-leaf.

use crate::entity::Properties;

use super::data_item::DataItemPtr;

/// One node of a device's component tree.
#[derive(Debug, Default)]
pub struct Component {
    /// Element name, e.g. `Controller`, `Linear`, `Systems`.
    element: String,
    id: String,
    name: Option<String>,
    uuid: Option<String>,
    /// Description attributes plus optional body text.
    description: Option<(Properties, Option<String>)>,
    data_items: Vec<DataItemPtr>,
    children: Vec<Component>,
}

impl Component {
    pub fn new(element: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            element: element.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn set_description(&mut self, attrs: Properties, body: Option<String>) {
        self.description = Some((attrs, body));
    }

    pub fn add_data_item(&mut self, item: DataItemPtr) {
        self.data_items.push(item);
    }

    pub fn add_child(&mut self, child: Component) {
        self.children.push(child);
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn description(&self) -> Option<&(Properties, Option<String>)> {
        self.description.as_ref()
    }

    pub fn data_items(&self) -> &[DataItemPtr] {
        &self.data_items
    }

    pub fn children(&self) -> &[Component] {
        &self.children
    }

    /// Depth-first walk over this component and everything below it.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a Component)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// All data items in this subtree, depth first.
    pub fn all_data_items(&self) -> Vec<DataItemPtr> {
        let mut items = Vec::new();
        self.walk(&mut |c| items.extend(c.data_items.iter().cloned()));
        items
    }

    pub fn find(&self, id: &str) -> Option<&Component> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_model::data_item::DataItem;
    use crate::entity::Properties;

    fn item(id: &str) -> DataItemPtr {
        let mut p = Properties::new();
        p.insert("id", id);
        p.insert("type", "EXECUTION");
        p.insert("category", "EVENT");
        DataItem::make(p).expect("data item should build")
    }

    #[test]
    fn test_tree_walk_collects_all_items() {
        let mut root = Component::new("Device", "d");
        root.add_data_item(item("a"));

        let mut controller = Component::new("Controller", "cont");
        controller.add_data_item(item("b"));
        controller.add_data_item(item("c"));
        root.add_child(controller);

        let items = root.all_data_items();
        let ids: Vec<_> = items.iter().map(|i| i.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_by_id() {
        let mut root = Component::new("Device", "d");
        root.add_child(Component::new("Controller", "cont"));
        assert_eq!(root.find("cont").map(Component::element), Some("Controller"));
        assert!(root.find("missing").is_none());
    }
}
