// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mtca project

//! Schema nodes: factories construct and validate one kind of entity.
//!
//! A factory owns the requirement list for its entity kind plus the child
//! factories reachable from it. Child lookup tries exact names first, then
//! the registered matchers in registration order, then the any-extension
//! factory when the element is marked extensible. Derived factories start
//! as a deep copy of their base and add or override requirements.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use super::requirement::Requirement;
use super::value::{EntityPtr, Value, ValueKind};
use super::{Entity, EntityError, ErrorList, Properties};

/// Shared handle to a factory node. Factory trees are built once during
/// bootstrap and read-only afterwards.
pub type FactoryPtr = Arc<Factory>;

/// Predicate selecting a child factory by element name.
#[derive(Clone)]
pub enum Matcher {
    Prefix(String),
    Suffix(String),
    Regex(Arc<Regex>),
}

impl Matcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Matcher::Prefix(p) => name.starts_with(p.as_str()),
            Matcher::Suffix(s) => name.ends_with(s.as_str()),
            Matcher::Regex(re) => re.is_match(name),
        }
    }
}

/// Post-construction hook, e.g. stamping `count` on data-set events.
pub type CreateHook = Arc<dyn Fn(&str, &mut Properties) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Factory {
    requirements: Vec<Requirement>,
    /// Exact-name child factories.
    children: HashMap<String, FactoryPtr>,
    /// Matcher-dispatched child factories, tried in registration order.
    matchers: Vec<(Matcher, FactoryPtr)>,
    /// Fallback factory accepting arbitrary unknown children.
    any: Option<FactoryPtr>,
    /// Entity is list-shaped: ordered children live under `LIST`.
    list: bool,
    hook: Option<CreateHook>,
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("requirements", &self.requirements.len())
            .field("children", &self.children.len())
            .field("matchers", &self.matchers.len())
            .field("list", &self.list)
            .finish()
    }
}

impl Factory {
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self {
            requirements,
            ..Default::default()
        }
    }

    /// Deep copy for site-local specialization. Child factories are shared:
    /// they are immutable, so narrowing happens by re-registering.
    pub fn deep_copy(&self) -> Factory {
        self.clone()
    }

    pub fn add_requirements(&mut self, requirements: Vec<Requirement>) -> &mut Self {
        for req in requirements {
            if let Some(existing) = self
                .requirements
                .iter_mut()
                .find(|r| r.name() == req.name())
            {
                *existing = req;
            } else {
                self.requirements.push(req);
            }
        }
        self
    }

    pub fn register(&mut self, name: impl Into<String>, factory: FactoryPtr) -> &mut Self {
        self.children.insert(name.into(), factory);
        self
    }

    pub fn register_matcher(&mut self, matcher: Matcher, factory: FactoryPtr) -> &mut Self {
        self.matchers.push((matcher, factory));
        self
    }

    pub fn set_any(&mut self, factory: FactoryPtr) -> &mut Self {
        self.any = Some(factory);
        self
    }

    pub fn set_list(&mut self, list: bool) -> &mut Self {
        self.list = list;
        self
    }

    pub fn set_hook(&mut self, hook: CreateHook) -> &mut Self {
        self.hook = Some(hook);
        self
    }

    pub fn is_list(&self) -> bool {
        self.list
    }

    pub fn is_any(&self) -> bool {
        self.any.is_some()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn requirement(&self, name: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.name() == name)
    }

    /// Whether this factory can construct an element of the given name,
    /// directly or through a matcher.
    pub fn matches(&self, name: &str) -> bool {
        self.children.contains_key(name)
            || self.matchers.iter().any(|(m, _)| m.matches(name))
            || self.any.is_some()
    }

    /// Resolve the factory for a child element: exact match, then matchers
    /// in registration order, then the any-extension fallback.
    pub fn factory_for(&self, name: &str) -> Option<&FactoryPtr> {
        if let Some(f) = self.children.get(name) {
            return Some(f);
        }
        for (matcher, factory) in &self.matchers {
            if matcher.matches(name) {
                return Some(factory);
            }
        }
        self.any.as_ref()
    }

    /// Construct and validate an entity of this factory's kind.
    ///
    /// Every violation lands in `errors`; the entity is returned as long as
    /// no *required* property is missing or unusable, so callers get a
    /// best-effort partial document together with the error list.
    pub fn create(&self, name: &str, properties: Properties, errors: &mut ErrorList) -> Option<EntityPtr> {
        let mut out = Properties::new();
        let mut hard_failure = false;

        // Requirements first, in declaration order: ordering feeds printing.
        let mut remaining = properties;
        for req in &self.requirements {
            match remaining.remove(req.name()) {
                Some(mut value) => match req.check(name, &mut value) {
                    Ok(()) => out.insert(req.name().to_string(), value),
                    Err(e) => {
                        if req.is_required() {
                            hard_failure = true;
                        }
                        errors.push(e);
                    }
                },
                None => {
                    if req.is_required() {
                        errors.push(EntityError::MissingProperty {
                            entity: name.to_string(),
                            property: req.name().to_string(),
                        });
                        hard_failure = true;
                    }
                }
            }
        }

        // Anything left over is an unknown property; entity-valued leftovers
        // are unknown child elements unless the factory is extensible.
        // `LIST` carries the ordered children of list-shaped entities.
        for (key, value) in remaining.iter() {
            if value.is_composite() && self.any.is_none() && !(key == "LIST" && self.list) {
                errors.push(EntityError::InvalidElement {
                    entity: name.to_string(),
                    element: key.to_string(),
                });
            } else {
                out.insert(key.to_string(), value.clone());
            }
        }

        if hard_failure {
            return None;
        }

        if let Some(hook) = &self.hook {
            hook(name, &mut out);
        }

        Some(Arc::new(Entity::new(name, out)))
    }

    /// Construct a list-shaped entity from ordered children.
    pub fn create_list(
        &self,
        name: &str,
        children: Vec<EntityPtr>,
        errors: &mut ErrorList,
    ) -> Option<EntityPtr> {
        let mut props = Properties::new();
        props.insert("LIST", Value::EntityList(children));
        self.create(name, props, errors)
    }
}

/// A permissive factory accepting any property and any child; used as the
/// any-extension hook for vendor extension elements.
pub fn any_factory() -> FactoryPtr {
    let mut f = Factory::new(vec![Requirement::new("VALUE", ValueKind::String, false)]);
    let inner = Arc::new(Factory::new(vec![Requirement::new(
        "VALUE",
        ValueKind::String,
        false,
    )]));
    f.set_any(Arc::clone(&inner));
    Arc::new(f)
}
