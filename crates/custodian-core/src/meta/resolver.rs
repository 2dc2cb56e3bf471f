//! Object graph resolution.
//!
//! A [`MetaGraph`] holds every description reachable from a root type,
//! keyed by name. Links are followed by name on demand through [`Meta`]
//! views, so self references and mutual links never recurse.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use super::description::MetaDescription;
use super::error::MetaError;
use super::field::{join_type_name, DefaultValue, Field};
use super::types::{FieldType, LinkType};
use crate::error::Error;

/// Read access to stored object type descriptions by name.
pub trait MetaLookup {
    /// Fetch a description, `None` if no type has that name.
    fn lookup(&self, name: &str) -> Result<Option<MetaDescription>, Error>;
}

impl<T: MetaLookup + ?Sized> MetaLookup for &T {
    fn lookup(&self, name: &str) -> Result<Option<MetaDescription>, Error> {
        (**self).lookup(name)
    }
}

impl MetaLookup for HashMap<String, MetaDescription> {
    fn lookup(&self, name: &str) -> Result<Option<MetaDescription>, Error> {
        Ok(self.get(name).cloned())
    }
}

/// A lookup that sees `candidate` in place of whatever `base` stores under
/// the same name, and hides `shadowed` if given.
///
/// Used to validate a description before it is written, so that links from
/// the type to itself resolve.
pub struct CandidateLookup<'a, L: ?Sized> {
    base: &'a L,
    candidate: &'a MetaDescription,
    shadowed: Option<&'a str>,
}

impl<'a, L: MetaLookup + ?Sized> CandidateLookup<'a, L> {
    /// Overlay `candidate` on `base`.
    pub fn new(base: &'a L, candidate: &'a MetaDescription) -> Self {
        Self {
            base,
            candidate,
            shadowed: None,
        }
    }

    /// Additionally hide the type named `name` (the old name of a renamed type).
    pub fn hiding(mut self, name: &'a str) -> Self {
        self.shadowed = Some(name);
        self
    }
}

impl<L: MetaLookup + ?Sized> MetaLookup for CandidateLookup<'_, L> {
    fn lookup(&self, name: &str) -> Result<Option<MetaDescription>, Error> {
        if name == self.candidate.name {
            return Ok(Some(self.candidate.clone()));
        }
        if self.shadowed == Some(name) {
            return Ok(None);
        }
        self.base.lookup(name)
    }
}

/// The join type description behind an `objects` field.
pub fn join_type_description(owner: &str, target: &str) -> MetaDescription {
    MetaDescription::new(join_type_name(owner, target), "id")
        .with_field(Field::optional("id", FieldType::Number).with_default(DefaultValue::nextval()))
        .with_field(Field::inner_link(owner, owner))
        .with_field(Field::inner_link(target, target))
        .normalized()
}

/// Descriptions reachable from a root type.
#[derive(Debug, Clone)]
pub struct MetaGraph {
    root: String,
    metas: HashMap<String, MetaDescription>,
}

impl MetaGraph {
    /// The root type.
    pub fn root(&self) -> Meta<'_> {
        Meta {
            graph: self,
            description: &self.metas[&self.root],
        }
    }

    /// A type of the graph by name.
    pub fn get(&self, name: &str) -> Option<Meta<'_>> {
        self.metas.get(name).map(|description| Meta {
            graph: self,
            description,
        })
    }

    /// Number of types in the graph.
    pub fn len(&self) -> usize {
        self.metas.len()
    }

    /// Whether the graph is empty. Never true for a resolved graph.
    pub fn is_empty(&self) -> bool {
        self.metas.is_empty()
    }
}

/// A resolved view of one type in a [`MetaGraph`].
#[derive(Debug, Clone, Copy)]
pub struct Meta<'g> {
    graph: &'g MetaGraph,
    description: &'g MetaDescription,
}

impl<'g> Meta<'g> {
    /// Type name.
    pub fn name(&self) -> &'g str {
        &self.description.name
    }

    /// Underlying description.
    pub fn description(&self) -> &'g MetaDescription {
        self.description
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &'g [Field] {
        &self.description.fields
    }

    /// Find a field by name.
    pub fn find_field(&self, name: &str) -> Option<&'g Field> {
        self.description.find_field(name)
    }

    /// The key field.
    pub fn key_field(&self) -> Option<&'g Field> {
        self.description.key_field()
    }

    /// Target of a single-target link field.
    pub fn link_meta(&self, field: &Field) -> Option<Meta<'g>> {
        field
            .link_meta
            .as_deref()
            .and_then(|name| self.graph.get(name))
    }

    /// Targets of a generic link field, in declaration order.
    pub fn link_meta_list(&self, field: &Field) -> Vec<Meta<'g>> {
        field
            .link_meta_list
            .iter()
            .filter_map(|name| self.graph.get(name))
            .collect()
    }

    /// Join type of an `objects` field.
    pub fn link_through(&self, field: &Field) -> Option<Meta<'g>> {
        if field.field_type != FieldType::Objects {
            return None;
        }
        let target = field.link_meta.as_deref()?;
        self.graph.get(&join_type_name(self.name(), target))
    }

    /// The far-side field an outer link reflects.
    pub fn outer_link_field(&self, field: &Field) -> Option<&'g Field> {
        let target = self.link_meta(field)?;
        target.find_field(field.outer_link_field.as_deref()?)
    }

    /// Whether `field`, declared on this type, can be the far side of an
    /// outer link declared on `other`.
    pub fn can_be_link_to(&self, field: &Field, other: &Meta<'_>) -> bool {
        if field.is_simple() {
            return other
                .key_field()
                .map(|key| key.field_type == field.field_type)
                .unwrap_or(false);
        }
        if field.is_inner_object() {
            return field.link_meta.as_deref() == Some(other.name());
        }
        if field.is_inner_generic() {
            return field.link_meta_list.iter().any(|name| name == other.name());
        }
        false
    }
}

/// Resolves raw descriptions into [`MetaGraph`]s.
pub struct Resolver<'a, L: ?Sized> {
    lookup: &'a L,
}

impl<'a, L: MetaLookup + ?Sized> Resolver<'a, L> {
    /// Create a resolver over a description lookup.
    pub fn new(lookup: &'a L) -> Self {
        Self { lookup }
    }

    /// Resolve `root` and validate every rule that applies to it.
    ///
    /// Types reachable from the root are loaded breadth-first by name; a
    /// type already in the working set is never loaded twice. Only the root
    /// is validated; reachable types were validated when they were stored.
    pub fn resolve(&self, root: MetaDescription) -> Result<MetaGraph, Error> {
        root.validate()?;

        let root_name = root.name.clone();
        let mut metas = HashMap::new();
        let mut missing: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::new();

        metas.insert(root_name.clone(), root);
        queue.push_back(root_name.clone());

        while let Some(name) = queue.pop_front() {
            let is_root = name == root_name;
            let fields = metas[&name].fields.clone();
            for field in &fields {
                if is_root {
                    check_link_shape(&name, field)?;
                }
                let mut targets: Vec<String> = field.link_meta.iter().cloned().collect();
                targets.extend(field.link_meta_list.iter().cloned());
                for target in targets {
                    if metas.contains_key(&target) {
                        continue;
                    }
                    if missing.contains(&target) {
                        if is_root {
                            return Err(link_target_not_found(&name, field, &target));
                        }
                        continue;
                    }
                    match self.lookup.lookup(&target)? {
                        Some(description) => {
                            trace!(meta = %name, target = %target, "loaded link target");
                            metas.insert(target.clone(), description);
                            queue.push_back(target);
                        }
                        None if is_root => {
                            return Err(link_target_not_found(&name, field, &target));
                        }
                        None => {
                            missing.insert(target);
                        }
                    }
                }

                if field.field_type == FieldType::Objects {
                    if let Some(target) = field.link_meta.as_deref() {
                        let through = join_type_name(&name, target);
                        if !metas.contains_key(&through) {
                            let description = match self.lookup.lookup(&through)? {
                                Some(description) => description,
                                None => join_type_description(&name, target),
                            };
                            metas.insert(through.clone(), description);
                            queue.push_back(through);
                        }
                    }
                }
            }
        }

        let graph = MetaGraph {
            root: root_name,
            metas,
        };
        check_outer_links(&graph.root())?;
        Ok(graph)
    }
}

fn link_target_not_found(meta: &str, field: &Field, target: &str) -> Error {
    MetaError::LinkTargetNotFound {
        meta: meta.to_string(),
        field: field.name.clone(),
        target: target.to_string(),
    }
    .into()
}

fn invalid_link(meta: &str, field: &Field, reason: impl Into<String>) -> Error {
    MetaError::LinkTargetInvalid {
        meta: meta.to_string(),
        field: field.name.clone(),
        reason: reason.into(),
    }
    .into()
}

/// Structural checks of a link field that need no other type.
fn check_link_shape(meta: &str, field: &Field) -> Result<(), Error> {
    if field.is_simple() {
        if field.link_type.is_some() || field.link_meta.is_some() || !field.link_meta_list.is_empty() {
            return Err(invalid_link(meta, field, "a simple field cannot carry link attributes"));
        }
        return Ok(());
    }

    let link_type = field
        .link_type
        .ok_or_else(|| invalid_link(meta, field, "link type is not specified"))?;

    match (field.field_type, link_type) {
        (FieldType::Object, _) | (FieldType::Array, LinkType::Outer) | (FieldType::Objects, LinkType::Inner) => {
            if field.link_meta.is_none() {
                return Err(invalid_link(meta, field, "linkMeta is not specified"));
            }
        }
        (FieldType::Generic, LinkType::Inner) => {
            if field.link_meta_list.is_empty() {
                return Err(invalid_link(meta, field, "linkMetaList is empty"));
            }
        }
        (FieldType::Generic, LinkType::Outer) => {
            if field.link_meta.is_none() {
                return Err(invalid_link(meta, field, "linkMeta is not specified"));
            }
        }
        (field_type, link_type) => {
            return Err(invalid_link(
                meta,
                field,
                format!("unsupported combination of type '{}' and link type '{}'", field_type, link_type),
            ));
        }
    }

    if link_type == LinkType::Outer && field.outer_link_field.is_none() {
        return Err(invalid_link(meta, field, "outerLinkField is not specified"));
    }
    Ok(())
}

/// Every outer link of `meta` must reflect an existing far-side field that
/// can link back.
fn check_outer_links(meta: &Meta<'_>) -> Result<(), Error> {
    for field in meta.fields() {
        if !field.is_outer() {
            continue;
        }
        let target = meta.link_meta(field).ok_or_else(|| {
            link_target_not_found(meta.name(), field, field.link_meta.as_deref().unwrap_or_default())
        })?;
        let outer_name = field.outer_link_field.as_deref().unwrap_or_default();
        let outer = target.find_field(outer_name).ok_or_else(|| MetaError::FieldNotFound {
            meta: target.name().to_string(),
            field: outer_name.to_string(),
        })?;
        if !target.can_be_link_to(outer, meta) {
            return Err(invalid_link(
                meta.name(),
                field,
                format!(
                    "field '{}' of object '{}' can't refer to object '{}'",
                    outer.name,
                    target.name(),
                    meta.name()
                ),
            ));
        }
    }
    Ok(())
}
