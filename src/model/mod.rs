mod entity;
mod filter;
mod visitor;

pub use entity::{
    Entity, EntityKind, FileId, Language, NodeId, SourceFile, Span, TypeKind,
};
pub use filter::PackageFilter;
pub use visitor::{Visitor, walk_package, walk_type};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

/// Package that receives declarations found directly in a source root.
pub const GLOBAL_PACKAGE: &str = "+global";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("a {child} cannot be owned by a {container}")]
    InvalidChild {
        container: &'static str,
        child: &'static str,
    },
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// Arena holding every package, type and function of an analyzed codebase.
///
/// Ownership is expressed with [`NodeId`] links only. The arena owns every
/// entity; an entity is referenced by at most one container's collection at
/// any time, and `add_child` moves it out of its previous container first.
#[derive(Debug, Default)]
pub struct CodeModel {
    entities: Vec<Entity>,
    packages: IndexMap<String, NodeId>,
    files: Vec<SourceFile>,
    filter: PackageFilter,
}

impl CodeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn add_file(&mut self, path: PathBuf, language: Language, text: String) -> FileId {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            path,
            language,
            lines: text.lines().count(),
            digest,
            text,
        });
        id
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> + '_ {
        self.files.iter()
    }

    /// Returns the package with the given name, creating it on first use.
    pub fn package(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.packages.get(name) {
            return *id;
        }
        let id = self.push(Entity::new(name, EntityKind::Package));
        self.packages.insert(name.to_string(), id);
        id
    }

    pub fn find_package(&self, name: &str) -> Option<NodeId> {
        self.packages.get(name).copied()
    }

    /// Creates an unowned type. Attach it with [`CodeModel::add_child`].
    pub fn create_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        file: Option<FileId>,
        span: Span,
    ) -> NodeId {
        let mut entity = Entity::new(name, EntityKind::Type(kind));
        entity.file = file;
        entity.span = span;
        self.push(entity)
    }

    /// Creates an unowned function. Owned by a type it is a method.
    pub fn create_function(&mut self, name: &str, file: Option<FileId>, span: Span) -> NodeId {
        let mut entity = Entity::new(name, EntityKind::Function);
        entity.file = file;
        entity.span = span;
        self.push(entity)
    }

    fn push(&mut self, entity: Entity) -> NodeId {
        let id = NodeId(self.entities.len() as u32);
        self.entities.push(entity);
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    pub fn entity(&self, id: NodeId) -> &Entity {
        &self.entities[id.index()]
    }

    pub fn set_span(&mut self, id: NodeId, file: Option<FileId>, span: Span) {
        let entity = &mut self.entities[id.index()];
        entity.file = file;
        entity.span = span;
    }

    pub fn owner(&self, id: NodeId) -> Option<NodeId> {
        self.entity(id).owner
    }

    pub fn is_method(&self, id: NodeId) -> bool {
        self.entity(id).is_function()
            && self
                .owner(id)
                .is_some_and(|owner| self.entity(owner).is_type())
    }

    /// Moves `child` into `container`, removing it from its previous owner.
    pub fn add_child(&mut self, container: NodeId, child: NodeId) -> Result<(), ModelError> {
        let container_kind = self.get(container).ok_or(ModelError::UnknownNode(container))?.kind;
        let child_kind = self.get(child).ok_or(ModelError::UnknownNode(child))?.kind;

        let into_types = match (container_kind, child_kind) {
            (EntityKind::Package, EntityKind::Type(_)) => true,
            (EntityKind::Package | EntityKind::Type(_), EntityKind::Function) => false,
            _ => {
                return Err(ModelError::InvalidChild {
                    container: container_kind.label(),
                    child: child_kind.label(),
                });
            }
        };

        if let Some(previous) = self.entities[child.index()].owner {
            self.detach(previous, child);
        }

        let slot = &mut self.entities[container.index()];
        if into_types {
            slot.types.insert(child);
        } else {
            slot.functions.insert(child);
        }
        self.entities[child.index()].owner = Some(container);
        Ok(())
    }

    /// Removes `child` from `container`. Does nothing unless `container` owns it.
    pub fn remove_child(&mut self, container: NodeId, child: NodeId) {
        if self.get(child).and_then(|e| e.owner) != Some(container) {
            return;
        }
        self.detach(container, child);
        self.entities[child.index()].owner = None;
    }

    fn detach(&mut self, owner: NodeId, child: NodeId) {
        let slot = &mut self.entities[owner.index()];
        slot.types.shift_remove(&child);
        slot.functions.shift_remove(&child);
    }

    pub fn types(&self, container: NodeId) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.entity(container).types.iter().copied()
    }

    pub fn functions(&self, container: NodeId) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.entity(container).functions.iter().copied()
    }

    /// Types first, then functions, each in insertion order.
    pub fn children(&self, container: NodeId) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.types(container).chain(self.functions(container))
    }

    pub fn type_count(&self, container: NodeId) -> usize {
        self.entity(container).types.len()
    }

    pub fn function_count(&self, container: NodeId) -> usize {
        self.entity(container).functions.len()
    }

    pub fn find_type(&self, package: NodeId, name: &str) -> Option<NodeId> {
        self.types(package).find(|id| self.entity(*id).name == name)
    }

    pub fn set_filter(&mut self, filter: PackageFilter) {
        self.filter = filter;
    }

    pub fn filter(&self) -> &PackageFilter {
        &self.filter
    }

    /// Packages accepted by the installed filter, in creation order.
    pub fn packages(&self) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.packages
            .iter()
            .filter(|(name, _)| self.filter.accept(name))
            .map(|(_, id)| *id)
    }

    pub fn all_packages(&self) -> impl Iterator<Item = NodeId> + Clone + '_ {
        self.packages.values().copied()
    }

    pub fn accept<V: Visitor + ?Sized>(&self, id: NodeId, visitor: &mut V) {
        match self.entity(id).kind {
            EntityKind::Package => visitor.visit_package(self, id),
            EntityKind::Type(_) => visitor.visit_type(self, id),
            EntityKind::Function if self.is_method(id) => visitor.visit_method(self, id),
            EntityKind::Function => visitor.visit_function(self, id),
        }
    }

    /// Visits every package accepted by the filter.
    pub fn walk<V: Visitor + ?Sized>(&self, visitor: &mut V) {
        for package in self.packages() {
            self.accept(package, visitor);
        }
    }

    pub fn qualified_name(&self, id: NodeId) -> String {
        let entity = self.entity(id);
        match entity.owner {
            Some(owner) => format!("{}::{}", self.qualified_name(owner), entity.name),
            None => entity.name.clone(),
        }
    }

    /// Short report identifier: `pkg#n`, `Foo#c`, `Bar#i`, `run()#f`, `Foo::run()#m`.
    pub fn node_identifier(&self, id: NodeId) -> String {
        let entity = self.entity(id);
        match entity.kind {
            EntityKind::Package => format!("{}#n", entity.name),
            EntityKind::Type(TypeKind::Class) => format!("{}#c", entity.name),
            EntityKind::Type(TypeKind::Interface) => format!("{}#i", entity.name),
            EntityKind::Function if self.is_method(id) => {
                let owner = entity.owner.map(|o| self.entity(o).name.as_str()).unwrap_or("");
                format!("{}::{}()#m", owner, entity.name)
            }
            EntityKind::Function => format!("{}()#f", entity.name),
        }
    }
}
