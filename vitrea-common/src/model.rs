//! Entity (data object) model
//!
//! Every domain object carries a stable remote identity, a loaded-vs-reference
//! state, and a dirty flag gating whether local mutations are pushed upstream.
//! Entities are created either fresh on the client (no id yet, dirty) or as a
//! hydration of a server response.

use crate::mutator::{MutableSetItem, SetMutator};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Remote identity assigned by the store once an entity is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Domain object kinds in the containment hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Project,
    Dataset,
    Screen,
    Plate,
    Well,
    Image,
}

impl EntityKind {
    /// Container kinds hold children in the hierarchy; images are leaves.
    pub fn is_container(self) -> bool {
        !matches!(self, EntityKind::Image)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Project => "Project",
            EntityKind::Dataset => "Dataset",
            EntityKind::Screen => "Screen",
            EntityKind::Plate => "Plate",
            EntityKind::Well => "Well",
            EntityKind::Image => "Image",
        };
        f.write_str(s)
    }
}

/// Reconciliation key: remote id when persisted, reference token otherwise.
///
/// Two distinct unsaved entities are never "the same", even if they carry
/// equal names; once persisted, identity follows the remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Persisted(EntityKind, EntityId),
    Unsaved(u64),
}

static NEXT_REF_TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_ref_token() -> u64 {
    NEXT_REF_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// A domain object with remote identity and dirty/loaded state
#[derive(Debug, Clone)]
pub struct Entity {
    id: Option<EntityId>,
    kind: EntityKind,
    loaded: bool,
    dirty: bool,
    ref_token: u64,
    name: String,
    description: Option<String>,
    linked: Vec<Entity>,
}

impl Entity {
    /// Fresh unsaved entity: no id yet, dirty until persisted
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            loaded: true,
            dirty: true,
            ref_token: next_ref_token(),
            name: name.into(),
            description: None,
            linked: Vec::new(),
        }
    }

    /// Reference-only entity: identity known, no detail available
    pub fn reference(kind: EntityKind, id: EntityId) -> Self {
        Self {
            id: Some(id),
            kind,
            loaded: false,
            dirty: false,
            ref_token: next_ref_token(),
            name: String::new(),
            description: None,
            linked: Vec::new(),
        }
    }

    /// Hydration of a server response. `complete` reflects payload
    /// completeness: a shallow payload produces a loaded=false reference.
    pub fn hydrate(
        kind: EntityKind,
        id: EntityId,
        name: impl Into<String>,
        description: Option<String>,
        complete: bool,
    ) -> Self {
        Self {
            id: Some(id),
            kind,
            loaded: complete,
            dirty: false,
            ref_token: next_ref_token(),
            name: name.into(),
            description,
            linked: Vec::new(),
        }
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn require_loaded(&self) -> Result<()> {
        if !self.loaded {
            return Err(Error::NotLoaded(format!(
                "{} {}",
                self.kind,
                self.id.map(|i| i.to_string()).unwrap_or_default()
            )));
        }
        Ok(())
    }

    pub fn name(&self) -> Result<&str> {
        self.require_loaded()?;
        Ok(&self.name)
    }

    pub fn description(&self) -> Result<Option<&str>> {
        self.require_loaded()?;
        Ok(self.description.as_deref())
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.dirty = true;
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.dirty = true;
    }

    /// Identity is immutable once assigned.
    pub fn set_id(&mut self, id: EntityId) -> Result<()> {
        if self.id.is_some() {
            return Err(Error::ImmutableField("id"));
        }
        self.id = Some(id);
        Ok(())
    }

    /// Record a successful remote save: assigns the id when missing and
    /// clears the dirty flag. The only path by which dirty clears.
    pub fn mark_persisted(&mut self, id: EntityId) -> Result<()> {
        match self.id {
            None => self.id = Some(id),
            Some(existing) if existing == id => {}
            Some(_) => return Err(Error::ImmutableField("id")),
        }
        self.dirty = false;
        self.loaded = true;
        Ok(())
    }

    /// Entities linked to this one (e.g. the images of a dataset)
    pub fn linked(&self) -> Result<&[Entity]> {
        self.require_loaded()?;
        Ok(&self.linked)
    }

    pub fn size_of_linked(&self) -> Result<usize> {
        self.require_loaded()?;
        Ok(self.linked.len())
    }

    /// Reconcile the linked collection against `desired`.
    ///
    /// Drives a [`SetMutator`] over the current collection, marking dirty
    /// once per applied addition or deletion, and returns the diff so the
    /// caller can issue one unlink/link side effect per element.
    pub fn set_linked(&mut self, desired: Vec<Entity>) -> Result<LinkDiff> {
        self.require_loaded()?;
        let mut m = SetMutator::new(&self.linked, &desired);
        let mut removed = Vec::new();
        let mut added = Vec::new();
        while m.more_deletions() {
            self.dirty = true;
            removed.push(m.next_deletion());
        }
        while m.more_additions() {
            self.dirty = true;
            added.push(m.next_addition());
        }
        self.linked = m.result();
        Ok(LinkDiff { removed, added })
    }

    /// Dual identity rule: id equality for persisted pairs, reference
    /// identity otherwise.
    pub fn same_as(&self, other: &Entity) -> bool {
        self.set_key() == other.set_key()
    }
}

impl MutableSetItem for Entity {
    type Key = EntityKey;

    fn set_key(&self) -> EntityKey {
        match self.id {
            Some(id) => EntityKey::Persisted(self.kind, id),
            None => EntityKey::Unsaved(self.ref_token),
        }
    }
}

/// Applied link changes, one remote side effect owed per element
#[derive(Debug, Default)]
pub struct LinkDiff {
    pub removed: Vec<Entity>,
    pub added: Vec<Entity>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_entity_is_dirty_and_unsaved() {
        let e = Entity::new(EntityKind::Dataset, "d1");
        assert!(e.id().is_none());
        assert!(e.is_dirty());
        assert!(e.is_loaded());
    }

    #[test]
    fn reference_rejects_detail_access() {
        let e = Entity::reference(EntityKind::Image, EntityId(5));
        assert!(!e.is_loaded());
        assert!(matches!(e.name(), Err(Error::NotLoaded(_))));
        assert!(matches!(e.linked(), Err(Error::NotLoaded(_))));
    }

    #[test]
    fn id_is_immutable_once_set() {
        let mut e = Entity::new(EntityKind::Project, "p");
        e.set_id(EntityId(1)).unwrap();
        assert!(matches!(
            e.set_id(EntityId(2)),
            Err(Error::ImmutableField("id"))
        ));
    }

    #[test]
    fn mark_persisted_clears_dirty() {
        let mut e = Entity::new(EntityKind::Image, "img");
        assert!(e.is_dirty());
        e.mark_persisted(EntityId(42)).unwrap();
        assert!(!e.is_dirty());
        assert_eq!(e.id(), Some(EntityId(42)));

        // Dirty is monotonic within an edit session until the next save.
        e.set_name("img2");
        assert!(e.is_dirty());
        e.mark_persisted(EntityId(42)).unwrap();
        assert!(!e.is_dirty());
    }

    #[test]
    fn mark_persisted_with_conflicting_id_fails() {
        let mut e = Entity::hydrate(EntityKind::Image, EntityId(1), "img", None, true);
        assert!(matches!(
            e.mark_persisted(EntityId(2)),
            Err(Error::ImmutableField("id"))
        ));
    }

    #[test]
    fn setters_mark_dirty() {
        let mut e = Entity::hydrate(EntityKind::Dataset, EntityId(3), "d", None, true);
        assert!(!e.is_dirty());
        e.set_description(Some("desc".to_string()));
        assert!(e.is_dirty());
    }

    #[test]
    fn persisted_identity_follows_remote_id() {
        let a = Entity::hydrate(EntityKind::Image, EntityId(9), "a", None, true);
        let b = Entity::hydrate(EntityKind::Image, EntityId(9), "b", None, true);
        assert!(a.same_as(&b));
    }

    #[test]
    fn unsaved_entities_are_distinct() {
        let a = Entity::new(EntityKind::Image, "same");
        let b = Entity::new(EntityKind::Image, "same");
        assert!(!a.same_as(&b));
        assert!(a.same_as(&a.clone()));
    }

    #[test]
    fn set_linked_reconciles_and_marks_dirty() {
        let img1 = Entity::hydrate(EntityKind::Image, EntityId(1), "i1", None, true);
        let img2 = Entity::hydrate(EntityKind::Image, EntityId(2), "i2", None, true);
        let img3 = Entity::hydrate(EntityKind::Image, EntityId(3), "i3", None, true);

        let mut d = Entity::hydrate(EntityKind::Dataset, EntityId(10), "d", None, true);
        d.set_linked(vec![img1.clone(), img2.clone()]).unwrap();
        d.mark_persisted(EntityId(10)).unwrap();

        let diff = d.set_linked(vec![img2.clone(), img3.clone()]).unwrap();
        assert!(d.is_dirty());
        assert_eq!(diff.removed.len(), 1);
        assert!(diff.removed[0].same_as(&img1));
        assert_eq!(diff.added.len(), 1);
        assert!(diff.added[0].same_as(&img3));

        let linked = d.linked().unwrap();
        assert_eq!(linked.len(), 2);
        assert!(linked.iter().any(|e| e.same_as(&img2)));
        assert!(linked.iter().any(|e| e.same_as(&img3)));
    }

    #[test]
    fn set_linked_noop_leaves_clean() {
        let img = Entity::hydrate(EntityKind::Image, EntityId(1), "i", None, true);
        let mut d = Entity::hydrate(EntityKind::Dataset, EntityId(10), "d", None, true);
        d.set_linked(vec![img.clone()]).unwrap();
        d.mark_persisted(EntityId(10)).unwrap();

        let diff = d.set_linked(vec![img]).unwrap();
        assert!(!d.is_dirty());
        assert!(diff.removed.is_empty());
        assert!(diff.added.is_empty());
    }
}
