//! Composite hierarchy tree
//!
//! A polymorphic display tree mirroring the remote containment hierarchy
//! (Project→Dataset→Image, or Screen→Plate→Well→Image). Container nodes hold
//! children; leaf nodes never do. Nodes live in an arena indexed by
//! [`NodeId`]; parent and children are stored as indices, so reattachment
//! never fights ownership.
//!
//! Traversal follows a visitor protocol with three algorithms: leaves only,
//! containers only, or every node. Visits are depth-first, children before
//! self.
//!
//! Node equality is reference identity: two nodes wrapping equal entities are
//! still distinct nodes, which is what lets `add_child`/`remove_child` work
//! by id.

use crate::store::RemoteStore;
use vitrea_common::{Entity, EntityId, Error, Result};

/// Gap between the node name and the item count in display labels
const SPACE: &str = "    ";

/// Arena index of one node. Stable for the lifetime of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Node variant: containers hold children, leaves never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Leaf,
}

/// Traversal algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalMode {
    /// Visit only leaf nodes, descending through containers without
    /// visiting them
    LeafOnly,
    /// Visit only container nodes, never descending into a leaf's subtree
    ContainerOnly,
    /// Visit every node
    All,
}

impl TraversalMode {
    /// Resolve a mode by name at API boundaries where the selector arrives
    /// as data rather than as a typed value.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "leaf_only" => Ok(Self::LeafOnly),
            "container_only" => Ok(Self::ContainerOnly),
            "all" => Ok(Self::All),
            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Visitor capability: one method per node variant. Dispatch happens in
/// [`HierarchyTree::accept`] by matching the variant of each visited node.
pub trait HierarchyVisitor {
    fn visit_container(&mut self, tree: &HierarchyTree, node: NodeId);
    fn visit_leaf(&mut self, tree: &HierarchyTree, node: NodeId);
}

/// One node in the display tree
#[derive(Debug)]
pub struct HierarchyNode {
    entity: Entity,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Cached child count; -1 means not yet fetched
    number_of_items: i64,
    tooltip: Option<String>,
    highlight: Option<String>,
}

impl HierarchyNode {
    fn new(entity: Entity, kind: NodeKind) -> Self {
        Self {
            entity,
            kind,
            parent: None,
            children: Vec::new(),
            number_of_items: -1,
            tooltip: None,
            highlight: None,
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn number_of_items(&self) -> i64 {
        self.number_of_items
    }
}

/// Arena-backed hierarchy tree
#[derive(Debug, Default)]
pub struct HierarchyTree {
    nodes: Vec<HierarchyNode>,
}

impl HierarchyTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container node wrapping `entity`. The entity is taken by
    /// value; a node without one cannot be expressed.
    pub fn new_container(&mut self, entity: Entity) -> NodeId {
        self.insert(HierarchyNode::new(entity, NodeKind::Container))
    }

    /// Create a leaf node wrapping `entity`. Its children set is always
    /// empty.
    pub fn new_leaf(&mut self, entity: Entity) -> NodeId {
        self.insert(HierarchyNode::new(entity, NodeKind::Leaf))
    }

    fn insert(&mut self, node: HierarchyNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node, failing with [`Error::NullNode`] for an id that is
    /// not in this tree.
    pub fn node(&self, id: NodeId) -> Result<&HierarchyNode> {
        self.nodes.get(id.0).ok_or(Error::NullNode)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HierarchyNode> {
        self.nodes.get_mut(id.0).ok_or(Error::NullNode)
    }

    /// Find the first node wrapping the entity with the given remote id
    pub fn find_by_entity(&self, entity_id: EntityId) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.entity.id() == Some(entity_id))
            .map(NodeId)
    }

    /// Attach `child` under `parent`.
    ///
    /// No-op if `child` is already a direct child of `parent`. A child
    /// currently attached elsewhere is first detached from its old parent,
    /// keeping the parent back-pointer invariant transactional.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.node(parent)?.children.contains(&child) {
            return Ok(());
        }
        if let Some(old_parent) = self.node(child)?.parent {
            self.remove_child(old_parent, child)?;
        }
        self.node_mut(child)?.parent = Some(parent);
        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(child);
        parent_node.number_of_items = parent_node.children.len() as i64;
        Ok(())
    }

    /// Detach `child` from `parent`, orphaning it.
    ///
    /// No-op if `child` is not currently a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(child)?;
        let parent_node = self.node_mut(parent)?;
        let Some(pos) = parent_node.children.iter().position(|&c| c == child) else {
            return Ok(());
        };
        parent_node.children.remove(pos);
        parent_node.number_of_items = parent_node.children.len() as i64;
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    /// Detach every child of `node`.
    ///
    /// The children set is snapshotted before iterating; removal mutates the
    /// set being iterated.
    pub fn remove_all_children(&mut self, node: NodeId) -> Result<()> {
        let snapshot = self.node(node)?.children.clone();
        for child in snapshot {
            self.remove_child(node, child)?;
        }
        self.node_mut(node)?.number_of_items = 0;
        Ok(())
    }

    /// Depth-first, children-before-self traversal from `node`, dispatching
    /// to the visitor method matching each visited node's variant.
    pub fn accept(
        &self,
        node: NodeId,
        visitor: &mut dyn HierarchyVisitor,
        mode: TraversalMode,
    ) -> Result<()> {
        let current = self.node(node)?;
        match mode {
            TraversalMode::LeafOnly => {
                for &child in &current.children {
                    self.accept(child, visitor, mode)?;
                }
                if current.kind == NodeKind::Leaf {
                    visitor.visit_leaf(self, node);
                }
            }
            TraversalMode::ContainerOnly => {
                for &child in &current.children {
                    // Never descend into a subtree rooted at a leaf.
                    if self.node(child)?.kind == NodeKind::Container {
                        self.accept(child, visitor, mode)?;
                    }
                }
                if current.kind == NodeKind::Container {
                    visitor.visit_container(self, node);
                }
            }
            TraversalMode::All => {
                for &child in &current.children {
                    self.accept(child, visitor, mode)?;
                }
                match current.kind {
                    NodeKind::Container => visitor.visit_container(self, node),
                    NodeKind::Leaf => visitor.visit_leaf(self, node),
                }
            }
        }
        Ok(())
    }

    /// Name of the wrapped entity, empty when the entity is only a reference
    pub fn node_name(&self, id: NodeId) -> Result<String> {
        Ok(self.node(id)?.entity.name().unwrap_or("").to_string())
    }

    /// Display label: entity name, plus an item-count suffix for containers
    /// ("N item"/"N items", "..." while the count is unknown).
    pub fn node_text(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        let name = node.entity.name().unwrap_or("").to_string();
        if node.kind == NodeKind::Leaf {
            return Ok(name);
        }
        if node.number_of_items == -1 {
            return Ok(format!("{}{}...", name, SPACE));
        }
        let suffix = if node.number_of_items == 1 {
            "item"
        } else {
            "items"
        };
        Ok(format!(
            "{}{}{} {}",
            name, SPACE, node.number_of_items, suffix
        ))
    }

    pub fn tooltip(&self, id: NodeId) -> Result<Option<&str>> {
        Ok(self.node(id)?.tooltip.as_deref())
    }

    pub fn set_tooltip(&mut self, id: NodeId, tooltip: impl Into<String>) -> Result<()> {
        self.node_mut(id)?.tooltip = Some(tooltip.into());
        Ok(())
    }

    pub fn highlight(&self, id: NodeId) -> Result<Option<&str>> {
        Ok(self.node(id)?.highlight.as_deref())
    }

    pub fn set_highlight(&mut self, id: NodeId, highlight: Option<String>) -> Result<()> {
        self.node_mut(id)?.highlight = highlight;
        Ok(())
    }

    pub fn has_children(&self, id: NodeId) -> Result<bool> {
        Ok(!self.node(id)?.children.is_empty())
    }

    /// True when at least one direct child is a leaf
    pub fn contains_leaves(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        for &child in &node.children {
            if self.node(child)?.kind == NodeKind::Leaf {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lazily populate a container's children from the remote hierarchy.
    ///
    /// No-op once the node has a known count. Children arrive as entities;
    /// container kinds become container nodes (count unknown until their own
    /// population), images become leaves.
    pub fn populate_children(&mut self, store: &dyn RemoteStore, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        if node.kind != NodeKind::Container || node.number_of_items != -1 {
            return Ok(());
        }
        let Some(entity_id) = node.entity.id() else {
            return Ok(());
        };
        let children = store.load_children(entity_id)?;
        for child in children {
            let child_node = if child.kind().is_container() {
                self.new_container(child)
            } else {
                self.new_leaf(child)
            };
            self.add_child(id, child_node)?;
        }
        // An empty container is now known to be empty, not unloaded.
        let node = self.node_mut(id)?;
        if node.children.is_empty() {
            node.number_of_items = 0;
        }
        Ok(())
    }
}

/// Build a display tree from the remote hierarchy roots, populating one
/// level below each root.
pub fn build_from_store(store: &dyn RemoteStore, roots: &[Entity]) -> Result<(HierarchyTree, Vec<NodeId>)> {
    let mut tree = HierarchyTree::new();
    let mut root_ids = Vec::with_capacity(roots.len());
    for root in roots {
        let id = if root.kind().is_container() {
            tree.new_container(root.clone())
        } else {
            tree.new_leaf(root.clone())
        };
        tree.populate_children(store, id)?;
        root_ids.push(id);
    }
    Ok((tree, root_ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitrea_common::EntityKind;

    fn entity(kind: EntityKind, id: i64, name: &str) -> Entity {
        Entity::hydrate(kind, EntityId(id), name, None, true)
    }

    /// Project→[Dataset1→[Img1, Img2], Dataset2→[]]
    fn sample_tree() -> (HierarchyTree, NodeId, [NodeId; 4]) {
        let mut tree = HierarchyTree::new();
        let project = tree.new_container(entity(EntityKind::Project, 1, "p"));
        let ds1 = tree.new_container(entity(EntityKind::Dataset, 2, "d1"));
        let ds2 = tree.new_container(entity(EntityKind::Dataset, 3, "d2"));
        let img1 = tree.new_leaf(entity(EntityKind::Image, 4, "i1"));
        let img2 = tree.new_leaf(entity(EntityKind::Image, 5, "i2"));
        tree.add_child(project, ds1).unwrap();
        tree.add_child(project, ds2).unwrap();
        tree.add_child(ds1, img1).unwrap();
        tree.add_child(ds1, img2).unwrap();
        (tree, project, [ds1, ds2, img1, img2])
    }

    #[derive(Default)]
    struct Collector {
        containers: Vec<String>,
        leaves: Vec<String>,
    }

    impl HierarchyVisitor for Collector {
        fn visit_container(&mut self, tree: &HierarchyTree, node: NodeId) {
            self.containers.push(tree.node_name(node).unwrap());
        }

        fn visit_leaf(&mut self, tree: &HierarchyTree, node: NodeId) {
            self.leaves.push(tree.node_name(node).unwrap());
        }
    }

    #[test]
    fn add_child_is_idempotent() {
        let (mut tree, _, [ds1, _, img1, _]) = sample_tree();
        let before = tree.node(ds1).unwrap().children().len();
        tree.add_child(ds1, img1).unwrap();
        assert_eq!(tree.node(ds1).unwrap().children().len(), before);
        assert_eq!(tree.node(ds1).unwrap().number_of_items(), before as i64);
    }

    #[test]
    fn add_child_reattaches_from_old_parent() {
        let (mut tree, _, [ds1, ds2, img1, _]) = sample_tree();
        assert_eq!(tree.node(ds1).unwrap().number_of_items(), 2);

        tree.add_child(ds2, img1).unwrap();
        assert!(!tree.node(ds1).unwrap().children().contains(&img1));
        assert!(tree.node(ds2).unwrap().children().contains(&img1));
        assert_eq!(tree.node(img1).unwrap().parent(), Some(ds2));
        assert_eq!(tree.node(ds1).unwrap().number_of_items(), 1);
        assert_eq!(tree.node(ds2).unwrap().number_of_items(), 1);
    }

    #[test]
    fn remove_child_orphans_the_child() {
        let (mut tree, _, [ds1, _, img1, _]) = sample_tree();
        tree.remove_child(ds1, img1).unwrap();
        assert_eq!(tree.node(img1).unwrap().parent(), None);
        assert_eq!(tree.node(ds1).unwrap().number_of_items(), 1);

        // Removing a non-child is a no-op.
        tree.remove_child(ds1, img1).unwrap();
        assert_eq!(tree.node(ds1).unwrap().number_of_items(), 1);
    }

    #[test]
    fn remove_all_children_detaches_everything() {
        let (mut tree, project, [ds1, ds2, _, _]) = sample_tree();
        tree.remove_all_children(project).unwrap();
        assert!(tree.node(project).unwrap().children().is_empty());
        assert_eq!(tree.node(project).unwrap().number_of_items(), 0);
        assert_eq!(tree.node(ds1).unwrap().parent(), None);
        assert_eq!(tree.node(ds2).unwrap().parent(), None);
    }

    #[test]
    fn leaf_only_visits_exactly_the_images() {
        let (tree, project, _) = sample_tree();
        let mut visitor = Collector::default();
        tree.accept(project, &mut visitor, TraversalMode::LeafOnly)
            .unwrap();
        assert_eq!(visitor.leaves, vec!["i1", "i2"]);
        assert!(visitor.containers.is_empty());
    }

    #[test]
    fn container_only_visits_exactly_the_containers() {
        let (tree, project, _) = sample_tree();
        let mut visitor = Collector::default();
        tree.accept(project, &mut visitor, TraversalMode::ContainerOnly)
            .unwrap();
        assert_eq!(visitor.containers, vec!["d1", "d2", "p"]);
        assert!(visitor.leaves.is_empty());
    }

    #[test]
    fn all_nodes_visits_children_before_self() {
        let (tree, project, _) = sample_tree();
        let mut visitor = Collector::default();
        tree.accept(project, &mut visitor, TraversalMode::All)
            .unwrap();
        assert_eq!(visitor.leaves, vec!["i1", "i2"]);
        // Post-order: the project root comes last.
        assert_eq!(visitor.containers.last().map(String::as_str), Some("p"));
    }

    #[test]
    fn node_text_counts_items() {
        let (mut tree, project, [ds1, ds2, img1, _]) = sample_tree();
        assert_eq!(tree.node_text(ds1).unwrap(), "d1    2 items");
        tree.remove_all_children(ds2).unwrap();
        assert_eq!(tree.node_text(ds2).unwrap(), "d2    0 items");
        assert_eq!(tree.node_text(img1).unwrap(), "i1");

        let one_item = tree.node_text(project);
        assert!(one_item.is_ok());

        let mut only_one = HierarchyTree::new();
        let d = only_one.new_container(entity(EntityKind::Dataset, 9, "d"));
        let i = only_one.new_leaf(entity(EntityKind::Image, 10, "i"));
        only_one.add_child(d, i).unwrap();
        assert_eq!(only_one.node_text(d).unwrap(), "d    1 item");
    }

    #[test]
    fn node_text_shows_ellipsis_while_count_unknown() {
        let mut tree = HierarchyTree::new();
        let d = tree.new_container(entity(EntityKind::Dataset, 1, "d"));
        assert_eq!(tree.node(d).unwrap().number_of_items(), -1);
        assert_eq!(tree.node_text(d).unwrap(), "d    ...");
    }

    #[test]
    fn stale_node_id_is_rejected() {
        let (mut tree, project, _) = sample_tree();
        let bogus = NodeId(999);
        assert!(matches!(
            tree.add_child(project, bogus),
            Err(Error::NullNode)
        ));
        assert!(matches!(
            tree.add_child(bogus, project),
            Err(Error::NullNode)
        ));
        assert!(matches!(tree.node_text(bogus), Err(Error::NullNode)));
    }

    #[test]
    fn unknown_traversal_name_is_rejected() {
        assert!(matches!(
            TraversalMode::from_name("breadth_first"),
            Err(Error::UnsupportedAlgorithm(_))
        ));
        assert_eq!(
            TraversalMode::from_name("leaf_only").unwrap(),
            TraversalMode::LeafOnly
        );
    }

    #[test]
    fn contains_leaves_checks_direct_children_only() {
        let (tree, project, [ds1, ..]) = sample_tree();
        assert!(tree.contains_leaves(ds1).unwrap());
        assert!(!tree.contains_leaves(project).unwrap());
    }
}
