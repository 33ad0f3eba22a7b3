//! Catalog Tree
//!
//! Arena representation of the Section → Category → Service forest.
//!
//! Nodes live behind `Arc`, so cloning a `Catalog` copies pointers only and a
//! primitive deep-copies just the nodes it touches. Every primitive takes
//! `&self` and returns a new `Catalog`; the receiver stays an untouched
//! snapshot usable for rollback.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{DomainError, DomainResult};
use crate::models::{
    CategoryPayload, Level, Node, NodeId, ParentRef, SectionPayload, ServicePayload,
};

/// The in-memory catalog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    nodes: HashMap<NodeId, Arc<Node>>,
    roots: Vec<NodeId>,
}

/// A node detached by `remove_subtree`, together with all its descendants.
/// The root is unchanged; its parent is rewritten on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtree {
    root: Arc<Node>,
    descendants: Vec<Arc<Node>>,
}

impl Subtree {
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn id(&self) -> &NodeId {
        &self.root.id
    }

    pub fn level(&self) -> Level {
        self.root.level
    }

    /// Number of nodes, the root included
    pub fn len(&self) -> usize {
        1 + self.descendants.len()
    }

    fn nodes(&self) -> impl Iterator<Item = &Arc<Node>> {
        std::iter::once(&self.root).chain(self.descendants.iter())
    }
}

/// Where a node sits in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub level: Level,
    pub parent: ParentRef,
    /// 0-based rank among its siblings
    pub index: usize,
    /// Length of its own child list
    pub child_count: usize,
}

/// Id → location index over a whole catalog.
///
/// Built by a full scan; it is not kept fresh, callers rebuild it from the
/// current tree for every decision.
#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    entries: HashMap<NodeId, Location>,
    root_count: usize,
}

impl CatalogIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut entries = HashMap::with_capacity(catalog.len());

        fn collect(
            catalog: &Catalog,
            parent: &ParentRef,
            ids: &[NodeId],
            entries: &mut HashMap<NodeId, Location>,
        ) {
            for (index, id) in ids.iter().enumerate() {
                let Some(node) = catalog.get(id) else { continue };
                entries.insert(
                    id.clone(),
                    Location {
                        level: node.level,
                        parent: parent.clone(),
                        index,
                        child_count: node.children.len(),
                    },
                );
                collect(catalog, &ParentRef::Node(id.clone()), &node.children, entries);
            }
        }

        collect(catalog, &ParentRef::Root, &catalog.roots, &mut entries);

        Self {
            entries,
            root_count: catalog.roots.len(),
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<&Location> {
        self.entries.get(id)
    }

    pub fn root_count(&self) -> usize {
        self.root_count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Clamp a requested position to `[0, len]`
pub fn clamp_index(index: i32, len: usize) -> usize {
    if index <= 0 {
        0
    } else {
        (index as usize).min(len)
    }
}

/// Rank as carried on the wire; `None` past `i32::MAX`
pub fn wire_index(index: usize) -> Option<i32> {
    i32::try_from(index).ok()
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the nested server payload. Duplicate ids are rejected.
    pub fn from_payload(sections: Vec<SectionPayload>) -> DomainResult<Self> {
        let mut catalog = Catalog::new();

        for section in sections {
            let section_id = section.id.clone();
            let mut node = Node::new(section.id, Level::Section, section.name, ParentRef::Root);
            node.description = section.description;
            node.extra = section.extra;
            catalog.push_node(node)?;

            for category in section.categories {
                let category_id = category.id.clone();
                let mut node = Node::new(
                    category.id,
                    Level::Category,
                    category.name,
                    ParentRef::Node(section_id.clone()),
                );
                node.description = category.description;
                node.extra = category.extra;
                catalog.push_node(node)?;

                for service in category.services {
                    let mut node = Node::new(
                        service.id,
                        Level::Service,
                        service.name,
                        ParentRef::Node(category_id.clone()),
                    );
                    node.description = service.description;
                    node.extra = service.extra;
                    catalog.push_node(node)?;
                }
            }
        }

        Ok(catalog)
    }

    pub fn from_json(json: &str) -> DomainResult<Self> {
        let sections: Vec<SectionPayload> = serde_json::from_str(json)?;
        Self::from_payload(sections)
    }

    /// Nested payload in tree order, back-references filled from the tree
    pub fn to_payload(&self) -> Vec<SectionPayload> {
        self.roots
            .iter()
            .filter_map(|id| self.get(id))
            .map(|section| SectionPayload {
                id: section.id.clone(),
                name: section.name.clone(),
                description: section.description.clone(),
                extra: section.extra.clone(),
                categories: self
                    .children(&section.id)
                    .map(|category| CategoryPayload {
                        id: category.id.clone(),
                        name: category.name.clone(),
                        description: category.description.clone(),
                        section_id: Some(section.id.clone()),
                        extra: category.extra.clone(),
                        services: self
                            .children(&category.id)
                            .map(|service| ServicePayload {
                                id: service.id.clone(),
                                name: service.name.clone(),
                                description: service.description.clone(),
                                category_id: Some(category.id.clone()),
                                extra: service.extra.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(&self.to_payload())
            .map_err(|e| DomainError::Internal(e.to_string()))
    }

    /// Append a node under its declared parent (used while building)
    fn push_node(&mut self, node: Node) -> DomainResult<()> {
        if node.id.is_root() {
            return Err(DomainError::InvalidInput(format!("{} is a reserved id", node.id)));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(DomainError::Conflict(format!("Duplicate id {}", node.id)));
        }
        let id = node.id.clone();
        let parent = node.parent.clone();
        self.list_mut(&parent)
            .ok_or_else(|| DomainError::NotFound(format!("Parent {} not found", parent)))?
            .push(id.clone());
        self.nodes.insert(id, Arc::new(node));
        Ok(())
    }

    /// Ordered Section ids
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Ordered child ids under a parent (the root list for `ParentRef::Root`)
    pub fn child_ids(&self, parent: &ParentRef) -> Option<&[NodeId]> {
        match parent {
            ParentRef::Root => Some(&self.roots),
            ParentRef::Node(id) => self.get(id).map(|n| n.children.as_slice()),
        }
    }

    /// Iterate the children of a node in order
    pub fn children<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Node> + 'a {
        self.get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter_map(move |child| self.get(child))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Locate a single node without building a full index
    pub fn locate(&self, id: &NodeId) -> Option<Location> {
        let node = self.get(id)?;
        let index = self
            .child_ids(&node.parent)?
            .iter()
            .position(|sibling| sibling == id)?;
        Some(Location {
            level: node.level,
            parent: node.parent.clone(),
            index,
            child_count: node.children.len(),
        })
    }

    /// The one accessor for "the list a parent owns", whatever its level
    fn list_mut(&mut self, parent: &ParentRef) -> Option<&mut Vec<NodeId>> {
        match parent {
            ParentRef::Root => Some(&mut self.roots),
            ParentRef::Node(id) => self
                .nodes
                .get_mut(id)
                .map(|node| &mut Arc::make_mut(node).children),
        }
    }

    /// Detach a node and its descendants.
    ///
    /// The parent keeps its (possibly now empty) child list.
    pub fn remove_subtree(&self, id: &NodeId) -> DomainResult<(Catalog, Subtree)> {
        let parent = self
            .get(id)
            .map(|n| n.parent.clone())
            .ok_or_else(|| DomainError::NotFound(format!("Node {} not found", id)))?;

        let mut next = self.clone();
        next.list_mut(&parent)
            .ok_or_else(|| DomainError::NotFound(format!("Parent {} not found", parent)))?
            .retain(|sibling| sibling != id);

        let root = next
            .nodes
            .remove(id)
            .ok_or_else(|| DomainError::NotFound(format!("Node {} not found", id)))?;
        let mut descendants = Vec::new();
        let mut to_visit: Vec<NodeId> = root.children.iter().rev().cloned().collect();
        while let Some(current) = to_visit.pop() {
            if let Some(node) = next.nodes.remove(&current) {
                to_visit.extend(node.children.iter().rev().cloned());
                descendants.push(node);
            }
        }

        Ok((next, Subtree { root, descendants }))
    }

    /// Insert a detached subtree under `parent` at `index` (clamped to `[0, len]`).
    ///
    /// Fails when the parent does not exist or sits at a level that cannot own
    /// the subtree's root.
    pub fn insert_at(&self, parent: &ParentRef, index: i32, subtree: Subtree) -> DomainResult<Catalog> {
        let level = subtree.level();
        let parent_level = match parent {
            ParentRef::Root => None,
            ParentRef::Node(pid) => Some(
                self.get(pid)
                    .ok_or_else(|| DomainError::NotFound(format!("Parent {} not found", pid)))?
                    .level,
            ),
        };
        if level.parent_level() != parent_level {
            return Err(DomainError::InvalidInput(format!(
                "A {} cannot be placed under {}",
                level, parent
            )));
        }
        if let Some(dup) = subtree.nodes().find(|n| self.nodes.contains_key(&n.id)) {
            return Err(DomainError::Conflict(format!("Node {} is already in the catalog", dup.id)));
        }

        let mut next = self.clone();
        let Subtree { mut root, descendants } = subtree;
        let list = next
            .list_mut(parent)
            .ok_or_else(|| DomainError::NotFound(format!("Parent {} not found", parent)))?;
        let at = clamp_index(index, list.len());
        list.insert(at, root.id.clone());

        Arc::make_mut(&mut root).parent = parent.clone();
        next.nodes.insert(root.id.clone(), root);
        for node in descendants {
            next.nodes.insert(node.id.clone(), node);
        }

        Ok(next)
    }

    /// Verify the partition invariants: every node is listed exactly once,
    /// under a parent of the right level that it points back to.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let mut seen: HashSet<NodeId> = HashSet::with_capacity(self.nodes.len());

        let mut check_list = |parent: &ParentRef, parent_level: Option<Level>, ids: &[NodeId]| -> DomainResult<()> {
            for id in ids {
                if !seen.insert(id.clone()) {
                    return Err(DomainError::Internal(format!("Node {} listed twice", id)));
                }
                let node = self.get(id).ok_or_else(|| {
                    DomainError::Internal(format!("Node {} listed under {} but missing", id, parent))
                })?;
                if node.parent != *parent {
                    return Err(DomainError::Internal(format!(
                        "Node {} points to {} but is listed under {}",
                        id, node.parent, parent
                    )));
                }
                if node.level.parent_level() != parent_level {
                    return Err(DomainError::Internal(format!(
                        "A {} cannot sit under {}",
                        node.level, parent
                    )));
                }
            }
            Ok(())
        };

        check_list(&ParentRef::Root, None, &self.roots)?;
        for node in self.nodes.values() {
            check_list(&ParentRef::Node(node.id.clone()), Some(node.level), &node.children)?;
        }

        if seen.len() != self.nodes.len() {
            return Err(DomainError::Internal(format!(
                "{} nodes are not reachable from the root",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// S1 { X [a, b, c], Y [] }, S2 { Z [t] }
    pub(crate) fn sample_catalog() -> Catalog {
        let payload = json!([
            {
                "id": "S1", "nombre": "Peluqueria",
                "categorias": [
                    {
                        "id": "X", "nombre": "Cortes",
                        "servicios": [
                            { "id": "a", "nombre": "Corte", "costo": 50, "precio_publico": 120 },
                            { "id": "b", "nombre": "Barba" },
                            { "id": "c", "nombre": "Lavado" }
                        ]
                    },
                    { "id": "Y", "nombre": "Color", "servicios": [] }
                ]
            },
            {
                "id": "S2", "nombre": "Spa", "descripcion": "Tratamientos",
                "categorias": [
                    { "id": "Z", "nombre": "Masajes", "servicios": [ { "id": "t", "nombre": "Relajante" } ] }
                ]
            }
        ]);
        Catalog::from_json(&payload.to_string()).unwrap()
    }

    pub(crate) fn ids(catalog: &Catalog, parent: &str) -> Vec<String> {
        let parent = ParentRef::from(parent.to_string());
        catalog
            .child_ids(&parent)
            .unwrap()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn test_from_payload_builds_hierarchy() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 9);
        assert_eq!(ids(&catalog, "root"), vec!["S1", "S2"]);
        assert_eq!(ids(&catalog, "X"), vec!["a", "b", "c"]);
        assert!(ids(&catalog, "Y").is_empty());

        let a = catalog.get(&NodeId::from("a")).unwrap();
        assert_eq!(a.level, Level::Service);
        assert_eq!(a.parent, ParentRef::Node(NodeId::from("X")));
        assert_eq!(a.extra.get("costo"), Some(&json!(50)));
        catalog.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let payload = json!([
            { "id": "S1", "nombre": "A", "categorias": [ { "id": "S1", "nombre": "B" } ] }
        ]);
        let err = Catalog::from_json(&payload.to_string()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn test_payload_round_trip_fills_back_references() {
        let catalog = sample_catalog();
        let payload = catalog.to_payload();
        assert_eq!(payload[0].categories[0].section_id, Some(NodeId::from("S1")));
        assert_eq!(payload[0].categories[0].services[2].category_id, Some(NodeId::from("X")));
        assert_eq!(Catalog::from_payload(payload).unwrap(), catalog);
    }

    #[test]
    fn test_index_matches_locate() {
        let catalog = sample_catalog();
        let index = CatalogIndex::build(&catalog);
        assert_eq!(index.len(), catalog.len());
        assert_eq!(index.root_count(), 2);

        let c = NodeId::from("c");
        let loc = index.get(&c).unwrap();
        assert_eq!(loc.level, Level::Service);
        assert_eq!(loc.parent, ParentRef::Node(NodeId::from("X")));
        assert_eq!(loc.index, 2);
        assert_eq!(catalog.locate(&c).as_ref(), Some(loc));

        let s2 = index.get(&NodeId::from("S2")).unwrap();
        assert_eq!(s2.parent, ParentRef::Root);
        assert_eq!(s2.index, 1);
        assert_eq!(s2.child_count, 1);
    }

    #[test]
    fn test_remove_subtree_leaves_snapshot_untouched() {
        let catalog = sample_catalog();
        let before = catalog.clone();

        let (next, removed) = catalog.remove_subtree(&NodeId::from("X")).unwrap();
        assert_eq!(removed.id(), &NodeId::from("X"));
        assert_eq!(removed.len(), 4);
        assert_eq!(removed.root().parent, ParentRef::Node(NodeId::from("S1")));
        assert_eq!(removed.root().children.len(), 3);
        assert_eq!(ids(&next, "S1"), vec!["Y"]);
        assert!(!next.contains(&NodeId::from("a")));
        assert_eq!(catalog, before);
    }

    #[test]
    fn test_leaf_subtree_is_just_its_root() {
        let catalog = sample_catalog();
        let (_, removed) = catalog.remove_subtree(&NodeId::from("b")).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed.id(), &NodeId::from("b"));
        assert_eq!(removed.level(), Level::Service);
    }

    #[test]
    fn test_remove_last_child_keeps_parent() {
        let catalog = sample_catalog();
        let (next, _) = catalog.remove_subtree(&NodeId::from("t")).unwrap();
        assert!(next.contains(&NodeId::from("Z")));
        assert!(ids(&next, "Z").is_empty());
    }

    #[test]
    fn test_remove_unknown_id_is_not_found() {
        let catalog = sample_catalog();
        let err = catalog.remove_subtree(&NodeId::from("nope")).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn test_insert_clamps_index() {
        let catalog = sample_catalog();
        let (without, removed) = catalog.remove_subtree(&NodeId::from("t")).unwrap();

        let appended = without
            .insert_at(&ParentRef::Node(NodeId::from("X")), 99, removed.clone())
            .unwrap();
        assert_eq!(ids(&appended, "X"), vec!["a", "b", "c", "t"]);

        let front = without
            .insert_at(&ParentRef::Node(NodeId::from("X")), -5, removed)
            .unwrap();
        assert_eq!(ids(&front, "X"), vec!["t", "a", "b", "c"]);
        assert_eq!(
            front.get(&NodeId::from("t")).unwrap().parent,
            ParentRef::Node(NodeId::from("X"))
        );
        front.check_invariants().unwrap();
    }

    #[test]
    fn test_insert_under_unknown_parent_fails() {
        let catalog = sample_catalog();
        let (without, removed) = catalog.remove_subtree(&NodeId::from("a")).unwrap();
        let err = without
            .insert_at(&ParentRef::Node(NodeId::from("ghost")), 0, removed)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn test_insert_at_wrong_level_fails() {
        let catalog = sample_catalog();
        let (without, removed) = catalog.remove_subtree(&NodeId::from("a")).unwrap();
        let err = without
            .insert_at(&ParentRef::Node(NodeId::from("S1")), 0, removed.clone())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let err = without.insert_at(&ParentRef::Root, 0, removed).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn test_moving_a_category_carries_its_services() {
        let catalog = sample_catalog();
        let (without, removed) = catalog.remove_subtree(&NodeId::from("X")).unwrap();
        let next = without
            .insert_at(&ParentRef::Node(NodeId::from("S2")), 0, removed)
            .unwrap();

        assert_eq!(ids(&next, "S2"), vec!["X", "Z"]);
        assert_eq!(ids(&next, "X"), vec!["a", "b", "c"]);
        assert_eq!(next.len(), catalog.len());
        next.check_invariants().unwrap();
    }

    #[test]
    fn test_check_invariants_detects_dangling_child() {
        let mut catalog = sample_catalog();
        catalog
            .list_mut(&ParentRef::Node(NodeId::from("Y")))
            .unwrap()
            .push(NodeId::from("a"));
        assert!(catalog.check_invariants().is_err());
    }

    #[test]
    fn test_wire_index_rejects_overflow() {
        assert_eq!(wire_index(7), Some(7));
        assert_eq!(wire_index(i32::MAX as usize), Some(i32::MAX));
        assert_eq!(wire_index(i32::MAX as usize + 1), None);
    }

    proptest::proptest! {
        #[test]
        fn insert_position_is_always_clamped(index in proptest::prelude::any::<i32>()) {
            let catalog = sample_catalog();
            let (without, removed) = catalog.remove_subtree(&NodeId::from("t")).unwrap();
            let next = without
                .insert_at(&ParentRef::Node(NodeId::from("X")), index, removed)
                .unwrap();

            let at = next.locate(&NodeId::from("t")).unwrap().index;
            proptest::prop_assert_eq!(at, clamp_index(index, 3));
            proptest::prop_assert!(at <= 3);
            proptest::prop_assert!(next.check_invariants().is_ok());
        }
    }
}
