//! Arena-backed R-tree for boundary candidate lookups.
//!
//! The tree is bulk-loaded once with sort-tile-recursive packing and never
//! mutated afterwards. Nodes live in a flat vector and refer to each other
//! by [`NodeId`]; children are always stored before their parent.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use super::geometry::validate_geometry;
use crate::error::{GeometryError, IndexError};
use crate::models::{BoundingBox, Geometry, GeometryRecord};

/// Handle of a node inside a [`SpatialTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A feature stored in a leaf, together with its bounding box.
///
/// The geometry is checked when the item is created or deserialized; the
/// outcome is kept in [`IndexItem::defect`] so queries never re-validate.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    bbox: BoundingBox,
    feature_id: String,
    geometry: Geometry,
    defect: Option<GeometryError>,
}

impl IndexItem {
    pub fn new(feature_id: impl Into<String>, bbox: BoundingBox, geometry: Geometry) -> Self {
        let defect = validate_geometry(&geometry).err();
        Self {
            bbox,
            feature_id: feature_id.into(),
            geometry,
            defect,
        }
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Why this item's geometry cannot be tested, if it cannot
    pub fn defect(&self) -> Option<&GeometryError> {
        self.defect.as_ref()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemRecord {
    bbox: BoundingBox,
    feature_id: String,
    geometry: GeometryRecord,
}

impl Serialize for IndexItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ItemRecord {
            bbox: self.bbox,
            feature_id: self.feature_id.clone(),
            geometry: GeometryRecord::from(&self.geometry),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IndexItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let record = ItemRecord::deserialize(deserializer)?;
        Ok(IndexItem::new(
            record.feature_id,
            record.bbox,
            Geometry::from(record.geometry),
        ))
    }
}

/// Tree node: a leaf with items or an internal node with children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexNode {
    Leaf {
        bbox: BoundingBox,
        items: Vec<IndexItem>,
    },
    Internal {
        bbox: BoundingBox,
        children: Vec<NodeId>,
    },
}

impl IndexNode {
    pub fn bbox(&self) -> &BoundingBox {
        match self {
            IndexNode::Leaf { bbox, .. } | IndexNode::Internal { bbox, .. } => bbox,
        }
    }
}

/// Static R-tree over [`IndexItem`]s
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialTree {
    root: Option<NodeId>,
    nodes: Vec<IndexNode>,
}

impl SpatialTree {
    /// Maximum fanout used when no other capacity is requested
    pub const DEFAULT_NODE_CAPACITY: usize = 16;

    /// Bulk-load items with sort-tile-recursive packing.
    ///
    /// Every leaf ends up at the same depth and no node holds more than
    /// `node_capacity` entries (clamped to at least 2).
    pub fn bulk_load(items: Vec<IndexItem>, node_capacity: usize) -> Self {
        let capacity = node_capacity.max(2);
        let mut tree = SpatialTree::default();
        if items.is_empty() {
            return tree;
        }

        let item_count = items.len();
        let mut level: Vec<NodeId> = str_partition(items, capacity, |item| item.bbox.center())
            .into_iter()
            .filter_map(|items| {
                let bbox = BoundingBox::union_all(items.iter().map(|i| &i.bbox))?;
                Some(tree.push(IndexNode::Leaf { bbox, items }))
            })
            .collect();

        while level.len() > 1 {
            let nodes = &tree.nodes;
            let groups = str_partition(level, capacity, |id| nodes[id.index()].bbox().center());
            level = groups
                .into_iter()
                .filter_map(|children| {
                    let bbox = BoundingBox::union_all(
                        children.iter().map(|id| tree.nodes[id.index()].bbox()),
                    )?;
                    Some(tree.push(IndexNode::Internal { bbox, children }))
                })
                .collect();
        }

        tree.root = level.first().copied();
        debug!(
            "Bulk-loaded {} items into {} nodes (height {})",
            item_count,
            tree.nodes.len(),
            tree.height()
        );
        tree
    }

    fn push(&mut self, node: IndexNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&IndexNode> {
        self.nodes.get(id.index())
    }

    pub fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    /// All items whose bounding box intersects `envelope`
    pub fn search(&self, envelope: &BoundingBox) -> Vec<&IndexItem> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();

        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if !node.bbox().intersects(envelope) {
                continue;
            }
            match node {
                IndexNode::Leaf { items, .. } => {
                    found.extend(items.iter().filter(|item| item.bbox.intersects(envelope)));
                }
                IndexNode::Internal { children, .. } => {
                    stack.extend(children.iter().rev().copied());
                }
            }
        }

        found
    }

    /// Items whose bounding box contains the point
    pub fn locate_point(&self, x: f64, y: f64) -> Vec<&IndexItem> {
        self.search(&BoundingBox::from_point(x, y))
    }

    /// Iterate over every stored item
    pub fn items(&self) -> impl Iterator<Item = &IndexItem> {
        self.nodes.iter().flat_map(|node| match node {
            IndexNode::Leaf { items, .. } => items.as_slice(),
            IndexNode::Internal { .. } => &[],
        })
    }

    pub fn len(&self) -> usize {
        self.items().count()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of node levels from root to leaves
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut current = self.root;
        while let Some(node) = current.and_then(|id| self.node(id)) {
            height += 1;
            current = match node {
                IndexNode::Leaf { .. } => None,
                IndexNode::Internal { children, .. } => children.first().copied(),
            };
        }
        height
    }

    /// Check structural invariants of a deserialized tree.
    ///
    /// Returns the number of items reachable from the root.
    pub fn verify(&self) -> Result<usize, IndexError> {
        let corrupt = |msg: String| Err(IndexError::Structure(msg));

        let Some(root) = self.root else {
            if !self.nodes.is_empty() {
                return corrupt(format!("{} nodes but no root", self.nodes.len()));
            }
            return Ok(0);
        };
        if root.index() >= self.nodes.len() {
            return corrupt(format!("root {} out of range", root.index()));
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut items = 0;
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            let slot = id.index();
            if visited[slot] {
                return corrupt(format!("node {slot} is referenced twice"));
            }
            visited[slot] = true;

            match &self.nodes[slot] {
                IndexNode::Leaf { bbox, items: leaf } => {
                    if BoundingBox::union_all(leaf.iter().map(|i| &i.bbox)) != Some(*bbox) {
                        return corrupt(format!(
                            "leaf {slot} box is not the union of its items"
                        ));
                    }
                    items += leaf.len();
                }
                IndexNode::Internal { bbox, children } => {
                    if let Some(child) = children.iter().find(|c| c.index() >= slot) {
                        return corrupt(format!(
                            "node {slot} has child {} that is not stored before it",
                            child.index()
                        ));
                    }
                    let union = BoundingBox::union_all(
                        children.iter().map(|c| self.nodes[c.index()].bbox()),
                    );
                    if union != Some(*bbox) {
                        return corrupt(format!(
                            "node {slot} box is not the union of its children"
                        ));
                    }
                    stack.extend(children.iter().copied());
                }
            }
        }

        if let Some(orphan) = visited.iter().position(|seen| !seen) {
            return corrupt(format!("node {orphan} is not reachable from the root"));
        }

        Ok(items)
    }
}

/// Sort-tile-recursive grouping of `entries` into runs of at most `capacity`.
fn str_partition<T, F>(mut entries: Vec<T>, capacity: usize, center: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> (f64, f64),
{
    let group_count = entries.len().div_ceil(capacity);
    let slice_count = (group_count as f64).sqrt().ceil() as usize;
    let slice_len = slice_count.max(1) * capacity;

    entries.sort_by(|a, b| center(a).0.total_cmp(&center(b).0));

    let mut groups = Vec::with_capacity(group_count);
    let mut remaining = entries.into_iter();
    loop {
        let mut slice: Vec<T> = remaining.by_ref().take(slice_len).collect();
        if slice.is_empty() {
            break;
        }
        slice.sort_by(|a, b| center(a).1.total_cmp(&center(b).1));

        let mut run = slice.into_iter();
        loop {
            let group: Vec<T> = run.by_ref().take(capacity).collect();
            if group.is_empty() {
                break;
            }
            groups.push(group);
        }
    }
    groups
}
