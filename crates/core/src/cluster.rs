//! Duplicate grouping.
//!
//! Turns the raw "is near-duplicate of" relation reported by a similarity backend into connected
//! components. The relation may be asymmetric; edges are treated as undirected.
//!
//! ### Ordering
//! - Nodes are interned in first-seen order (keys in iteration order, each followed by its values).
//! - Components are discovered by depth-first traversal from each unvisited node in that order.
//! - Multi-member components are emitted before singletons; discovery order is kept within each
//!   partition. The output is therefore deterministic for a fixed input.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::ImageName;

/// Ordered mapping `image -> near-duplicate images`.
///
/// Keeps key insertion order so that grouping never depends on hash iteration order. Lookups go
/// through a name → position index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateRelation {
    entries: Vec<(ImageName, Vec<ImageName>)>,
    index: HashMap<ImageName, usize>,
}

impl DuplicateRelation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duplicates of `name`, replacing any earlier entry while keeping its position.
    pub fn insert(&mut self, name: impl Into<ImageName>, duplicates: Vec<ImageName>) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&pos) => self.entries[pos].1 = duplicates,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, duplicates));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&[ImageName]> {
        self.index.get(name).map(|&pos| self.entries[pos].1.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ImageName, &[ImageName])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reorder the relation into `working_set` order.
    ///
    /// Only names from the working set survive, as keys or as values. Every working-set name gets
    /// an entry, so images the backend did not mention still come out as singleton groups. Repeated
    /// working-set names collapse to their first position.
    pub fn ordered_by(&self, working_set: &[ImageName]) -> DuplicateRelation {
        let allowed: HashSet<&str> = working_set.iter().map(String::as_str).collect();

        let mut ordered = DuplicateRelation::new();
        for name in working_set {
            if ordered.contains(name) {
                continue;
            }
            let duplicates: Vec<ImageName> = self
                .get(name)
                .map(|dups| {
                    dups.iter()
                        .filter(|d| allowed.contains(d.as_str()) && *d != name)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            ordered.insert(name.clone(), duplicates);
        }
        ordered
    }
}

impl FromIterator<(ImageName, Vec<ImageName>)> for DuplicateRelation {
    fn from_iter<I: IntoIterator<Item = (ImageName, Vec<ImageName>)>>(iter: I) -> Self {
        let mut relation = DuplicateRelation::new();
        for (name, dups) in iter {
            relation.insert(name, dups);
        }
        relation
    }
}

/// One connected component of the duplicate graph, in discovery order.
pub type DuplicateGroup = Vec<ImageName>;

/// Name interning arena: names are stored once and referenced by index.
#[derive(Default)]
struct Arena {
    names: Vec<ImageName>,
    index: HashMap<ImageName, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl Arena {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        self.adjacency.push(Vec::new());
        id
    }

    fn connect(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        if !self.adjacency[a].contains(&b) {
            self.adjacency[a].push(b);
        }
        if !self.adjacency[b].contains(&a) {
            self.adjacency[b].push(a);
        }
    }
}

/// Group images into connected components, multi-member groups first.
pub fn build_groups(relation: &DuplicateRelation) -> Vec<DuplicateGroup> {
    let mut arena = Arena::default();
    for (name, duplicates) in relation.iter() {
        let a = arena.intern(name);
        for other in duplicates {
            let b = arena.intern(other);
            arena.connect(a, b);
        }
    }

    let mut visited = vec![false; arena.names.len()];
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..arena.names.len() {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);
            // Reverse so neighbours are popped in first-seen order, matching recursive DFS.
            for &next in arena.adjacency[node].iter().rev() {
                if !visited[next] {
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }

    let (multi, singles): (Vec<_>, Vec<_>) = components.into_iter().partition(|c| c.len() > 1);

    multi
        .into_iter()
        .chain(singles)
        .map(|component| component.into_iter().map(|id| arena.names[id].clone()).collect())
        .collect()
}

/// Final clustering delivered to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterResult {
    /// All groups, multi-member groups first.
    pub duplicate_images_grouped: Vec<DuplicateGroup>,
    /// Concatenation of every group in order.
    pub sorted_images: Vec<ImageName>,
    /// Concatenation of the multi-member groups only.
    pub duplicate_images: Vec<ImageName>,
}

impl ClusterResult {
    pub fn from_groups(groups: Vec<DuplicateGroup>) -> Self {
        let sorted_images = groups.iter().flatten().cloned().collect();
        let duplicate_images = groups
            .iter()
            .filter(|g| g.len() > 1)
            .flatten()
            .cloned()
            .collect();
        Self { duplicate_images_grouped: groups, sorted_images, duplicate_images }
    }

    /// Number of groups with more than one member.
    pub fn duplicate_group_count(&self) -> usize {
        self.duplicate_images_grouped.iter().filter(|g| g.len() > 1).count()
    }
}
