use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::store::Entity;

/// Read-only view of the is_a hierarchy recorded in the store.
///
/// Edges come from each entity's `is_a` keys (parent LanguaL codes). The
/// source data is not guaranteed to be acyclic.
pub struct TaxonomyGraph<'a> {
    index: &'a BTreeMap<String, Entity>,
}

impl<'a> TaxonomyGraph<'a> {
    pub fn new(index: &'a BTreeMap<String, Entity>) -> Self {
        Self { index }
    }

    pub fn parents(&self, database_id: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.index
            .get(database_id)
            .into_iter()
            .flat_map(|entity| entity.is_a.keys().map(String::as_str))
    }

    /// Breadth-first walk up the is_a edges from `start`. True as soon as a
    /// parent of any visited node is one of `targets`.
    pub fn is_descendant_of_any<S: AsRef<str>>(&self, start: &str, targets: &[S]) -> bool {
        let targets: HashSet<&str> = targets.iter().map(AsRef::as_ref).collect();
        if targets.is_empty() {
            return false;
        }
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(start);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.parents(current) {
                if targets.contains(parent) {
                    return true;
                }
                if self.index.contains_key(parent) && !visited.contains(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }
}
