//! Reverse edges and integrity checks over the task dependency graph.

use std::collections::{BTreeMap, BTreeSet};

use super::entry::TaskEntry;
use crate::ids::TaskId;

/// In-memory `dependency -> dependents` index rebuilt from forward edges.
#[derive(Clone, Debug, Default)]
pub struct DependentsIndex(BTreeMap<TaskId, BTreeSet<TaskId>>);

impl DependentsIndex {
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a TaskEntry>) -> Self {
        let mut index: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();
        for entry in entries {
            for dep in &entry.pending_dependencies {
                index.entry(*dep).or_default().insert(entry.id());
            }
        }
        Self(index)
    }

    pub fn dependents_of(&self, id: &TaskId) -> impl Iterator<Item = &TaskId> {
        self.0.get(id).into_iter().flat_map(|s| s.iter())
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Returns a task lying on a dependency cycle, if there is one. Edges to tasks
/// outside `entries` are ignored.
pub fn find_cycle<'a>(entries: impl IntoIterator<Item = &'a TaskEntry>) -> Option<TaskId> {
    let edges: BTreeMap<TaskId, Vec<TaskId>> = entries
        .into_iter()
        .map(|e| (e.id(), e.pending_dependencies.iter().copied().collect()))
        .collect();

    let mut marks: BTreeMap<TaskId, Mark> = BTreeMap::new();

    for root in edges.keys() {
        if marks.contains_key(root) {
            continue;
        }

        // (node, index of the next edge to visit)
        let mut stack = vec![(*root, 0usize)];
        marks.insert(*root, Mark::InProgress);

        while let Some((node, next)) = stack.last_mut() {
            let deps = &edges[&*node];
            if *next == deps.len() {
                marks.insert(*node, Mark::Done);
                stack.pop();
                continue;
            }

            let dep = deps[*next];
            *next += 1;

            if !edges.contains_key(&dep) {
                continue;
            }
            match marks.get(&dep) {
                Some(Mark::InProgress) => return Some(dep),
                Some(Mark::Done) => {}
                None => {
                    marks.insert(dep, Mark::InProgress);
                    stack.push((dep, 0));
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block::{BlockRef, MAIN_SHARD_ID},
        buf::Buf32,
        ids::BatchId,
    };

    fn block_ref(n: u64) -> BlockRef {
        BlockRef::new(MAIN_SHARD_ID, n, Buf32::new([n as u8; 32]))
    }

    #[test]
    fn test_dependents_index() {
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        let a = TaskEntry::new_block_proof(&mut agg, &block_ref(1), 0);
        let b = TaskEntry::new_block_proof(&mut agg, &block_ref(2), 0);

        let index = DependentsIndex::build([&agg, &a, &b]);
        assert_eq!(index.dependents_of(&a.id()).collect::<Vec<_>>(), vec![&agg.id()]);
        assert_eq!(index.dependents_of(&agg.id()).count(), 0);
    }

    #[test]
    fn test_find_cycle() {
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        let mut leaf = TaskEntry::new_block_proof(&mut agg, &block_ref(1), 0);
        assert_eq!(find_cycle([&agg, &leaf]), None);

        leaf.add_dependency(agg.id());
        let found = find_cycle([&agg, &leaf]);
        assert!(found == Some(agg.id()) || found == Some(leaf.id()));

        let mut selfish = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        selfish.add_dependency(selfish.id());
        assert_eq!(find_cycle([&selfish]), Some(selfish.id()));
    }

    #[test]
    fn test_find_cycle_ignores_unknown_edges() {
        let mut agg = TaskEntry::new_aggregate_proofs(BatchId::new(), 0);
        agg.add_dependency(TaskId::new());
        assert_eq!(find_cycle([&agg]), None);
    }
}
