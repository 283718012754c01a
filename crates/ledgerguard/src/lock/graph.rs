//! Wait-for graph used for deadlock detection.
//!
//! Edges run from a waiting agent to the locks it is blocked on; a lock
//! resolves to the agent currently holding it. A deadlock is a cycle in the
//! induced agent → agent graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::record::LockId;

/// Adjacency from waiting agents to the locks they are blocked on.
#[derive(Debug, Default, Clone)]
pub(super) struct WaitForGraph {
    waits: BTreeMap<String, BTreeSet<LockId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    InProgress,
    Done,
}

impl WaitForGraph {
    pub(super) fn add(&mut self, agent_id: &str, lock_id: LockId) {
        self.waits
            .entry(agent_id.to_string())
            .or_default()
            .insert(lock_id);
    }

    pub(super) fn remove(&mut self, agent_id: &str, lock_id: &LockId) {
        if let Some(locks) = self.waits.get_mut(agent_id) {
            locks.remove(lock_id);
            if locks.is_empty() {
                self.waits.remove(agent_id);
            }
        }
    }

    pub(super) fn clear(&mut self) {
        self.waits.clear();
    }

    /// Every lock some agent is waiting on.
    pub(super) fn awaited_locks(&self) -> BTreeSet<LockId> {
        self.waits.values().flatten().cloned().collect()
    }

    #[cfg(test)]
    pub(super) fn waiting_agents(&self) -> usize {
        self.waits.len()
    }

    /// Finds a cycle reachable from `start`.
    ///
    /// `owners` maps each awaited lock to its live holder. The returned cycle
    /// lists each agent once, rotated to begin at `start` when `start` lies on
    /// it.
    pub(super) fn find_cycle(
        &self,
        start: &str,
        owners: &HashMap<LockId, String>,
    ) -> Option<Vec<String>> {
        let mut colours: HashMap<String, Colour> = HashMap::new();
        let mut path: Vec<String> = Vec::new();
        let mut cycle = self.visit(start, owners, &mut colours, &mut path)?;
        if let Some(position) = cycle.iter().position(|agent| agent == start) {
            cycle.rotate_left(position);
        }
        Some(cycle)
    }

    fn visit(
        &self,
        agent: &str,
        owners: &HashMap<LockId, String>,
        colours: &mut HashMap<String, Colour>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        colours.insert(agent.to_string(), Colour::InProgress);
        path.push(agent.to_string());

        for holder in self.successors(agent, owners) {
            match colours.get(holder) {
                Some(Colour::InProgress) => {
                    let start = path.iter().position(|entry| entry == holder)?;
                    return Some(path.split_off(start));
                }
                Some(Colour::Done) => {}
                None => {
                    if let Some(cycle) = self.visit(holder, owners, colours, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        colours.insert(agent.to_string(), Colour::Done);
        None
    }

    fn successors<'a>(
        &'a self,
        agent: &'a str,
        owners: &'a HashMap<LockId, String>,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.waits
            .get(agent)
            .into_iter()
            .flatten()
            .filter_map(|lock_id| owners.get(lock_id))
            .map(String::as_str)
            .filter(move |holder| *holder != agent)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rstest::rstest;

    use super::*;

    fn lock(name: &str) -> LockId {
        LockId::for_resource(Path::new(name))
    }

    /// Builds a ring where agent `i` holds lock `i` and waits on lock `i + 1`.
    fn ring(size: usize) -> (WaitForGraph, HashMap<LockId, String>) {
        let mut graph = WaitForGraph::default();
        let mut owners = HashMap::new();
        for index in 0..size {
            let agent = format!("a{index}");
            owners.insert(lock(&format!("r{index}")), agent.clone());
            graph.add(&agent, lock(&format!("r{}", (index + 1) % size)));
        }
        (graph, owners)
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    fn every_member_of_a_ring_sees_the_whole_cycle(#[case] size: usize) {
        let (graph, owners) = ring(size);
        for index in 0..size {
            let start = format!("a{index}");
            let cycle = graph.find_cycle(&start, &owners).expect("cycle");
            assert_eq!(cycle.len(), size);
            assert_eq!(cycle.first(), Some(&start));
            let members: BTreeSet<_> = cycle.iter().collect();
            assert_eq!(members.len(), size);
        }
    }

    #[test]
    fn chain_without_back_edge_has_no_cycle() {
        let mut graph = WaitForGraph::default();
        let mut owners = HashMap::new();
        owners.insert(lock("r1"), "a1".to_string());
        owners.insert(lock("r2"), "a2".to_string());
        graph.add("a0", lock("r1"));
        graph.add("a1", lock("r2"));

        assert!(graph.find_cycle("a0", &owners).is_none());
        assert!(graph.find_cycle("a2", &owners).is_none());
    }

    #[test]
    fn diamond_terminates_without_cycle() {
        let mut graph = WaitForGraph::default();
        let mut owners = HashMap::new();
        owners.insert(lock("rb"), "b".to_string());
        owners.insert(lock("rc"), "c".to_string());
        owners.insert(lock("rd"), "d".to_string());
        graph.add("a", lock("rb"));
        graph.add("a", lock("rc"));
        graph.add("b", lock("rd"));
        graph.add("c", lock("rd"));

        assert!(graph.find_cycle("a", &owners).is_none());
    }

    #[test]
    fn cycle_reachable_from_outsider_is_reported() {
        let (mut graph, mut owners) = ring(2);
        owners.insert(lock("entry"), "a0".to_string());
        graph.add("outsider", lock("entry"));

        let cycle = graph.find_cycle("outsider", &owners).expect("cycle");
        assert_eq!(cycle.len(), 2);
        assert!(!cycle.contains(&"outsider".to_string()));
    }

    #[test]
    fn unheld_locks_contribute_no_edges() {
        let mut graph = WaitForGraph::default();
        graph.add("a1", lock("r1"));
        assert!(graph.find_cycle("a1", &HashMap::new()).is_none());
    }

    #[test]
    fn removing_last_wait_drops_the_agent() {
        let mut graph = WaitForGraph::default();
        graph.add("a1", lock("r1"));
        graph.remove("a1", &lock("r1"));
        assert_eq!(graph.waiting_agents(), 0);
        assert!(graph.awaited_locks().is_empty());
    }
}
