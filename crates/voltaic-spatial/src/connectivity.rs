//! Face-adjacency and connected-component discovery.
//!
//! All searches are iterative BFS over a FIFO queue with a visited set, so
//! each position is queued at most once and large networks cannot blow the
//! stack. The result of a search is a set; visit order is not part of the
//! contract.

use std::collections::{BTreeSet, VecDeque};

use crate::{BlockPos, SpatialError};

// ---------------------------------------------------------------------------
// Free functions over any occupancy predicate
// ---------------------------------------------------------------------------

/// Occupied face neighbours of `pos` (at most six), in direction order.
pub fn neighbors_in<F>(pos: BlockPos, is_occupied: F) -> Vec<BlockPos>
where
    F: Fn(&BlockPos) -> bool,
{
    pos.adjacent().filter(|p| is_occupied(p)).collect()
}

/// Every occupied position reachable from `start` through occupied faces.
///
/// Returns an empty set if `start` itself is not occupied.
pub fn component_containing_in<F>(start: BlockPos, is_occupied: F) -> BTreeSet<BlockPos>
where
    F: Fn(&BlockPos) -> bool,
{
    let mut visited = BTreeSet::new();
    if !is_occupied(&start) {
        return visited;
    }

    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for neighbor in current.adjacent() {
            if is_occupied(&neighbor) && visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }
    visited
}

/// Partition `positions` into connected components.
///
/// Only positions in `positions` count as occupied. Components are returned
/// in order of their smallest position.
pub fn components_of<'a, I>(positions: I) -> Vec<BTreeSet<BlockPos>>
where
    I: IntoIterator<Item = &'a BlockPos>,
{
    let mut remaining: BTreeSet<BlockPos> = positions.into_iter().copied().collect();
    let occupied = remaining.clone();
    let mut components = Vec::new();

    while let Some(&start) = remaining.iter().next() {
        let component = component_containing_in(start, |p| occupied.contains(p));
        for pos in &component {
            remaining.remove(pos);
        }
        components.push(component);
    }
    components
}

// ---------------------------------------------------------------------------
// ConnectivityGraph
// ---------------------------------------------------------------------------

/// The set of occupied grid positions, with adjacency and component queries.
///
/// Adjacency is implicit: two occupied positions are connected when they
/// share a face. Nothing about node contents is stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityGraph {
    occupied: BTreeSet<BlockPos>,
}

impl ConnectivityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a set of occupied positions. Duplicates collapse.
    pub fn from_positions<I: IntoIterator<Item = BlockPos>>(positions: I) -> Self {
        Self {
            occupied: positions.into_iter().collect(),
        }
    }

    // -- Occupancy --

    /// Mark a position occupied.
    pub fn insert(&mut self, pos: BlockPos) -> Result<(), SpatialError> {
        if !self.occupied.insert(pos) {
            return Err(SpatialError::Occupied(pos));
        }
        Ok(())
    }

    /// Clear a position.
    pub fn remove(&mut self, pos: BlockPos) -> Result<(), SpatialError> {
        if !self.occupied.remove(&pos) {
            return Err(SpatialError::NotOccupied(pos));
        }
        Ok(())
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.occupied.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.occupied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.occupied.iter().copied()
    }

    // -- Queries --

    /// Occupied face neighbours of `pos`. `pos` itself need not be occupied.
    pub fn neighbors_of(&self, pos: BlockPos) -> Vec<BlockPos> {
        neighbors_in(pos, |p| self.occupied.contains(p))
    }

    /// Positions reachable from `pos`, including `pos`. Empty if `pos` is
    /// not occupied.
    pub fn component_containing(&self, pos: BlockPos) -> BTreeSet<BlockPos> {
        component_containing_in(pos, |p| self.occupied.contains(p))
    }

    /// All connected components.
    pub fn components(&self) -> Vec<BTreeSet<BlockPos>> {
        components_of(&self.occupied)
    }

    /// Whether every occupied position is reachable from every other.
    /// An empty graph counts as connected.
    pub fn is_connected(&self) -> bool {
        match self.occupied.iter().next() {
            Some(&start) => self.component_containing(start).len() == self.occupied.len(),
            None => true,
        }
    }

    /// Components that would exist among `pos`'s former neighbours if
    /// `pos` were cleared, assuming the graph was connected before.
    ///
    /// Only the neighbours' components are searched, so the cost is bounded
    /// by the size of the affected network rather than the whole grid.
    pub fn components_after_removal(&self, pos: BlockPos) -> Vec<BTreeSet<BlockPos>> {
        let is_occupied = |p: &BlockPos| *p != pos && self.occupied.contains(p);
        let mut components: Vec<BTreeSet<BlockPos>> = Vec::new();
        for neighbor in neighbors_in(pos, is_occupied) {
            if components.iter().any(|c| c.contains(&neighbor)) {
                continue;
            }
            components.push(component_containing_in(neighbor, is_occupied));
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos::new(x, y, z)
    }

    fn line(len: i32) -> ConnectivityGraph {
        ConnectivityGraph::from_positions((0..len).map(|x| p(x, 0, 0)))
    }

    // -----------------------------------------------------------------------
    // Occupancy
    // -----------------------------------------------------------------------

    #[test]
    fn insert_and_remove() {
        let mut graph = ConnectivityGraph::new();
        graph.insert(p(0, 0, 0)).unwrap();
        assert!(graph.contains(p(0, 0, 0)));
        assert_eq!(graph.insert(p(0, 0, 0)), Err(SpatialError::Occupied(p(0, 0, 0))));

        graph.remove(p(0, 0, 0)).unwrap();
        assert!(graph.is_empty());
        assert_eq!(
            graph.remove(p(0, 0, 0)),
            Err(SpatialError::NotOccupied(p(0, 0, 0)))
        );
    }

    // -----------------------------------------------------------------------
    // Neighbours
    // -----------------------------------------------------------------------

    #[test]
    fn neighbors_ignore_diagonals() {
        let graph = ConnectivityGraph::from_positions([
            p(1, 0, 0),
            p(0, 1, 0),
            p(0, 0, 1),
            p(1, 1, 0),
            p(1, 1, 1),
        ]);
        let neighbors = graph.neighbors_of(p(0, 0, 0));
        assert_eq!(neighbors.len(), 3);
        assert!(!neighbors.contains(&p(1, 1, 0)));
        assert!(!neighbors.contains(&p(1, 1, 1)));
    }

    #[test]
    fn fully_surrounded_has_six_neighbors() {
        let center = p(0, 0, 0);
        let graph = ConnectivityGraph::from_positions(center.adjacent());
        assert_eq!(graph.neighbors_of(center).len(), 6);
    }

    // -----------------------------------------------------------------------
    // Components
    // -----------------------------------------------------------------------

    #[test]
    fn component_of_unoccupied_is_empty() {
        let graph = line(3);
        assert!(graph.component_containing(p(9, 9, 9)).is_empty());
    }

    #[test]
    fn line_is_one_component() {
        let graph = line(10);
        assert_eq!(graph.component_containing(p(4, 0, 0)).len(), 10);
        assert!(graph.is_connected());
        assert_eq!(graph.components().len(), 1);
    }

    #[test]
    fn gap_makes_two_components() {
        let mut graph = line(5);
        graph.remove(p(2, 0, 0)).unwrap();
        let components = graph.components();
        assert_eq!(components.len(), 2);
        assert_eq!(components[0], BTreeSet::from([p(0, 0, 0), p(1, 0, 0)]));
        assert_eq!(components[1], BTreeSet::from([p(3, 0, 0), p(4, 0, 0)]));
        assert!(!graph.is_connected());
    }

    #[test]
    fn vertical_adjacency_connects() {
        let graph = ConnectivityGraph::from_positions([p(0, 0, 0), p(0, 1, 0), p(0, 2, 0), p(0, 2, 1)]);
        assert!(graph.is_connected());
    }

    #[test]
    fn large_component_does_not_recurse() {
        // 100k cells in a snake; a recursive search would overflow.
        let graph = ConnectivityGraph::from_positions((0..100_000).map(|x| p(x, 0, 0)));
        assert_eq!(graph.component_containing(p(0, 0, 0)).len(), 100_000);
    }

    #[test]
    fn components_of_slice() {
        let positions = [p(0, 0, 0), p(0, 0, 1), p(5, 5, 5)];
        let components = components_of(&positions);
        assert_eq!(components.len(), 2);
        assert_eq!(components.iter().map(|c| c.len()).sum::<usize>(), 3);
    }

    // -----------------------------------------------------------------------
    // Removal analysis
    // -----------------------------------------------------------------------

    #[test]
    fn removing_middle_of_line_splits() {
        let graph = line(3);
        let parts = graph.components_after_removal(p(1, 0, 0));
        assert_eq!(parts.len(), 2);
        assert!(parts.contains(&BTreeSet::from([p(0, 0, 0)])));
        assert!(parts.contains(&BTreeSet::from([p(2, 0, 0)])));
    }

    #[test]
    fn removing_end_of_line_keeps_one() {
        let graph = line(3);
        let parts = graph.components_after_removal(p(2, 0, 0));
        assert_eq!(parts, vec![BTreeSet::from([p(0, 0, 0), p(1, 0, 0)])]);
    }

    #[test]
    fn removing_from_ring_keeps_one() {
        // 3x3 ring around an empty centre.
        let ring = [
            p(0, 0, 0),
            p(1, 0, 0),
            p(2, 0, 0),
            p(2, 0, 1),
            p(2, 0, 2),
            p(1, 0, 2),
            p(0, 0, 2),
            p(0, 0, 1),
        ];
        let graph = ConnectivityGraph::from_positions(ring);
        let parts = graph.components_after_removal(p(1, 0, 0));
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 7);
    }

    #[test]
    fn removing_hub_of_star_gives_six() {
        let center = p(0, 0, 0);
        let mut positions: Vec<_> = center.adjacent().collect();
        positions.push(center);
        let graph = ConnectivityGraph::from_positions(positions);
        assert_eq!(graph.components_after_removal(center).len(), 6);
    }

    #[test]
    fn removing_isolated_gives_none() {
        let graph = ConnectivityGraph::from_positions([p(0, 0, 0)]);
        assert!(graph.components_after_removal(p(0, 0, 0)).is_empty());
    }
}
