//! Node adjacency for the smoothing operator.

use fitter_types::ScaffoldMesh;
use hashbrown::HashSet;

/// Neighbors of each node: nodes sharing at least one element, by storage
/// index, sorted ascending.
///
/// The sorted order keeps system assembly deterministic.
#[must_use]
pub(crate) fn node_neighbors(mesh: &ScaffoldMesh) -> Vec<Vec<usize>> {
    let mut sets: Vec<HashSet<usize>> = vec![HashSet::new(); mesh.node_count()];

    for element_index in 0..mesh.element_count() {
        let Some(node_indices) = mesh.element_node_indices(element_index) else {
            continue;
        };
        for &a in node_indices {
            for &b in node_indices {
                if a != b {
                    sets[a].insert(b);
                }
            }
        }
    }

    sets.into_iter()
        .map(|set| {
            let mut neighbors: Vec<usize> = set.into_iter().collect();
            neighbors.sort_unstable();
            neighbors
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fitter_types::{Element, ElementBasis, ElementShape, Node};
    use nalgebra::Point3;

    #[test]
    fn chain_adjacency() {
        // Two line elements sharing the middle node.
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(2.0, 0.0, 0.0)),
        ];
        let elements = vec![
            Element::new(1, ElementShape::Line, ElementBasis::Linear, vec![1, 2]),
            Element::new(2, ElementShape::Line, ElementBasis::Linear, vec![2, 3]),
        ];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let neighbors = node_neighbors(&mesh);
        assert_eq!(neighbors[0], vec![1]);
        assert_eq!(neighbors[1], vec![0, 2]);
        assert_eq!(neighbors[2], vec![1]);
    }

    #[test]
    fn isolated_node_has_no_neighbors() {
        let nodes = vec![
            Node::at(1, Point3::new(0.0, 0.0, 0.0)),
            Node::at(2, Point3::new(1.0, 0.0, 0.0)),
            Node::at(3, Point3::new(5.0, 5.0, 5.0)),
        ];
        let elements = vec![Element::new(
            1,
            ElementShape::Line,
            ElementBasis::Linear,
            vec![1, 2],
        )];
        let mesh = ScaffoldMesh::new(nodes, elements).unwrap();

        let neighbors = node_neighbors(&mesh);
        assert!(neighbors[2].is_empty());
    }
}
