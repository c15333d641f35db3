//! 4-connected grid graph over corner candidates.
//!
//! Lattice axes are estimated globally from nearest-neighbor displacements
//! (quadruple-angle averaging, since the two axes are orthogonal and each is
//! only defined modulo pi). Every candidate then gets at most one neighbor
//! per direction, and only mutual relations survive, which keeps spurious
//! candidates from attaching to the board grid.

use std::collections::{HashMap, VecDeque};

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;

use crate::candidates::CornerCandidate;
use crate::params::GridGraphParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f64,
    /// Off-axis ratio of the connecting edge; smaller is better.
    pub score: f64,
}

/// Estimate the two lattice axis directions from the nearest-neighbor
/// displacement of every candidate.
///
/// Returns unit vectors `(u, v)` with `u` the axis closest to image x
/// (pointing right) and `v = rot90(u)` (pointing down).
pub fn estimate_lattice_axes(
    corners: &[CornerCandidate],
) -> Option<(Vector2<f64>, Vector2<f64>)> {
    if corners.len() < 2 {
        return None;
    }

    let coords: Vec<[f64; 2]> = corners
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    // Accumulate in quadruple-angle space: theta, theta + pi/2, theta + pi
    // all describe the same square lattice.
    let mut acc = Vector2::<f64>::zeros();
    for (i, c) in corners.iter().enumerate() {
        let query = [c.position.x, c.position.y];
        for nn in tree.nearest_n::<SquaredEuclidean>(&query, 2) {
            let j = nn.item as usize;
            if j == i {
                continue;
            }
            let d = corners[j].position - c.position;
            let theta = d.y.atan2(d.x);
            acc += Vector2::new((4.0 * theta).cos(), (4.0 * theta).sin());
        }
    }

    if acc.norm_squared() < 1e-9 {
        return None; // no dominant lattice orientation
    }

    let theta_u = 0.25 * acc.y.atan2(acc.x); // in (-pi/4, pi/4]
    let u = Vector2::new(theta_u.cos(), theta_u.sin());
    let v = Vector2::new(-u.y, u.x);
    Some((u, v))
}

/// Median nearest-neighbor distance; the working estimate of one lattice
/// step in image pixels.
fn estimate_base_spacing(corners: &[CornerCandidate], tree: &KdTree<f64, 2>) -> Option<f64> {
    let mut nearest = Vec::with_capacity(corners.len());
    for (i, c) in corners.iter().enumerate() {
        let query = [c.position.x, c.position.y];
        for nn in tree.nearest_n::<SquaredEuclidean>(&query, 2) {
            if nn.item as usize != i {
                nearest.push(nn.distance.sqrt());
            }
        }
    }
    if nearest.is_empty() {
        return None;
    }
    nearest.sort_by(|a, b| a.total_cmp(b));
    Some(nearest[nearest.len() / 2])
}

fn classify_neighbor(
    d: Vector2<f64>,
    u: &Vector2<f64>,
    v: &Vector2<f64>,
    base_spacing: f64,
    params: &GridGraphParams,
) -> Option<(NeighborDirection, f64)> {
    let a = d.dot(u);
    let b = d.dot(v);
    let along = a.abs().max(b.abs());
    let across = a.abs().min(b.abs());

    if along < params.min_spacing_pix || along > params.max_spacing_pix {
        return None;
    }
    // One lattice step only; a double-length collinear edge would skip a
    // corner and corrupt the BFS coordinates.
    if (along - base_spacing).abs() > params.spacing_tolerance * base_spacing {
        return None;
    }
    if across > params.axis_tolerance * along {
        return None;
    }

    let direction = if a.abs() > b.abs() {
        if a >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if b >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    };

    Some((direction, across / along))
}

/// Keep at most one neighbor per direction, choosing the nearest candidate
/// (lowest off-axis score on ties).
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = match candidate.direction {
            NeighborDirection::Right => &mut best[0],
            NeighborDirection::Left => &mut best[1],
            NeighborDirection::Up => &mut best[2],
            NeighborDirection::Down => &mut best[3],
        };

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance
                    || (candidate.distance == current.distance && candidate.score < current.score)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

pub struct GridGraph {
    /// For each node, its surviving (mutual) neighbor relations.
    pub neighbors: Vec<Vec<NodeNeighbor>>,
    /// Estimated lattice axes `(u, v)`.
    pub axes: (Vector2<f64>, Vector2<f64>),
}

impl GridGraph {
    /// Build the grid graph. `None` when no lattice orientation can be
    /// estimated at all.
    pub fn new(corners: &[CornerCandidate], params: &GridGraphParams) -> Option<Self> {
        let (u, v) = estimate_lattice_axes(corners)?;

        let coords: Vec<[f64; 2]> = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect();
        let tree: KdTree<f64, 2> = (&coords).into();
        let base_spacing = estimate_base_spacing(corners, &tree)?;

        let mut neighbors = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let mut node_neighbors = Vec::new();

            for nn in tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1) {
                let j = nn.item as usize;
                if j == i {
                    continue;
                }
                let d = corners[j].position - corner.position;
                if let Some((direction, score)) = classify_neighbor(d, &u, &v, base_spacing, params)
                {
                    node_neighbors.push(NodeNeighbor {
                        direction,
                        index: j,
                        distance: d.norm(),
                        score,
                    });
                }
            }

            neighbors.push(select_neighbors(node_neighbors));
        }

        // Keep only mutual relations: i's Right must be matched by j's Left.
        let symmetric: Vec<Vec<NodeNeighbor>> = neighbors
            .iter()
            .enumerate()
            .map(|(i, nns)| {
                nns.iter()
                    .filter(|nn| {
                        neighbors[nn.index].iter().any(|back| {
                            back.index == i && back.direction == nn.direction.opposite()
                        })
                    })
                    .copied()
                    .collect()
            })
            .collect();

        Some(Self {
            neighbors: symmetric,
            axes: (u, v),
        })
    }
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
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

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS a component, assigning integer grid coordinates to every node.
///
/// Returns `None` when the component is internally inconsistent: a node
/// reachable under two different coordinates, or two nodes claiming the same
/// cell. Downstream ordering must never see such a grid.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let mut cells: HashMap<(i32, i32), usize> = HashMap::new();
    let mut coords: HashMap<usize, (i32, i32)> = HashMap::new();
    let mut queue = VecDeque::new();

    let start = *component.first()?;
    queue.push_back((start, 0i32, 0i32));

    while let Some((node, i, j)) = queue.pop_front() {
        match coords.get(&node) {
            Some(&(pi, pj)) => {
                if (pi, pj) != (i, j) {
                    return None; // contradictory coordinates
                }
                continue;
            }
            None => {
                if cells.insert((i, j), node).is_some() {
                    return None; // two nodes in one cell
                }
                coords.insert(node, (i, j));
            }
        }

        for neighbor in &graph.neighbors[node] {
            let (di, dj) = match neighbor.direction {
                NeighborDirection::Right => (1, 0),
                NeighborDirection::Left => (-1, 0),
                NeighborDirection::Up => (0, -1),
                NeighborDirection::Down => (0, 1),
            };
            queue.push_back((neighbor.index, i + di, j + dj));
        }
    }

    Some(
        component
            .iter()
            .filter_map(|&n| coords.get(&n).map(|&(i, j)| (n, i, j)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::collections::HashMap;

    fn make_grid(cols: usize, rows: usize, spacing: f64, rotation: f64) -> Vec<CornerCandidate> {
        let (s, c) = rotation.sin_cos();
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let x = i as f64 * spacing;
                let y = j as f64 * spacing;
                corners.push(CornerCandidate {
                    position: Point2::new(c * x - s * y + 200.0, s * x + c * y + 200.0),
                    strength: 1.0,
                });
            }
        }
        corners
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, usize> {
        neighbors.iter().map(|n| (n.direction, n.index)).collect()
    }

    #[test]
    fn axes_follow_the_lattice_rotation() {
        let corners = make_grid(4, 4, 20.0, 0.15);
        let (u, _v) = estimate_lattice_axes(&corners).expect("axes");
        let angle = u.y.atan2(u.x);
        assert!((angle - 0.15).abs() < 0.02, "estimated angle {angle}");
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let cols = 3;
        let corners = make_grid(cols, 3, 10.0, 0.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).expect("graph");

        let idx = |i: usize, j: usize| j * cols + i;
        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);

        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left]);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right]);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up]);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down]);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_neighbors_outside_distance_window() {
        let corners = make_grid(2, 1, 200.0, 0.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).expect("graph");
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn isolated_outlier_stays_disconnected() {
        let mut corners = make_grid(3, 3, 10.0, 0.0);
        corners.push(CornerCandidate {
            position: Point2::new(204.0, 204.0), // off-lattice, diagonal-ish
            strength: 1.0,
        });
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).expect("graph");

        let components = connected_components(&graph);
        let biggest = components.iter().map(Vec::len).max().unwrap();
        assert_eq!(biggest, 9, "grid should stay a 9-node component");
    }

    #[test]
    fn bfs_assigns_consistent_rectangular_coordinates() {
        let corners = make_grid(4, 3, 15.0, 0.1);
        let graph = GridGraph::new(&corners, &GridGraphParams::default()).expect("graph");
        let components = connected_components(&graph);
        let component = components.iter().max_by_key(|c| c.len()).unwrap();
        assert_eq!(component.len(), 12);

        let coords = assign_grid_coordinates(&graph, component).expect("consistent grid");
        let is = coords.iter().map(|&(_, i, _)| i).collect::<Vec<_>>();
        let js = coords.iter().map(|&(_, _, j)| j).collect::<Vec<_>>();
        let wi = is.iter().max().unwrap() - is.iter().min().unwrap() + 1;
        let hj = js.iter().max().unwrap() - js.iter().min().unwrap() + 1;
        assert_eq!((wi, hj), (4, 3));
    }
}
