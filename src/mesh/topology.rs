//! Edge deduplication and triangle adjacency.
//!
//! Every triangle `[a, b, c]` has three local edges,
//! local edge `k` going from vertex `k` to vertex `(k + 1) % 3`.
//! Each such (triangle, local edge) pair is an [`Occurrence`]
//! of some unique undirected edge.
//! The number of occurrences classifies the edge:
//! one means it's on the mesh boundary, two a regular interior edge,
//! and more than two a non-manifold junction.

use itertools::Itertools;

/// Number of local edges in a triangle.
const TRI_EDGES: usize = 3;

/// One (triangle, local edge) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Occurrence {
    /// Index of the triangle.
    pub triangle: usize,
    /// Local edge index in `0..3`.
    pub local_edge: usize,
}

impl Occurrence {
    /// Unpack an occurrence from its flat index `3 * triangle + local_edge`.
    #[inline]
    pub fn from_packed(packed: usize) -> Self {
        Self {
            triangle: packed / TRI_EDGES,
            local_edge: packed % TRI_EDGES,
        }
    }

    /// Flat index of this occurrence, `3 * triangle + local_edge`.
    #[inline]
    pub fn packed(&self) -> usize {
        TRI_EDGES * self.triangle + self.local_edge
    }
}

/// What lies across one local edge of a triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeSlot {
    /// The edge is on the mesh boundary; nothing lies across it.
    Boundary,
    /// Exactly one other triangle shares the edge.
    Neighbor(Occurrence),
    /// Two or more other triangles share the edge.
    /// The value is an index into the non-manifold neighbor list,
    /// see [`Topology::non_manifold_neighbors`].
    NonManifold(usize),
}

/// Classification of a unique edge by its number of occurrences.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeKind {
    /// One occurrence.
    Boundary,
    /// Two occurrences.
    Regular,
    /// More than two occurrences.
    NonManifold,
}

/// Error in building the topology of a triangle soup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A triangle refers to a vertex outside the point table.
    #[error("triangle {triangle} refers to vertex {vertex}, but there are only {vertex_count} vertices")]
    InvalidVertex {
        /// Index of the triangle.
        triangle: usize,
        /// The invalid vertex id.
        vertex: usize,
        /// Number of vertices available.
        vertex_count: usize,
    },
    /// A triangle repeats a vertex, producing an edge from a vertex to itself.
    #[error("triangle {triangle} has a degenerate edge at vertex {vertex}")]
    DegenerateEdge {
        /// Index of the triangle.
        triangle: usize,
        /// The repeated vertex id.
        vertex: usize,
    },
}

/// Unique edges of a triangle mesh and the adjacency relations between triangles.
#[derive(Clone, Debug)]
pub struct Topology {
    /// unique edges with vertex ids in ascending order,
    /// sorted lexicographically
    edges: Vec<[usize; 2]>,
    /// map from packed occurrence to unique edge index
    occurrence_edges: Vec<usize>,
    /// occurrences of each unique edge stored in a flat Vec,
    /// with the occurrences of edge `e` at `occurrence_offsets[e]..occurrence_offsets[e + 1]`
    occurrence_offsets: Vec<usize>,
    occurrences: Vec<Occurrence>,
    /// what lies across each local edge of each triangle
    adjacency: Vec<[EdgeSlot; TRI_EDGES]>,
    /// sibling occurrences for each occurrence of a non-manifold edge
    non_manifold_neighbors: Vec<Vec<Occurrence>>,
}

impl Topology {
    /// Build the topology of a set of triangles
    /// whose vertex ids are all below `vertex_count`.
    pub fn build(triangles: &[[usize; 3]], vertex_count: usize) -> Result<Self, TopologyError> {
        // every local edge of every triangle as a sorted vertex pair,
        // indexed by packed occurrence
        let mut local_edges: Vec<[usize; 2]> = Vec::with_capacity(TRI_EDGES * triangles.len());
        for (tri_idx, tri) in triangles.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v >= vertex_count) {
                return Err(TopologyError::InvalidVertex {
                    triangle: tri_idx,
                    vertex,
                    vertex_count,
                });
            }
            for local in 0..TRI_EDGES {
                let (a, b) = (tri[local], tri[(local + 1) % TRI_EDGES]);
                if a == b {
                    return Err(TopologyError::DegenerateEdge {
                        triangle: tri_idx,
                        vertex: a,
                    });
                }
                local_edges.push(if a < b { [a, b] } else { [b, a] });
            }
        }

        // sort occurrences by their vertex pairs to group duplicates.
        // the sort is stable, so occurrences of one edge stay in ascending order
        let sorted_occurrences: Vec<usize> = (0..local_edges.len())
            .sorted_by_key(|&occ| local_edges[occ])
            .collect();

        let mut edges: Vec<[usize; 2]> = Vec::new();
        let mut occurrence_edges = vec![0; local_edges.len()];
        let mut occurrence_offsets: Vec<usize> = vec![0];
        let mut occurrences: Vec<Occurrence> = Vec::with_capacity(local_edges.len());

        let mut occ_iter = sorted_occurrences.iter().peekable();
        while let Some(&occ) = occ_iter.next() {
            occurrence_edges[occ] = edges.len();
            occurrences.push(Occurrence::from_packed(occ));
            // if the next occurrence is a duplicate, we stay on the same edge
            if matches!(occ_iter.peek(), Some(&&next) if local_edges[next] == local_edges[occ]) {
                continue;
            }
            // otherwise, close this edge and move on to the next one
            edges.push(local_edges[occ]);
            occurrence_offsets.push(occurrences.len());
        }

        let mut adjacency = vec![[EdgeSlot::Boundary; TRI_EDGES]; triangles.len()];
        let mut non_manifold_neighbors: Vec<Vec<Occurrence>> = Vec::new();
        for edge_occs in occurrence_offsets
            .iter()
            .tuple_windows()
            .map(|(&start, &end)| &occurrences[start..end])
        {
            match *edge_occs {
                [_] => {
                    // slots are initialized to Boundary already
                }
                [first, second] => {
                    adjacency[first.triangle][first.local_edge] = EdgeSlot::Neighbor(second);
                    adjacency[second.triangle][second.local_edge] = EdgeSlot::Neighbor(first);
                }
                _ => {
                    for occ in edge_occs {
                        let siblings: Vec<Occurrence> =
                            edge_occs.iter().filter(|o| *o != occ).copied().collect();
                        adjacency[occ.triangle][occ.local_edge] =
                            EdgeSlot::NonManifold(non_manifold_neighbors.len());
                        non_manifold_neighbors.push(siblings);
                    }
                }
            }
        }

        Ok(Self {
            edges,
            occurrence_edges,
            occurrence_offsets,
            occurrences,
            adjacency,
            non_manifold_neighbors,
        })
    }

    /// Number of unique edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Number of triangles the topology was built from.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.adjacency.len()
    }

    /// All unique edges, vertex ids in ascending order,
    /// sorted lexicographically.
    #[inline]
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.edges
    }

    /// Vertex ids of a unique edge in ascending order.
    #[inline]
    pub fn edge(&self, edge: usize) -> [usize; 2] {
        self.edges[edge]
    }

    /// Index of the unique edge at a local edge of a triangle.
    #[inline]
    pub fn edge_of(&self, triangle: usize, local_edge: usize) -> usize {
        self.occurrence_edges[TRI_EDGES * triangle + local_edge]
    }

    /// Map from packed occurrence (`3 * triangle + local_edge`)
    /// to unique edge index.
    #[inline]
    pub fn occurrence_edges(&self) -> &[usize] {
        &self.occurrence_edges
    }

    /// All occurrences of a unique edge, in ascending order.
    #[inline]
    pub fn occurrences(&self, edge: usize) -> &[Occurrence] {
        &self.occurrences[self.occurrence_offsets[edge]..self.occurrence_offsets[edge + 1]]
    }

    /// Classify a unique edge by its number of occurrences.
    #[inline]
    pub fn edge_kind(&self, edge: usize) -> EdgeKind {
        match self.occurrences(edge).len() {
            0 | 1 => EdgeKind::Boundary,
            2 => EdgeKind::Regular,
            _ => EdgeKind::NonManifold,
        }
    }

    /// What lies across each local edge of a triangle.
    #[inline]
    pub fn adjacency(&self, triangle: usize) -> &[EdgeSlot; 3] {
        &self.adjacency[triangle]
    }

    /// The non-manifold neighbor list.
    ///
    /// Each entry corresponds to one occurrence of a non-manifold edge
    /// and lists the other occurrences of the same edge.
    /// Entries are referenced by [`EdgeSlot::NonManifold`].
    #[inline]
    pub fn non_manifold_neighbors(&self) -> &[Vec<Occurrence>] {
        &self.non_manifold_neighbors
    }

    /// Find the unique edge between two vertices, given in either order.
    pub fn find_edge(&self, a: usize, b: usize) -> Option<usize> {
        let key = if a < b { [a, b] } else { [b, a] };
        self.edges.binary_search(&key).ok()
    }
}
