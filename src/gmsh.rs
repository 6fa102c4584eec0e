//! Utilities for loading meshes generated with [`gmsh`](https://www.gmsh.info/).
//!
//! Only version 4.1 of the MSH format is supported,
//! as per the [`mshio`] library.

use crate::{mesh::MeshError, TriangleMesh, Vec3, LOG_TARGET};

/// Error in loading a mesh from a Gmsh .msh file.
#[derive(thiserror::Error, Debug)]
pub enum GmshError {
    /// Error parsing the .msh file.
    ///
    /// (Implementation note: parser error converted to string
    /// to avoid lifetime issues with the byte slices it contains)
    #[error("Parsing the .msh data failed: {0}")]
    ParseError(String),
    /// The given .msh file contains no nodes.
    #[error("Invalid .msh data: no nodes")]
    MissingNodes,
    /// The given .msh file contains no triangle elements.
    #[error("Invalid .msh data: no Tri3 elements")]
    MissingElements,
    /// A node tag points outside the coordinates of its block.
    #[error("Invalid .msh data: node {tag} has no coordinates")]
    InvalidNodeTag {
        /// The node tag.
        tag: u64,
    },
    /// An element has the wrong number of nodes for its type.
    #[error("Invalid .msh data: element {tag} has {node_count} nodes")]
    MalformedElement {
        /// Tag of the element in the file.
        tag: u64,
        /// Number of nodes the element had.
        node_count: usize,
    },
    /// The elements don't form a valid mesh.
    #[error("Invalid .msh data: {0}")]
    InvalidMesh(#[from] MeshError),
}

/// Load a triangle mesh with line constraints from a `.msh` file.
///
/// First-order triangle elements (`Tri3`, see [`ElementType`][mshio::ElementType])
/// become the triangles of the mesh
/// and first-order line elements (`Lin2`) become line constraints.
/// Other element types are ignored.
///
/// Vertex ids are gmsh node tags,
/// so results keyed by vertex id can be matched with the nodes in gmsh.
/// The point table is sized to the largest tag;
/// slots for tags that don't appear in the file (such as index 0)
/// are unused.
pub fn load_trimesh(bytes: &[u8]) -> Result<TriangleMesh, GmshError> {
    let msh = mshio::parse_msh_bytes(bytes).map_err(|e| GmshError::ParseError(format!("{}", e)))?;
    let nodes = msh.data.nodes.ok_or(GmshError::MissingNodes)?;
    let elements = msh.data.elements.ok_or(GmshError::MissingElements)?;

    let mut points: Vec<(usize, Vec3)> = Vec::new();
    // blocks without explicit tags continue the sequence
    // where the previous block ended
    let mut next_tag = nodes.min_node_tag as usize;
    for block in &nodes.node_blocks {
        match &block.node_tags {
            Some(tags) => {
                for (&tag, &idx) in tags {
                    let node = block
                        .nodes
                        .get(idx)
                        .ok_or(GmshError::InvalidNodeTag { tag })?;
                    points.push((tag as usize, Vec3::new(node.x, node.y, node.z)));
                }
                if let Some(&max_tag) = tags.keys().max() {
                    next_tag = max_tag as usize + 1;
                }
            }
            None => {
                for node in &block.nodes {
                    points.push((next_tag, Vec3::new(node.x, node.y, node.z)));
                    next_tag += 1;
                }
            }
        }
    }
    if points.is_empty() {
        return Err(GmshError::MissingNodes);
    }

    let mut lines: Vec<[usize; 2]> = Vec::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();
    for block in &elements.element_blocks {
        for el in &block.elements {
            let malformed = || GmshError::MalformedElement {
                tag: el.element_tag,
                node_count: el.nodes.len(),
            };
            match block.element_type {
                mshio::ElementType::Lin2 => {
                    let [a, b] = el.nodes[..] else {
                        return Err(malformed());
                    };
                    lines.push([a as usize, b as usize]);
                }
                mshio::ElementType::Tri3 => {
                    let [a, b, c] = el.nodes[..] else {
                        return Err(malformed());
                    };
                    triangles.push([a as usize, b as usize, c as usize]);
                }
                _ => {}
            }
        }
    }
    if triangles.is_empty() {
        return Err(GmshError::MissingElements);
    }

    log::info!(
        target: LOG_TARGET,
        nodes = points.len(),
        lines = lines.len(),
        triangles = triangles.len();
        "loaded .msh data"
    );
    Ok(TriangleMesh::from_tagged_points(points, lines, triangles)?)
}
