//! Mesh input data

use bytemuck::{Pod, Zeroable};

/// Interleaved vertex with position, normal and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

unsafe impl Zeroable for Vertex {}
unsafe impl Pod for Vertex {}

/// Indexed triangle mesh produced by an asset decoder
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    /// Vertex array
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertex and index arrays
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Whether there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Index of the first out-of-range index, if any
    pub fn first_invalid_index(&self) -> Option<usize> {
        let count = self.vertices.len();
        self.indices
            .iter()
            .position(|&index| index as usize >= count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_mesh() -> Mesh {
        Mesh::new(
            vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
                Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
                Vertex::new([0.5, 1.0, 0.0], [0.0, 0.0, 1.0], [0.5, 1.0]),
            ],
            vec![0, 1, 2],
        )
    }

    /// Vertex layout is tightly packed for upload
    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        let mesh = create_test_mesh();
        let bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        assert_eq!(bytes.len(), 96);
    }

    /// Out-of-range indices are reported by position
    #[test]
    fn test_index_validation() {
        let mut mesh = create_test_mesh();
        assert!(!mesh.is_empty());
        assert_eq!(mesh.first_invalid_index(), None);

        mesh.indices.push(7);
        assert_eq!(mesh.first_invalid_index(), Some(3));
        assert!(Mesh::default().is_empty());
    }
}
