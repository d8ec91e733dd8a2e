//! Mesh data structures and generation

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3, Vec4};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        // (normal, u axis, v axis) per face; v runs top to bottom like image rows
        let faces = [
            (Vec3::Z, Vec3::X, -Vec3::Y),
            (-Vec3::Z, -Vec3::X, -Vec3::Y),
            (Vec3::X, -Vec3::Z, -Vec3::Y),
            (-Vec3::X, Vec3::Z, -Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::Z),
            (-Vec3::Y, Vec3::X, -Vec3::Z),
        ];
        let corners = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];

        for (normal, u_axis, v_axis) in faces {
            let base = mesh.vertices.len() as u32;
            for uv in corners {
                let position = normal * 0.5 + u_axis * (uv.x - 0.5) + v_axis * (uv.y - 0.5);
                mesh.vertices.push(Vertex {
                    position,
                    normal,
                    uv,
                    tangent: Vec4::ZERO,
                });
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh.compute_tangents();
        mesh
    }

    /// Fill tangents from triangle UV gradients
    ///
    /// `w` holds the handedness so the shader can rebuild the bitangent as
    /// `cross(normal, tangent) * w`.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if i0 >= self.vertices.len() || i1 >= self.vertices.len() || i2 >= self.vertices.len() {
                continue;
            }
            let (v0, v1, v2) = (&self.vertices[i0], &self.vertices[i1], &self.vertices[i2]);

            let edge1 = v1.position - v0.position;
            let edge2 = v2.position - v0.position;
            let duv1 = v1.uv - v0.uv;
            let duv2 = v2.uv - v0.uv;

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

            for i in [i0, i1, i2] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }

        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let n = vertex.normal;
            // Gram-Schmidt against the normal
            let t = tangents[i] - n * n.dot(tangents[i]);
            let t = if t.length_squared() > 1e-12 {
                t.normalize()
            } else {
                n.any_orthonormal_vector()
            };
            let w = if n.cross(t).dot(bitangents[i]) < 0.0 {
                -1.0
            } else {
                1.0
            };
            vertex.tangent = t.extend(w);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_eq!(cube.vertex_bytes().len(), 24 * 48);
    }

    #[test]
    fn test_cube_tangents_follow_u() {
        let cube = Mesh::cube();
        for v in &cube.vertices {
            assert!(v.tangent.truncate().dot(v.normal).abs() < 1e-5);
            assert!((v.tangent.truncate().length() - 1.0).abs() < 1e-5);
        }
        // Front face: u grows along +x
        let front = &cube.vertices[0];
        assert!((front.tangent.truncate() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_cube_winding_is_counter_clockwise_outward() {
        let cube = Mesh::cube();
        for tri in cube.indices.chunks_exact(3) {
            let a = cube.vertices[tri[0] as usize].position;
            let b = cube.vertices[tri[1] as usize].position;
            let c = cube.vertices[tri[2] as usize].position;
            let face_normal = (b - a).cross(c - a);
            assert!(face_normal.dot(cube.vertices[tri[0] as usize].normal) > 0.0);
        }
    }
}
