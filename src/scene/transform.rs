//! Object transforms

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3, Vec4};

/// A raw model matrix
///
/// Positioning and scaling compose onto the existing matrix, so calling
/// [`Transform::set_position`] then [`Transform::set_scale`] scales around the
/// new position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub Mat4);

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self(Mat4::IDENTITY)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        Self(matrix)
    }

    /// Translation-only transform
    pub fn from_position(position: Vec3) -> Self {
        Self(Mat4::from_translation(position))
    }

    pub fn matrix(&self) -> Mat4 {
        self.0
    }

    /// Translation column
    pub fn position(&self) -> Vec3 {
        self.0.w_axis.truncate()
    }

    /// Lengths of the basis columns; exact for any rotation, sign is lost
    pub fn scale(&self) -> Vec3 {
        Vec3::new(
            self.0.x_axis.truncate().length(),
            self.0.y_axis.truncate().length(),
            self.0.z_axis.truncate().length(),
        )
    }

    /// Right-multiply a translation
    pub fn set_position(&mut self, position: Vec3) {
        self.0 *= Mat4::from_translation(position);
    }

    /// Right-multiply a scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.0 *= Mat4::from_scale(scale);
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.set_position(position);
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.set_scale(scale);
        self
    }

    /// Inverse-transpose of the upper 3x3, padded to a 4x4 for uniform layout
    pub fn normal_matrix(&self) -> Mat4 {
        Mat4::from_mat3(Mat3::from_mat4(self.0).inverse().transpose())
    }
}

/// Per-object uniform data, shared by geometry and emissive draws
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: Mat4,
    pub normal_matrix: Mat4,
    /// Emissive color; unused by the geometry pass
    pub color: Vec4,
}

impl ObjectUniforms {
    pub fn new(transform: &Transform, color: Vec3) -> Self {
        Self {
            model: transform.matrix(),
            normal_matrix: transform.normal_matrix(),
            color: color.extend(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_position_then_scale() {
        let t = Transform::identity()
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(0.25));
        assert_eq!(t.position(), Vec3::new(1.0, 2.0, 3.0));
        assert!((t.scale() - Vec3::splat(0.25)).length() < 1e-6);
        // Scaling happens in local space around the position
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(1.25, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_scale_survives_rotation() {
        let m = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 3.0, 4.0),
            Quat::from_rotation_y(0.7),
            Vec3::ZERO,
        );
        let t = Transform::from_matrix(m);
        assert!((t.scale() - Vec3::new(2.0, 3.0, 4.0)).length() < 1e-5);
    }

    #[test]
    fn test_normal_matrix_uniform_scale() {
        let t = Transform::identity().with_scale(Vec3::splat(2.0));
        let n = t.normal_matrix().transform_vector3(Vec3::Y).normalize();
        assert!((n - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_object_uniform_size() {
        assert_eq!(std::mem::size_of::<ObjectUniforms>(), 144);
    }
}
