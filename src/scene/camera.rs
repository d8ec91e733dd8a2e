//! First-person camera

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

pub const DEFAULT_YAW: f32 = -90.0;
pub const DEFAULT_PITCH: f32 = 0.0;
pub const DEFAULT_SPEED: f32 = 2.5;
pub const DEFAULT_SENSITIVITY: f32 = 0.1;
pub const DEFAULT_FOV: f32 = 45.0;

/// Yaw/pitch camera; angles and field of view are in degrees
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    front: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    yaw: f32,
    pitch: f32,
    fov: f32,
    pub move_speed: f32,
    pub mouse_sensitivity: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 3.0))
    }
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        let mut camera = Self {
            position,
            front: -Vec3::Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw: DEFAULT_YAW,
            pitch: DEFAULT_PITCH,
            fov: DEFAULT_FOV,
            move_speed: DEFAULT_SPEED,
            mouse_sensitivity: DEFAULT_SENSITIVITY,
            near: 0.1,
            far: 100.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    pub fn front(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Narrow the field of view by `delta` degrees, kept within [1, 45]
    pub fn zoom(&mut self, delta: f32) {
        self.fov = (self.fov - delta).clamp(1.0, DEFAULT_FOV);
    }

    pub fn rotate_yaw(&mut self, delta: f32) {
        self.yaw += delta;
        self.update_vectors();
    }

    /// Pitch is kept within [-89, 89] so the view never flips
    pub fn rotate_pitch(&mut self, delta: f32) {
        self.pitch = (self.pitch + delta).clamp(-89.0, 89.0);
        self.update_vectors();
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// View matrix looking backwards along `-front`
    pub fn reverse_view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position - self.front, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect.max(f32::EPSILON), self.near, self.far)
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self, aspect: f32) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix(aspect);

        CameraUniformData {
            view,
            proj,
            view_proj: proj * view,
            position: self.position.extend(1.0),
            near_far: Vec4::new(self.near, self.far, 0.0, 0.0),
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub position: Vec4,
    pub near_far: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert!(approx(camera.front(), -Vec3::Z));
        assert!(approx(camera.right(), Vec3::X));
        assert!(approx(camera.up(), Vec3::Y));
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn test_zoom_clamps() {
        let mut camera = Camera::default();
        camera.zoom(-10.0);
        assert_eq!(camera.fov(), 45.0);
        camera.zoom(100.0);
        assert_eq!(camera.fov(), 1.0);
        camera.zoom(-4.0);
        assert_eq!(camera.fov(), 5.0);
    }

    #[test]
    fn test_pitch_clamps() {
        let mut camera = Camera::default();
        camera.rotate_pitch(120.0);
        assert_eq!(camera.pitch(), 89.0);
        camera.rotate_pitch(-500.0);
        assert_eq!(camera.pitch(), -89.0);
    }

    #[test]
    fn test_yaw_turns_right() {
        let mut camera = Camera::default();
        camera.rotate_yaw(90.0);
        assert!(approx(camera.front(), Vec3::X));
    }

    #[test]
    fn test_reverse_view_faces_backwards() {
        let camera = Camera::default();
        let target = Vec3::new(0.0, 0.0, 10.0);
        // Behind the camera, so in front of the reversed view (negative view-space z)
        assert!(camera.reverse_view_matrix().transform_point3(target).z < 0.0);
        assert!(camera.view_matrix().transform_point3(target).z > 0.0);
    }
}
