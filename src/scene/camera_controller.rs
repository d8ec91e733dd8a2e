//! Camera controller
//!
//! Turns per-frame input into first-person camera movement:
//! - W/S, A/D, Space/Ctrl: move along front, right and up
//! - Shift: move 8x faster
//! - Mouse: yaw and pitch, scaled by the camera's sensitivity
//! - Scroll: zoom

use glam::Vec2;

use super::Camera;

/// Input state for the camera controller
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,

    /// Sprint modifier (shift)
    pub sprint: bool,

    /// Cursor delta since last frame in pixels, y already pointing up
    pub mouse_delta: Vec2,

    /// Scroll delta (positive = scroll up)
    pub scroll_delta: f32,
}

impl CameraInput {
    pub fn new() -> Self {
        Self::default()
    }
}

/// First-person fly controller
#[derive(Debug, Clone)]
pub struct FlyController {
    /// Speed multiplier when sprinting
    pub sprint_multiplier: f32,
}

impl Default for FlyController {
    fn default() -> Self {
        Self {
            sprint_multiplier: 8.0,
        }
    }
}

impl FlyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the camera based on input and delta time
    pub fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        let mut speed = camera.move_speed * dt;
        if input.sprint {
            speed *= self.sprint_multiplier;
        }

        let axes = [
            (input.forward, camera.front()),
            (input.backward, -camera.front()),
            (input.right, camera.right()),
            (input.left, -camera.right()),
            (input.up, camera.up()),
            (input.down, -camera.up()),
        ];
        for (pressed, direction) in axes {
            if pressed {
                camera.translate(direction * speed);
            }
        }

        if input.mouse_delta != Vec2::ZERO {
            let delta = input.mouse_delta * camera.mouse_sensitivity;
            camera.rotate_yaw(delta.x);
            camera.rotate_pitch(delta.y);
        }

        if input.scroll_delta != 0.0 {
            camera.zoom(input.scroll_delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_forward_moves_along_front() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            forward: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 1.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_sprint_multiplies_speed() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            right: true,
            sprint: true,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 0.5);
        assert!((camera.position.x - 2.5 * 0.5 * 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_mouse_scaled_by_sensitivity() {
        let mut camera = Camera::default();
        let mut controller = FlyController::new();
        let input = CameraInput {
            mouse_delta: Vec2::new(100.0, 50.0),
            scroll_delta: 5.0,
            ..Default::default()
        };
        controller.update(&mut camera, &input, 0.016);
        assert!((camera.yaw() - (-80.0)).abs() < 1e-4);
        assert!((camera.pitch() - 5.0).abs() < 1e-4);
        assert_eq!(camera.fov(), 40.0);
    }
}
