//! Window management and input using winit

use crate::backend::traits::{BackendError, BackendResult};
use crate::scene::CameraInput;
use glam::Vec2;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window as WinitWindow, WindowBuilder},
};

/// Keyboard and mouse state accumulated between frames
#[derive(Debug, Default)]
pub struct InputState {
    pressed: HashSet<KeyCode>,
    /// Keys that went down since the last `take_pressed`
    just_pressed: HashSet<KeyCode>,
    last_cursor: Option<Vec2>,
    mouse_delta: Vec2,
    scroll_delta: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_down(&mut self, key: KeyCode) {
        if self.pressed.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.pressed.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// True once per physical press, however long the key is held
    pub fn take_pressed(&mut self, key: KeyCode) -> bool {
        self.just_pressed.remove(&key)
    }

    /// Accumulate cursor motion. The first position only seeds the tracker;
    /// y is inverted so moving the mouse up is positive.
    pub fn cursor_moved(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x, y);
        if let Some(last) = self.last_cursor {
            self.mouse_delta += Vec2::new(position.x - last.x, last.y - position.y);
        }
        self.last_cursor = Some(position);
    }

    pub fn scrolled(&mut self, y: f32) {
        self.scroll_delta += y;
    }

    /// Forget the cursor position, e.g. when it leaves the window
    pub fn reset_cursor(&mut self) {
        self.last_cursor = None;
    }

    /// Movement keys and the deltas gathered since the last call
    pub fn take_camera_input(&mut self) -> CameraInput {
        let input = CameraInput {
            forward: self.is_pressed(KeyCode::KeyW),
            backward: self.is_pressed(KeyCode::KeyS),
            left: self.is_pressed(KeyCode::KeyA),
            right: self.is_pressed(KeyCode::KeyD),
            up: self.is_pressed(KeyCode::Space),
            down: self.is_pressed(KeyCode::ControlLeft),
            sprint: self.is_pressed(KeyCode::ShiftLeft),
            mouse_delta: self.mouse_delta,
            scroll_delta: self.scroll_delta,
        };
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
        input
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        match event.state {
            ElementState::Pressed => self.key_down(code),
            ElementState::Released => self.key_up(code),
        }
    }
}

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    close_requested: bool,
    last_frame: Instant,
    delta_time: f32,
    pub input: InputState,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> BackendResult<Self> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| BackendError::InitializationFailed(format!("window: {}", e)))?;
        let size = window.inner_size();

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
            resized: false,
            close_requested: false,
            last_frame: Instant::now(),
            delta_time: 0.0,
            input: InputState::new(),
        })
    }

    /// Get the raw window for backend initialization
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Check if window was resized since last frame
    pub fn was_resized(&self) -> bool {
        self.resized
    }

    /// Clear the resize flag
    pub fn clear_resize_flag(&mut self) {
        self.resized = false;
    }

    /// Check if close was requested
    pub fn should_close(&self) -> bool {
        self.close_requested
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Seconds between the two most recent frames
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
    }

    /// Handle window events
    pub fn handle_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.resized = true;
            }
            WindowEvent::CloseRequested => {
                self.close_requested = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.input.handle_key(event);
                if event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    self.close_requested = true;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::CursorLeft { .. } => {
                self.input.reset_cursor();
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 20.0,
                };
                self.input.scrolled(y);
            }
            _ => {}
        }
    }

    /// Request a redraw
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

/// Create the event loop a [`Window`] is built on
pub fn create_event_loop() -> BackendResult<EventLoop<()>> {
    EventLoop::new().map_err(|e| BackendError::InitializationFailed(format!("event loop: {}", e)))
}

/// Run the event loop, calling `frame` once per iteration until it returns
/// `false` or the window asks to close
pub fn run<F>(event_loop: EventLoop<()>, mut window: Window, mut frame: F) -> BackendResult<()>
where
    F: FnMut(&mut Window) -> bool + 'static,
{
    event_loop
        .run(move |event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => window.handle_event(&event),
                Event::AboutToWait => {
                    window.tick();
                    if !frame(&mut window) {
                        window.request_close();
                    }
                    window.request_redraw();
                }
                _ => {}
            }

            if window.should_close() {
                elwt.exit();
            }
        })
        .map_err(|e| BackendError::InitializationFailed(format!("event loop: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_mouse_is_ignored() {
        let mut input = InputState::new();
        input.cursor_moved(100.0, 100.0);
        assert_eq!(input.take_camera_input().mouse_delta, Vec2::ZERO);

        input.cursor_moved(110.0, 90.0);
        assert_eq!(input.take_camera_input().mouse_delta, Vec2::new(10.0, 10.0));

        input.reset_cursor();
        input.cursor_moved(0.0, 0.0);
        assert_eq!(input.take_camera_input().mouse_delta, Vec2::ZERO);
    }

    #[test]
    fn test_toggle_is_edge_triggered() {
        let mut input = InputState::new();
        input.key_down(KeyCode::KeyT);
        // Key repeat while held
        input.key_down(KeyCode::KeyT);
        assert!(input.take_pressed(KeyCode::KeyT));
        assert!(!input.take_pressed(KeyCode::KeyT));

        input.key_up(KeyCode::KeyT);
        input.key_down(KeyCode::KeyT);
        assert!(input.take_pressed(KeyCode::KeyT));
    }

    #[test]
    fn test_camera_input_resets_deltas() {
        let mut input = InputState::new();
        input.key_down(KeyCode::KeyW);
        input.key_down(KeyCode::ShiftLeft);
        input.scrolled(2.0);

        let first = input.take_camera_input();
        assert!(first.forward && first.sprint && !first.backward);
        assert_eq!(first.scroll_delta, 2.0);

        let second = input.take_camera_input();
        assert!(second.forward);
        assert_eq!(second.scroll_delta, 0.0);
    }
}
