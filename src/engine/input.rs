// Input snapshot for the globe host.
// Folds winit events into per-frame state: cursor, drag, scroll, keys.
// The trail engine gets raw CursorMoved coordinates directly from the event
// loop; this snapshot only serves the camera and overlay toggles.

use glam::Vec2;
use std::collections::HashSet;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

pub struct InputState {
    keys_held: HashSet<KeyCode>,
    /// Keys that went down since the last end_frame(); for edge-triggered
    /// toggles like the debug overlay.
    keys_pressed: HashSet<KeyCode>,

    pub cursor: Vec2,
    cursor_prev: Vec2,
    pub cursor_delta: Vec2,
    buttons_held: HashSet<MouseButton>,

    /// Vertical scroll accumulated this frame, reset in end_frame().
    pub scroll_delta: f32,

    pub window_size: (u32, u32),
}

impl InputState {
    pub fn new(window_size: (u32, u32)) -> Self {
        Self {
            keys_held: HashSet::new(),
            keys_pressed: HashSet::new(),
            cursor: Vec2::ZERO,
            cursor_prev: Vec2::ZERO,
            cursor_delta: Vec2::ZERO,
            buttons_held: HashSet::new(),
            scroll_delta: 0.0,
            window_size,
        }
    }

    /// Feed a winit WindowEvent into the snapshot.
    /// Call once per event, before the app's own event handling.
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => {
                            if self.keys_held.insert(key) {
                                self.keys_pressed.insert(key);
                            }
                        }
                        ElementState::Released => {
                            self.keys_held.remove(&key);
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => { self.buttons_held.insert(*button); }
                    ElementState::Released => { self.buttons_held.remove(button); }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.scroll_delta += y;
            }
            WindowEvent::Resized(size) => {
                self.window_size = (size.width, size.height);
            }
            _ => {}
        }
    }

    /// Reset per-frame accumulators. Call once per frame after update()
    /// and render() have consumed input.
    pub fn end_frame(&mut self) {
        self.scroll_delta = 0.0;
        self.keys_pressed.clear();
        self.cursor_delta = self.cursor - self.cursor_prev;
        self.cursor_prev = self.cursor;
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// True exactly on the frame the key went down.
    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Cursor movement this frame while `button` is held; Vec2::ZERO otherwise.
    pub fn drag_delta(&self, button: MouseButton) -> Vec2 {
        if self.buttons_held.contains(&button) {
            self.cursor_delta
        } else {
            Vec2::ZERO
        }
    }
}
