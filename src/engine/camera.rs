// Orbit camera for the globe view.
//
// Camera model:
//   - The eye orbits the globe center (origin) at `distance`
//   - Left-drag rotates (yaw around Y, pitch clamped short of the poles)
//   - Mouse wheel zooms by adjusting distance
//   - After a few idle seconds the globe drifts slowly around Y on its own

use glam::{Mat4, Vec3};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;
use super::input::InputState;

pub struct OrbitCamera {
    /// Horizontal rotation in radians (0 = looking down -Z).
    pub yaw: f32,
    /// Elevation angle in radians, clamped to ±max_pitch.
    pub pitch: f32,

    /// Eye distance from the globe center.
    /// Private: always clamped to [min_distance, max_distance] in update().
    distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,

    /// Radians of rotation per pixel of drag.
    pub drag_sensitivity: f32,
    /// Radians/sec for arrow-key rotation.
    pub key_rotate_speed: f32,
    /// Distance units per scroll line.
    pub zoom_speed: f32,

    /// Idle auto-rotation: radians/sec applied after `idle_delay` seconds
    /// without a drag.
    pub auto_rotate_speed: f32,
    pub idle_delay: f32,
    seconds_since_drag: f32,

    pub max_pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl OrbitCamera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.35,
            distance: 3.2,
            min_distance: 1.4,
            max_distance: 8.0,
            drag_sensitivity: 0.006,
            key_rotate_speed: 1.2,
            zoom_speed: 0.25,
            auto_rotate_speed: 0.08,
            idle_delay: 3.0,
            seconds_since_drag: 0.0,
            max_pitch: 1.45,
            fov: 45.0_f32.to_radians(),
            near: 0.05,
            far: 50.0,
        }
    }

    /// Apply one frame of input. Call before rendering.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        let mut steered = false;

        // Arrow keys rotate at a fixed angular rate.
        let mut key_spin = glam::Vec2::ZERO;
        if input.is_key_held(KeyCode::ArrowLeft) { key_spin.x -= 1.0; }
        if input.is_key_held(KeyCode::ArrowRight) { key_spin.x += 1.0; }
        if input.is_key_held(KeyCode::ArrowUp) { key_spin.y += 1.0; }
        if input.is_key_held(KeyCode::ArrowDown) { key_spin.y -= 1.0; }
        if key_spin != glam::Vec2::ZERO {
            self.yaw += key_spin.x * self.key_rotate_speed * dt;
            self.pitch += key_spin.y * self.key_rotate_speed * dt;
            steered = true;
        }

        let drag = input.drag_delta(MouseButton::Left);
        if drag != glam::Vec2::ZERO {
            self.yaw -= drag.x * self.drag_sensitivity;
            self.pitch += drag.y * self.drag_sensitivity;
            steered = true;
        }

        if steered {
            self.pitch = self.pitch.clamp(-self.max_pitch, self.max_pitch);
            self.seconds_since_drag = 0.0;
        } else {
            self.seconds_since_drag += dt;
            if self.seconds_since_drag > self.idle_delay {
                self.yaw += self.auto_rotate_speed * dt;
            }
        }

        // Scroll up zooms in.
        self.distance -= input.scroll_delta * self.zoom_speed;
        self.distance = self.distance.clamp(self.min_distance, self.max_distance);
    }

    /// World-space eye position.
    pub fn eye(&self) -> Vec3 {
        Vec3::new(
            self.yaw.sin() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.cos() * self.pitch.cos(),
        ) * self.distance
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    /// Combined view-projection matrix ready to upload to the GPU.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Camera-space right and up axes in world space, for billboarding the
    /// marker quads toward the eye.
    pub fn billboard_axes(&self) -> (Vec3, Vec3) {
        let forward = (-self.eye()).normalize();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        (right, up)
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_sits_at_distance() {
        let camera = OrbitCamera::new();
        assert!((camera.eye().length() - camera.distance()).abs() < 1e-5);
    }

    #[test]
    fn idle_camera_auto_rotates_after_delay() {
        let mut camera = OrbitCamera::new();
        let input = InputState::new((800, 600));
        let yaw0 = camera.yaw;

        camera.update(&input, 1.0);
        assert_eq!(camera.yaw, yaw0, "no drift before idle_delay");

        camera.update(&input, 3.0);
        assert!(camera.yaw > yaw0, "drift after idle_delay");
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = OrbitCamera::new();
        let mut input = InputState::new((800, 600));
        input.scroll_delta = 1000.0;
        camera.update(&input, 0.016);
        assert_eq!(camera.distance(), camera.min_distance);

        input.scroll_delta = -1000.0;
        camera.update(&input, 0.016);
        assert_eq!(camera.distance(), camera.max_distance);
    }
}
