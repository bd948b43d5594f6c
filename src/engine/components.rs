// ECS components making up one trail particle.
// A particle is an entity in the TrailEngine's private World carrying all
// five of these; nothing else ever lives in that World.

use bevy_ecs::prelude::*;
use glam::Vec2;

/// Position of a particle in screen space (device pixels, origin top-left).
#[derive(Component, Debug, Clone, Copy)]
pub struct ScreenPos {
    pub position: Vec2,
}

impl ScreenPos {
    pub fn new(position: Vec2) -> Self {
        Self { position }
    }
}

/// Velocity in screen space (pixels per second). Negative y drifts upward.
#[derive(Component, Debug, Clone, Copy)]
pub struct Drift {
    pub velocity: Vec2,
}

impl Drift {
    pub fn new(velocity: Vec2) -> Self {
        Self { velocity }
    }
}

/// Visual state of a bubble particle.
///
/// `size` and `opacity` only ever shrink after spawn; `tint` indexes the
/// fixed bubble palette and never changes.
#[derive(Component, Debug, Clone, Copy)]
pub struct Bubble {
    /// Radius in pixels.
    pub size: f32,
    /// Alpha in [0, 1].
    pub opacity: f32,
    /// Index into trail::BUBBLE_PALETTE, fixed at spawn.
    pub tint: usize,
}

/// Age/expiry bookkeeping. `duration` is assigned at spawn and never changes;
/// `age` accumulates tick dt until it crosses `duration`.
#[derive(Component, Debug, Clone, Copy)]
pub struct Lifetime {
    /// Seconds lived so far.
    pub age: f32,
    /// Seconds this particle is allowed to live.
    pub duration: f32,
}

impl Lifetime {
    pub fn new(duration: f32) -> Self {
        Self { age: 0.0, duration }
    }

    pub fn expired(&self) -> bool {
        self.age >= self.duration
    }
}

/// Global insertion counter assigned at spawn.
///
/// bevy_ecs swap-removes on despawn, so table order is not spawn order once
/// particles start expiring. Rendering sorts on this key to keep the
/// oldest-first draw order that lets new bubbles occlude old ones.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SpawnOrder(pub u64);
