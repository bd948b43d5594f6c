// Cursor bubble-trail engine.
//
// The engine owns its particle pool (a private bevy_ecs World) and its RNG,
// and is constructed/torn down by the host view's lifecycle. Pointer events
// feed on_pointer_move; the frame loop drives tick + render. Expiry in
// systems::reap_expired is the only thing bounding pool size, and it is
// enough: every particle dies within its assigned duration.

use bevy_ecs::prelude::*;
use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;

use super::components::*;
use super::systems;

/// Fixed bubble palette, light blues. `Bubble::tint` indexes into this.
pub const BUBBLE_PALETTE: [[f32; 3]; 4] = [
    [0.68, 0.85, 0.90], // pale blue
    [0.53, 0.81, 0.92], // sky
    [0.69, 0.88, 0.90], // powder
    [0.88, 0.96, 1.00], // near-white
];

/// Opacity/size threshold below which a particle is considered gone.
pub const EXPIRY_EPSILON: f32 = 0.02;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning knobs for the trail. All engine-level; none are user-facing.
#[derive(Debug, Clone)]
pub struct TrailConfig {
    /// Probability in [0, 1] that one pointer-move event spawns a burst.
    /// Caps spawn rate under fast pointer motion without time throttling.
    pub spawn_probability: f32,
    /// Particles per burst.
    pub burst_count: usize,
    /// Base radius in pixels before jitter.
    pub base_size: f32,
    /// Multiplier range applied to base_size per particle.
    pub size_jitter: Range<f32>,
    /// Radial speed range in px/s for the outward burst velocity.
    pub speed: Range<f32>,
    /// Constant upward drift added to every spawn velocity, px/s.
    pub buoyancy: f32,
    /// Lifetime range in seconds.
    pub lifetime: Range<f32>,
    /// Per-second retention factor for vertical velocity, in (0, 1].
    pub damping_per_sec: f32,
    /// Per-second retention factor for opacity and size, in (0, 1).
    pub decay_per_sec: f32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            spawn_probability: 0.25,
            burst_count: 15,
            base_size: 6.0,
            size_jitter: 0.5..1.3,
            speed: 20.0..70.0,
            buoyancy: 45.0,
            lifetime: 0.8..2.0,
            damping_per_sec: 0.30,
            decay_per_sec: 0.15,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("spawn_probability must be in [0, 1], got {0}")]
    SpawnProbability(f32),
    #[error("burst_count must be at least 1")]
    BurstCount,
    #[error("base_size must be positive, got {0}")]
    BaseSize(f32),
    #[error("{name} range {start}..{end} must be positive and non-empty")]
    BadRange { name: &'static str, start: f32, end: f32 },
    #[error("damping_per_sec must be in (0, 1], got {0}")]
    Damping(f32),
    #[error("decay_per_sec must be in (0, 1), got {0}")]
    Decay(f32),
}

impl TrailConfig {
    /// Reject out-of-range values up front; simulation code never clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.spawn_probability) {
            return Err(ConfigError::SpawnProbability(self.spawn_probability));
        }
        if self.burst_count == 0 {
            return Err(ConfigError::BurstCount);
        }
        if !(self.base_size > 0.0) {
            return Err(ConfigError::BaseSize(self.base_size));
        }
        for (name, range) in [
            ("size_jitter", &self.size_jitter),
            ("speed", &self.speed),
            ("lifetime", &self.lifetime),
        ] {
            if !(range.start > 0.0) || range.end < range.start {
                return Err(ConfigError::BadRange {
                    name,
                    start: range.start,
                    end: range.end,
                });
            }
        }
        if !(self.damping_per_sec > 0.0 && self.damping_per_sec <= 1.0) {
            return Err(ConfigError::Damping(self.damping_per_sec));
        }
        if !(self.decay_per_sec > 0.0 && self.decay_per_sec < 1.0) {
            return Err(ConfigError::Decay(self.decay_per_sec));
        }
        Ok(())
    }
}

// ============================================================================
// DRAW SURFACE
// ============================================================================

/// Drawing-surface handle the engine renders through. The wgpu host turns
/// these calls into sprite instances; tests record them.
pub trait DrawSurface {
    /// Disc fading radially from `color` at the center to transparent.
    fn fill_radial(&mut self, center: Vec2, radius: f32, color: [f32; 4]);
    /// Thin circular outline.
    fn stroke_circle(&mut self, center: Vec2, radius: f32, width: f32, color: [f32; 4]);
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct TrailEngine {
    config: TrailConfig,
    world: World,
    rng: StdRng,
    /// Monotone counter backing SpawnOrder.
    next_order: u64,
    /// False after deactivate(): pointer events are ignored.
    active: bool,
}

impl TrailEngine {
    pub fn new(config: TrailConfig) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic construction for tests: fixed seed, same bursts.
    pub fn seeded(config: TrailConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TrailConfig, rng: StdRng) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            world: World::new(),
            rng,
            next_order: 0,
            active: true,
        })
    }

    pub fn particle_count(&mut self) -> usize {
        systems::particle_count(&mut self.world)
    }

    /// Pointer moved to (x, y) in device pixels. Applies the spawn gate and,
    /// on a pass, inserts one full burst before returning.
    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        if !self.active {
            return;
        }
        if self.rng.r#gen::<f32>() >= self.config.spawn_probability {
            return;
        }
        self.spawn_burst(Vec2::new(x, y));
    }

    fn spawn_burst(&mut self, center: Vec2) {
        for _ in 0..self.config.burst_count {
            let size = self.config.base_size * self.rng.gen_range(self.config.size_jitter.clone());
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let speed = self.rng.gen_range(self.config.speed.clone());
            // Outward spread plus constant upward drift (screen y grows down).
            let velocity = Vec2::new(angle.cos(), angle.sin()) * speed
                + Vec2::new(0.0, -self.config.buoyancy);
            let duration = self.rng.gen_range(self.config.lifetime.clone());
            let tint = self.rng.gen_range(0..BUBBLE_PALETTE.len());

            systems::spawn_particle(
                &mut self.world,
                center,
                velocity,
                size,
                tint,
                duration,
                self.next_order,
            );
            self.next_order += 1;
        }
    }

    /// Advance the simulation by `dt` seconds: integrate, decay, reap.
    pub fn tick(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        systems::integrate_motion(&mut self.world, dt, self.config.damping_per_sec);
        systems::decay_visuals(&mut self.world, dt, self.config.decay_per_sec);
        systems::reap_expired(&mut self.world, EXPIRY_EPSILON);
    }

    /// Draw all live particles, oldest first, as soft bubbles: a radial
    /// gradient body, a thin rim, and a small offset highlight.
    ///
    /// Degenerate particles (non-finite position, non-positive size) are
    /// skipped; rendering never raises.
    pub fn render(&mut self, surface: &mut dyn DrawSurface) {
        let mut sprites: Vec<(u64, Vec2, f32, f32, usize)> = Vec::new();
        let mut query = self.world.query::<(&SpawnOrder, &ScreenPos, &Bubble)>();
        for (order, pos, bubble) in query.iter(&self.world) {
            if !pos.position.is_finite() || bubble.size <= 0.0 {
                continue;
            }
            sprites.push((order.0, pos.position, bubble.size, bubble.opacity, bubble.tint));
        }
        sprites.sort_unstable_by_key(|s| s.0);

        for (_, center, size, opacity, tint) in sprites {
            let [r, g, b] = BUBBLE_PALETTE[tint];
            surface.fill_radial(center, size, [r, g, b, opacity * 0.55]);
            surface.stroke_circle(center, size, 1.0, [r, g, b, opacity * 0.9]);
            // Off-center glint sells the bubble look.
            let glint = center + Vec2::new(-size * 0.35, -size * 0.35);
            surface.fill_radial(glint, size * 0.25, [1.0, 1.0, 1.0, opacity * 0.8]);
        }
    }

    /// Tear the trail down: drop every particle now and ignore any pointer
    /// event that races in before the host detaches its listener.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.world.clear_entities();
        log::debug!("trail engine deactivated, pool cleared");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forced_config() -> TrailConfig {
        TrailConfig { spawn_probability: 1.0, ..TrailConfig::default() }
    }

    struct RecordingSurface {
        ops: Vec<(&'static str, Vec2, f32)>,
    }

    impl RecordingSurface {
        fn new() -> Self {
            Self { ops: Vec::new() }
        }
    }

    impl DrawSurface for RecordingSurface {
        fn fill_radial(&mut self, center: Vec2, radius: f32, _color: [f32; 4]) {
            self.ops.push(("fill", center, radius));
        }
        fn stroke_circle(&mut self, center: Vec2, radius: f32, _width: f32, _color: [f32; 4]) {
            self.ops.push(("stroke", center, radius));
        }
    }

    #[test]
    fn forced_gate_spawns_exactly_one_burst() {
        let mut engine = TrailEngine::seeded(forced_config(), 7).unwrap();
        engine.on_pointer_move(320.0, 240.0);
        assert_eq!(engine.particle_count(), 15);
    }

    #[test]
    fn closed_gate_spawns_nothing() {
        let config = TrailConfig { spawn_probability: 0.0, ..TrailConfig::default() };
        let mut engine = TrailEngine::seeded(config, 7).unwrap();
        for _ in 0..100 {
            engine.on_pointer_move(10.0, 10.0);
        }
        assert_eq!(engine.particle_count(), 0);
    }

    #[test]
    fn pool_drains_within_max_lifetime() {
        let mut engine = TrailEngine::seeded(forced_config(), 3).unwrap();
        engine.on_pointer_move(100.0, 100.0);
        assert!(engine.particle_count() > 0);

        // Max configured lifetime is 2.0 s; a little past that the pool is empty.
        for _ in 0..130 {
            engine.tick(1.0 / 60.0);
        }
        assert_eq!(engine.particle_count(), 0);
    }

    #[test]
    fn opacity_and_size_never_increase() {
        let mut engine = TrailEngine::seeded(forced_config(), 11).unwrap();
        engine.on_pointer_move(50.0, 50.0);

        let snapshot = |engine: &mut TrailEngine| -> Vec<(u64, f32, f32)> {
            let mut query = engine.world.query::<(&SpawnOrder, &Bubble)>();
            let mut out: Vec<_> = query
                .iter(&engine.world)
                .map(|(o, b)| (o.0, b.opacity, b.size))
                .collect();
            out.sort_unstable_by_key(|s| s.0);
            out
        };

        let mut prev = snapshot(&mut engine);
        for _ in 0..30 {
            engine.tick(1.0 / 60.0);
            let next = snapshot(&mut engine);
            // Compare survivors against their previous state by spawn order.
            for (order, opacity, size) in &next {
                if let Some((_, po, ps)) = prev.iter().find(|(o, _, _)| o == order) {
                    assert!(opacity <= po, "opacity rose for particle {order}");
                    assert!(size <= ps, "size rose for particle {order}");
                }
            }
            prev = next;
        }
    }

    #[test]
    fn render_draws_oldest_first_with_three_ops_each() {
        let mut engine = TrailEngine::seeded(forced_config(), 5).unwrap();
        engine.on_pointer_move(10.0, 10.0);
        engine.tick(0.1);
        engine.on_pointer_move(400.0, 300.0);

        let mut surface = RecordingSurface::new();
        engine.render(&mut surface);

        let n = engine.particle_count();
        assert_eq!(surface.ops.len(), n * 3);
        // First burst was drawn before the second: the first op of the later
        // burst sits at index 15 * 3 and is centered near (400, 300).
        let (_, center, _) = surface.ops[15 * 3];
        assert!((center.x - 400.0).abs() < 50.0);
    }

    #[test]
    fn deactivate_empties_pool_and_blocks_spawns() {
        let mut engine = TrailEngine::seeded(forced_config(), 1).unwrap();
        engine.on_pointer_move(10.0, 10.0);
        assert!(engine.particle_count() > 0);

        engine.deactivate();
        assert_eq!(engine.particle_count(), 0);
        assert!(!engine.is_active());

        engine.on_pointer_move(10.0, 10.0);
        assert_eq!(engine.particle_count(), 0);
    }

    #[test]
    fn seeded_engines_are_reproducible() {
        let mut a = TrailEngine::seeded(forced_config(), 42).unwrap();
        let mut b = TrailEngine::seeded(forced_config(), 42).unwrap();
        a.on_pointer_move(200.0, 200.0);
        b.on_pointer_move(200.0, 200.0);
        a.tick(0.016);
        b.tick(0.016);

        let dump = |e: &mut TrailEngine| -> Vec<(u64, Vec2)> {
            let mut q = e.world.query::<(&SpawnOrder, &ScreenPos)>();
            let mut v: Vec<_> = q.iter(&e.world).map(|(o, p)| (o.0, p.position)).collect();
            v.sort_unstable_by_key(|s| s.0);
            v
        };
        assert_eq!(dump(&mut a), dump(&mut b));
    }

    #[test]
    fn config_rejects_bad_values() {
        let bad = TrailConfig { burst_count: 0, ..TrailConfig::default() };
        assert_eq!(bad.validate(), Err(ConfigError::BurstCount));

        let bad = TrailConfig { spawn_probability: 1.5, ..TrailConfig::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::SpawnProbability(_))));

        let bad = TrailConfig { base_size: 0.0, ..TrailConfig::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::BaseSize(_))));

        let bad = TrailConfig { lifetime: 2.0..1.0, ..TrailConfig::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::BadRange { name: "lifetime", .. })));

        let bad = TrailConfig { decay_per_sec: 1.0, ..TrailConfig::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::Decay(_))));

        assert!(TrailConfig::default().validate().is_ok());
    }
}
