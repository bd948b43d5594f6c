// Per-tick update passes over the particle World.
// All three run once per frame, in this order, driven by TrailEngine::tick.
//
// Damping and decay factors are expressed per second and raised to dt each
// tick, so the visual pacing is the same at 30 Hz and 144 Hz.

use bevy_ecs::prelude::*;
use glam::Vec2;
use super::components::*;

/// Advance positions by velocity × dt and damp the vertical velocity
/// component (buoyant drag: bubbles rise, then decelerate).
pub fn integrate_motion(world: &mut World, dt: f32, damping_per_sec: f32) {
    let damp = damping_per_sec.powf(dt);
    let mut query = world.query::<(&mut ScreenPos, &mut Drift)>();
    for (mut pos, mut drift) in query.iter_mut(world) {
        pos.position += drift.velocity * dt;
        drift.velocity.y *= damp;
    }
}

/// Shrink opacity and size multiplicatively and accumulate age.
pub fn decay_visuals(world: &mut World, dt: f32, decay_per_sec: f32) {
    let decay = decay_per_sec.powf(dt);
    let mut query = world.query::<(&mut Bubble, &mut Lifetime)>();
    for (mut bubble, mut lifetime) in query.iter_mut(world) {
        bubble.opacity *= decay;
        bubble.size *= decay;
        lifetime.age += dt;
    }
}

/// Despawn every particle whose opacity or size fell below `epsilon`, or
/// whose age passed its duration. Returns the number reaped.
///
/// This is the only place particles leave the pool, so each one is removed
/// exactly once no matter which condition fires first.
pub fn reap_expired(world: &mut World, epsilon: f32) -> usize {
    let mut expired: Vec<Entity> = Vec::new();
    let mut query = world.query::<(Entity, &Bubble, &Lifetime)>();
    for (entity, bubble, lifetime) in query.iter(world) {
        if bubble.opacity < epsilon || bubble.size < epsilon || lifetime.expired() {
            expired.push(entity);
        }
    }
    for entity in &expired {
        world.despawn(*entity);
    }
    expired.len()
}

/// Live-particle count (pool size).
pub fn particle_count(world: &mut World) -> usize {
    world.query::<&Bubble>().iter(world).count()
}

/// Spawn one particle with the given state. Used by the burst spawner.
pub fn spawn_particle(
    world: &mut World,
    position: Vec2,
    velocity: Vec2,
    size: f32,
    tint: usize,
    duration: f32,
    order: u64,
) {
    world.spawn((
        ScreenPos::new(position),
        Drift::new(velocity),
        Bubble { size, opacity: 1.0, tint },
        Lifetime::new(duration),
        SpawnOrder(order),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_particle(world: &mut World, velocity: Vec2, size: f32, duration: f32) {
        spawn_particle(world, Vec2::new(100.0, 100.0), velocity, size, 0, duration, 0);
    }

    #[test]
    fn motion_moves_and_damps_vertical_only() {
        let mut world = World::new();
        one_particle(&mut world, Vec2::new(10.0, -20.0), 5.0, 2.0);

        integrate_motion(&mut world, 0.5, 0.5);

        let mut query = world.query::<(&ScreenPos, &Drift)>();
        let (pos, drift) = query.single(&world);
        assert_eq!(pos.position, Vec2::new(105.0, 90.0));
        // Horizontal velocity untouched, vertical damped by 0.5^0.5.
        assert_eq!(drift.velocity.x, 10.0);
        assert!((drift.velocity.y - (-20.0 * 0.5f32.powf(0.5))).abs() < 1e-4);
        // Damping decelerates but never reverses.
        assert!(drift.velocity.y < 0.0);
    }

    #[test]
    fn decay_is_monotone_and_frame_rate_independent() {
        let mut world_a = World::new();
        let mut world_b = World::new();
        one_particle(&mut world_a, Vec2::ZERO, 6.0, 10.0);
        one_particle(&mut world_b, Vec2::ZERO, 6.0, 10.0);

        // One 0.2 s tick vs four 0.05 s ticks must land on the same state.
        decay_visuals(&mut world_a, 0.2, 0.1);
        for _ in 0..4 {
            decay_visuals(&mut world_b, 0.05, 0.1);
        }

        let mut qa = world_a.query::<&Bubble>();
        let mut qb = world_b.query::<&Bubble>();
        let a = qa.single(&world_a);
        let b = qb.single(&world_b);
        assert!((a.opacity - b.opacity).abs() < 1e-4);
        assert!((a.size - b.size).abs() < 1e-4);
        assert!(a.opacity < 1.0);
        assert!(a.size < 6.0);
    }

    #[test]
    fn reap_on_lifetime() {
        let mut world = World::new();
        one_particle(&mut world, Vec2::ZERO, 6.0, 1.0);

        decay_visuals(&mut world, 0.5, 0.99);
        assert_eq!(reap_expired(&mut world, 0.01), 0);

        decay_visuals(&mut world, 0.6, 0.99);
        assert_eq!(reap_expired(&mut world, 0.01), 1);
        assert_eq!(particle_count(&mut world), 0);
    }

    #[test]
    fn reap_on_faded_out() {
        let mut world = World::new();
        one_particle(&mut world, Vec2::ZERO, 6.0, 100.0);

        // Aggressive decay: opacity crosses epsilon long before the lifetime.
        for _ in 0..20 {
            decay_visuals(&mut world, 1.0, 0.2);
        }
        assert_eq!(reap_expired(&mut world, 0.01), 1);
    }
}
