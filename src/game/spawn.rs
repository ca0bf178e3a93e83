//! Spawn anchors and navigation-surface snapping

use rand::Rng;

use crate::relay::Position;

use super::room_props::MapId;

/// Navigation-mesh collaborator: finds the closest traversable point
pub trait NavSurface: Send + Sync {
    fn sample_position(&self, near: Position, max_distance: f32) -> Option<Position>;
}

impl<F> NavSurface for F
where
    F: Fn(Position, f32) -> Option<Position> + Send + Sync,
{
    fn sample_position(&self, near: Position, max_distance: f32) -> Option<Position> {
        self(near, max_distance)
    }
}

/// Axis-aligned walkable floor at a fixed height
#[derive(Debug, Clone)]
pub struct FlatNavSurface {
    pub min_x: f32,
    pub max_x: f32,
    pub min_z: f32,
    pub max_z: f32,
    pub ground_y: f32,
}

impl NavSurface for FlatNavSurface {
    fn sample_position(&self, near: Position, max_distance: f32) -> Option<Position> {
        let snapped = Position::new(
            near.x.clamp(self.min_x, self.max_x),
            self.ground_y,
            near.z.clamp(self.min_z, self.max_z),
        );
        (snapped.distance(near) <= max_distance).then_some(snapped)
    }
}

/// Designated spawn anchors per map
#[derive(Debug, Clone, Default)]
pub struct SpawnLayout {
    pub map1: Vec<Position>,
    pub map2: Vec<Position>,
}

impl SpawnLayout {
    pub fn anchors(&self, map: MapId) -> &[Position] {
        match map {
            MapId::Map1 => &self.map1,
            MapId::Map2 => &self.map2,
        }
    }

    /// Pick a random anchor for the local player
    pub fn player_spawn<R: Rng>(&self, map: MapId, rng: &mut R) -> Option<Position> {
        let anchors = self.anchors(map);
        if anchors.is_empty() {
            return None;
        }
        Some(anchors[rng.gen_range(0..anchors.len())])
    }

    /// Layout used by the simulator: a ring of anchors around each arena
    pub fn simulated() -> Self {
        let ring = |radius: f32, count: usize| -> Vec<Position> {
            (0..count)
                .map(|i| {
                    let angle = i as f32 / count as f32 * std::f32::consts::TAU;
                    Position::new(angle.cos() * radius, 0.0, angle.sin() * radius)
                })
                .collect()
        };
        Self {
            map1: ring(40.0, 8),
            map2: ring(25.0, 6),
        }
    }
}

/// Jittered point near a random anchor, snapped onto the walkable surface.
/// Falls back to the raw anchor if no surface point is within `search_radius`.
pub fn sample_spawn_point<R: Rng, N: NavSurface + ?Sized>(
    anchors: &[Position],
    nav: &N,
    jitter: f32,
    search_radius: f32,
    rng: &mut R,
) -> Option<Position> {
    if anchors.is_empty() {
        return None;
    }
    let anchor = anchors[rng.gen_range(0..anchors.len())];
    let candidate = if jitter > 0.0 {
        anchor.offset(rng.gen_range(-jitter..jitter), rng.gen_range(-jitter..jitter))
    } else {
        anchor
    };
    Some(
        nav.sample_position(candidate, search_radius)
            .unwrap_or(anchor),
    )
}
