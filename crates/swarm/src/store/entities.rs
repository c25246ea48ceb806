use std::ops::Range;

use glam::Vec2;
use rand::Rng;

use super::Entity;
use super::color::{Rgb, Rgba};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("entity {id} outside of store bounds ({bound})")]
    OutOfRange { id: Entity, bound: u32 },
    #[error("cannot truncate to {requested}, only {count} entities allocated")]
    BeyondCount { requested: u32, count: u32 },
}

/// Fixed-capacity structure-of-arrays entity storage.
///
/// Indices `[0, count)` are allocated. Allocation appends at `count`, and removal is
/// only ever a truncation of `count`. Whether any entity exists is answered by slot 0's
/// alpha alone, not by `count`.
#[derive(Debug, Clone)]
pub struct EntityStore {
    capacity: u32,
    count: u32,
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    colors: Vec<Rgba>,
    destinations: Vec<Vec2>,
}

impl EntityStore {
    /// Store for the simulation host: no interpolation targets.
    pub fn authoritative(capacity: u32) -> Self {
        Self::with_layout(capacity, false)
    }

    /// Store for an observer: keeps a destination per entity.
    pub fn mirror(capacity: u32) -> Self {
        Self::with_layout(capacity, true)
    }

    fn with_layout(capacity: u32, destinations: bool) -> Self {
        let len = capacity as usize;
        Self {
            capacity,
            count: 0,
            positions: vec![Vec2::ZERO; len],
            velocities: vec![Vec2::ZERO; len],
            colors: vec![Rgba::default(); len],
            destinations: if destinations {
                vec![Vec2::ZERO; len]
            } else {
                Vec::new()
            },
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_mirror(&self) -> bool {
        !self.destinations.is_empty()
    }

    /// Existence check: slot 0 not tombstoned.
    #[inline]
    pub fn exists(&self) -> bool {
        self.colors.first().is_some_and(|color| !color.is_tombstone())
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions[..self.count as usize]
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities[..self.count as usize]
    }

    pub fn colors(&self) -> &[Rgba] {
        &self.colors[..self.count as usize]
    }

    pub fn destinations(&self) -> &[Vec2] {
        if self.destinations.is_empty() {
            return &[];
        }
        &self.destinations[..self.count as usize]
    }

    pub fn position(&self, id: Entity) -> Option<Vec2> {
        self.positions().get(id as usize).copied()
    }

    pub fn velocity(&self, id: Entity) -> Option<Vec2> {
        self.velocities().get(id as usize).copied()
    }

    pub fn color(&self, id: Entity) -> Option<Rgba> {
        self.colors().get(id as usize).copied()
    }

    pub fn destination(&self, id: Entity) -> Option<Vec2> {
        self.destinations().get(id as usize).copied()
    }

    pub(crate) fn motion_mut(&mut self) -> (&mut [Vec2], &mut [Vec2]) {
        let count = self.count as usize;
        (
            &mut self.positions[..count],
            &mut self.velocities[..count],
        )
    }

    pub(crate) fn interpolation_mut(&mut self) -> (&mut [Vec2], &[Vec2], &[Vec2]) {
        let count = self.count as usize;
        if self.destinations.is_empty() {
            return (&mut [], &[], &[]);
        }
        (
            &mut self.positions[..count],
            &self.destinations[..count],
            &self.velocities[..count],
        )
    }

    /// Appends up to `quantity` entities at `origin` with a random velocity and palette
    /// color. Entities that would exceed capacity are silently dropped.
    pub fn allocate_batch<R: Rng + ?Sized>(
        &mut self,
        origin: Vec2,
        quantity: u32,
        rng: &mut R,
    ) -> Range<Entity> {
        let start = self.count;
        let end = start.saturating_add(quantity).min(self.capacity);

        for i in start as usize..end as usize {
            self.positions[i] = origin;
            self.velocities[i] = random_velocity(rng);
            self.colors[i] = Rgba::random(rng);
        }

        self.count = end;
        start..end
    }

    /// Writes a network-supplied entity at an explicit id, growing `count` to cover it.
    pub fn insert(
        &mut self,
        id: Entity,
        position: Vec2,
        velocity: Vec2,
        color: Rgb,
    ) -> Result<(), StoreError> {
        if id >= self.capacity {
            return Err(StoreError::OutOfRange {
                id,
                bound: self.capacity,
            });
        }

        let i = id as usize;
        self.positions[i] = position;
        self.velocities[i] = velocity;
        self.colors[i] = color.into();
        self.count = self.count.max(id + 1);
        Ok(())
    }

    /// Records an authoritative position as the interpolation target. The velocity
    /// replaces the local one and only scales the interpolation speed.
    pub fn set_destination(
        &mut self,
        id: Entity,
        position: Vec2,
        velocity: Vec2,
    ) -> Result<(), StoreError> {
        if id >= self.count || self.destinations.is_empty() {
            return Err(StoreError::OutOfRange {
                id,
                bound: self.count,
            });
        }

        let i = id as usize;
        self.destinations[i] = position;
        self.velocities[i] = velocity;
        Ok(())
    }

    /// Drops every entity at or above `new_count` and tombstones the boundary slot.
    pub fn truncate(&mut self, new_count: u32) -> Result<(), StoreError> {
        if new_count > self.count {
            return Err(StoreError::BeyondCount {
                requested: new_count,
                count: self.count,
            });
        }

        self.count = new_count;
        if let Some(color) = self.colors.get_mut(new_count as usize) {
            color.a = Rgba::TOMBSTONE;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.positions.fill(Vec2::ZERO);
        self.velocities.fill(Vec2::ZERO);
        self.colors.fill(Rgba::default());
        self.destinations.fill(Vec2::ZERO);
    }
}

fn random_velocity<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    Vec2::new(
        rng.gen_range(-300..=300) as f32 / 60.0,
        rng.gen_range(-300..=300) as f32 / 60.0,
    )
}
