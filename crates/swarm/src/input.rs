use bitflags::bitflags;
use glam::Vec2;

bitflags! {
    /// Actions requested by the user during one frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Triggers: u8 {
        const SPAWN = 1 << 0;
        const DESTROY = 1 << 1;
    }
}

/// Everything a role reads from the user in one frame. `pointer` is in world units.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub triggers: Triggers,
    pub pointer: Vec2,
}

impl FrameInput {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn spawn_at(pointer: Vec2) -> Self {
        Self {
            triggers: Triggers::SPAWN,
            pointer,
        }
    }

    pub fn destroy() -> Self {
        Self {
            triggers: Triggers::DESTROY,
            pointer: Vec2::ZERO,
        }
    }

    pub fn spawn(&self) -> bool {
        self.triggers.contains(Triggers::SPAWN)
    }

    pub fn destroy_requested(&self) -> bool {
        self.triggers.contains(Triggers::DESTROY)
    }
}

/// Maps a rectangle of terminal cells onto the world, whose origin is the top-left corner
/// with y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: u16,
    pub top: u16,
    pub columns: u16,
    pub rows: u16,
    pub world: Vec2,
}

impl Viewport {
    pub fn new(left: u16, top: u16, columns: u16, rows: u16, world: Vec2) -> Self {
        Self {
            left,
            top,
            columns,
            rows,
            world,
        }
    }

    /// World position under the center of a cell, `None` outside the viewport.
    pub fn cell_to_world(&self, column: u16, row: u16) -> Option<Vec2> {
        if self.columns == 0 || self.rows == 0 {
            return None;
        }
        if column < self.left || row < self.top {
            return None;
        }

        let (dx, dy) = (column - self.left, row - self.top);
        if dx >= self.columns || dy >= self.rows {
            return None;
        }

        Some(Vec2::new(
            (dx as f32 + 0.5) * self.world.x / self.columns as f32,
            (dy as f32 + 0.5) * self.world.y / self.rows as f32,
        ))
    }

    /// Canvas coordinates have y growing upwards.
    pub fn world_to_canvas(&self, position: Vec2) -> (f64, f64) {
        (position.x as f64, (self.world.y - position.y) as f64)
    }
}
