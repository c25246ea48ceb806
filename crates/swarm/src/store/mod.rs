mod color;
mod entities;

pub use color::{PALETTE, Rgb, Rgba};
pub use entities::{EntityStore, StoreError};

pub type Entity = u32;

pub const MAX_ENTITIES: u32 = 100_000;
