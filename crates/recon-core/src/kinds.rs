//! Built-in entity kinds.

mod floor;
mod grid;
mod level;

pub use floor::FloorReconciler;
pub use grid::GridReconciler;
pub use level::LevelReconciler;
