//! Domain types for GridStrike

pub mod bar;
pub mod fill;
pub mod grid;
pub mod ids;
pub mod position;

pub use bar::{Bar, BarError};
pub use fill::FillEvent;
pub use grid::{GridLevel, LevelStatus, Side};
pub use ids::{ConfigHash, DatasetHash, FillId, FillIdGen, LevelId, RunId};
pub use position::PositionSnapshot;
