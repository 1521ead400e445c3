//! Built-in filter stages.

mod crop;
mod geometric;
mod kernel;
mod tonal;

pub use crop::CropStage;
pub use geometric::GeometricStage;
pub use kernel::{KernelOp, KernelStage, MAX_RADIUS};
pub use tonal::ToneStage;
