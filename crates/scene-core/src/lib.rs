pub mod constants;
pub mod scene;
pub mod transform;

pub use scene::{Scene, SceneObject, SceneObjectKind, SceneQuad};
pub use transform::{floor_alignment, read_or_infer, resolve};
