pub mod config;
pub mod coordinator;
pub mod error;
pub mod observer;
pub mod source;
pub mod state;

pub use config::{CaptureConfig, MeshLevelOfDetail, QuerySettings};
pub use coordinator::{PollingCoordinator, Publication};
pub use error::{CaptureError, CaptureResult};
pub use observer::{AccessStatus, SceneObserver};
pub use source::{select_source, DeviceSceneSource, SceneSource, StaticSceneSource};
pub use state::{Phase, PollFailure, PollStatus};
