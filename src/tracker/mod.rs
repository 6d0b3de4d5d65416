pub mod gate;
pub mod mapper;
pub mod pipeline;
pub mod registry;

pub use gate::{GateConfig, SpawnEvent, SpawnGate};
pub use mapper::{map_range, scatter, Viewport};
pub use pipeline::{FrameDispatcher, SpawnSink};
pub use registry::{EntityKey, Registry, TrackedEntity};
