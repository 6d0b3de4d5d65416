pub mod detector;
pub mod keypoint;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod tracking;

pub use detector::MoveNetDetector;
pub use keypoint::{Keypoint, KeypointIndex, Observation, Person};
#[cfg(feature = "desktop")]
pub use preprocess::{preprocess_for_multipose, MULTIPOSE_INPUT_SIZE};
pub use tracking::TrackAssigner;
