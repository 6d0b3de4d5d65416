pub mod capture;

pub use capture::CameraFeed;
