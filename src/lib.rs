#[cfg(feature = "desktop")]
pub mod camera;
pub mod config;
pub mod pose;
pub mod protocol;
pub mod region;
pub mod render;
pub mod scene;
pub mod tracker;
