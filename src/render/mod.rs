pub mod sprite;
#[cfg(feature = "desktop")]
pub mod window;

pub use sprite::{Sprite, SpriteStage, SpriteTiming};
#[cfg(feature = "desktop")]
pub use window::{load_background, InstallationWindow, Texture};
