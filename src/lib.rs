pub mod config;
pub mod error;
pub mod events;
pub mod geometry;
pub mod input;
pub mod playback;
pub mod scan;
pub mod settings;
pub mod render {
    pub mod frames;
    pub mod indicator;
    pub mod loader;
    pub mod viewer;
}
