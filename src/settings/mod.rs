// Sound settings and persistence

pub mod settings;

pub use settings::{ClipRegistry, ClipSettings, SoundSettings};
