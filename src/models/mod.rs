/// Domain documents carried inside events
pub mod media;
pub mod post;

pub use media::MediaMetadata;
pub use post::{PropertyValue, Post};
