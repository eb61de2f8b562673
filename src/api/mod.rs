pub mod client;
pub mod model;
pub mod urls;

pub use client::{ChunkSource, FictionLiveClient};
pub use model::{Chunk, StoryMetadata};
pub use urls::StoryRef;
