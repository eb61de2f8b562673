/// questbind - fiction.live story downloader and EPUB binder
///
/// Core library for fetching a story's metadata and chunk stream from the
/// fiction.live API, rendering chapters, votes, reader posts, and
/// achievements into XHTML, and packing the result into an EPUB 3 book.

pub mod api;
pub mod book;
pub mod config;
pub mod epub;
pub mod error;
pub mod render;

pub use api::{ChunkSource, FictionLiveClient, StoryRef};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use render::{RenderContext, RenderOptions, WinnerPolicy};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
