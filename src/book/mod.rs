pub mod assemble;
pub mod partition;

pub use assemble::{
    download_sections, render_section, BookSection, NoopProgress, ProgressSink, SectionKind,
};
pub use partition::{partition_story, BookMap, RouteSection, Section};
