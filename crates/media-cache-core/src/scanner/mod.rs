pub mod walk;

pub use walk::{build_parent_to_files_map, compile_patterns, MediaFile};
