//! JSON mirrors of tenant tables, rewritten after every table-affecting write.

pub mod error;
pub mod sync;

pub use error::MirrorError;
pub use sync::{decode_json_columns, MirrorReport, MirrorSync, RowTransform};

pub const MIRROR_EXTENSION: &str = "json";
pub const TEMP_SUFFIX: &str = ".tmp";
