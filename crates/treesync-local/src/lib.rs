//! Native backends for the treesync server: direct filesystem calls for the
//! tree (no shell processes) and a file-backed bearer-token allow-list.

mod fs;
mod tokens;

pub use fs::LocalFileOperations;
pub use tokens::{TokenFile, TokenFileError};
