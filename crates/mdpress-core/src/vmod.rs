use std::path::{Path, PathBuf};

/// Prefix marking an id as one of ours to the build tool's resolver
pub const VIRTUAL_PREFIX: &str = "virtual:mdpress/";

/// Extension appended so downstream loaders treat the module as JSX
pub const OUTPUT_EXT: &str = ".jsx";

/// Build the virtual module id for a source file:
/// prefix + absolute path + output extension
pub fn to_virtual_id(path: &Path) -> String {
    format!("{VIRTUAL_PREFIX}{}{OUTPUT_EXT}", path.display())
}

/// Recover the source path from a virtual id; None if the id is not
/// ours. Exact inverse of to_virtual_id.
pub fn parse_virtual_id(id: &str) -> Option<PathBuf> {
    let rest = id.strip_prefix(VIRTUAL_PREFIX)?;
    let path = rest.strip_suffix(OUTPUT_EXT)?;
    Some(PathBuf::from(path))
}
