use std::path::Path;

use anyhow::Context;
use shadowclass::File;

/// Memory-map a class file.
pub fn load_class(path: &Path) -> anyhow::Result<File> {
    File::from_file(path).with_context(|| format!("failed to load class file: {}", path.display()))
}

/// Format access flags the way `javap -v` prints them.
pub fn format_access(bits: u16) -> String {
    format!("0x{bits:04x}")
}
