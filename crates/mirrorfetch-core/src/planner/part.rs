use std::path::{Path, PathBuf};

/// One part of one file base, with its derived on-disk name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    pub file_base: String,
    pub part_number: u32,
    /// `{file_base}.part{part_number}.{extension}`
    pub target_filename: String,
    pub destination_path: PathBuf,
}

impl PartDescriptor {
    pub fn new(file_base: &str, part_number: u32, extension: &str, root: &Path) -> Self {
        let extension = extension.trim_start_matches('.');
        let target_filename = if extension.is_empty() {
            format!("{file_base}.part{part_number}")
        } else {
            format!("{file_base}.part{part_number}.{extension}")
        };
        let destination_path = root.join(&target_filename);
        Self {
            file_base: file_base.to_string(),
            part_number,
            target_filename,
            destination_path,
        }
    }
}
