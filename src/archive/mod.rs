//! Packing of the render output directory.
//!
//! The finished output tree is packed into a single uncompressed tar
//! archive with deterministic entry order. Whatever is in the directory at
//! pack time is archived as-is; there is no completion marker, so partial
//! renderer output produces a partial archive.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Summary of a packed archive.
#[derive(Debug)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub entries: usize,
    pub bytes: u64,
}

/// Pack the entire contents of `src` into an uncompressed tar at `dest`.
///
/// Entry paths are relative to `src` and sorted, so packing the same tree
/// twice yields identical archives. A missing source directory is an error;
/// an empty one produces an empty archive.
pub fn pack_dir(src: &Path, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
    if !src.is_dir() {
        return Err(ArchiveError::SourceMissing(src.to_path_buf()));
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(dest)?;
    let mut builder = tar::Builder::new(file);
    let mut entries = 0;

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if path == src {
            continue;
        }
        let relative = path
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;

        if entry.file_type().is_dir() {
            builder.append_dir(relative, path)?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(path, relative)?;
            entries += 1;
        }
    }

    let file = builder.into_inner()?;
    let bytes = file.metadata()?.len();

    if entries == 0 {
        warn!(src = %src.display(), "output directory had no files to archive");
    }
    info!(archive = %dest.display(), entries, bytes, "archive packed");

    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries,
        bytes,
    })
}

/// List the file entries of a tar archive, in archive order.
pub fn list_entries(archive: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(file);
    let mut names = Vec::new();
    for entry in tar.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            names.push(entry.path()?.display().to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(dir: &Path) {
        std::fs::create_dir_all(dir.join("model/chair/IKEA_X")).unwrap();
        std::fs::write(dir.join("model/chair/IKEA_X/view-000001.png"), b"png1").unwrap();
        std::fs::write(dir.join("model/chair/IKEA_X/view-000002.png"), b"png2").unwrap();
        std::fs::create_dir_all(dir.join("model/bed/IKEA_Y")).unwrap();
        std::fs::write(dir.join("model/bed/IKEA_Y/view-000001.png"), b"png3").unwrap();
    }

    #[test]
    fn test_pack_dir_contains_exactly_the_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("renders");
        populate(&src);
        let dest = dir.path().join("renders.tar");

        let summary = pack_dir(&src, &dest).unwrap();
        assert_eq!(summary.entries, 3);
        assert!(summary.bytes > 0);

        let mut names = list_entries(&dest).unwrap();
        names.sort();
        assert_eq!(
            names,
            vec![
                "model/bed/IKEA_Y/view-000001.png",
                "model/chair/IKEA_X/view-000001.png",
                "model/chair/IKEA_X/view-000002.png",
            ]
        );
    }

    #[test]
    fn test_pack_dir_roundtrip_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("renders");
        populate(&src);
        let dest = dir.path().join("renders.tar");
        pack_dir(&src, &dest).unwrap();

        let unpack_dir = dir.path().join("unpacked");
        std::fs::create_dir_all(&unpack_dir).unwrap();
        let mut tar = tar::Archive::new(File::open(&dest).unwrap());
        tar.unpack(&unpack_dir).unwrap();

        assert_eq!(
            std::fs::read(unpack_dir.join("model/chair/IKEA_X/view-000002.png")).unwrap(),
            b"png2"
        );
        assert_eq!(
            std::fs::read(unpack_dir.join("model/bed/IKEA_Y/view-000001.png")).unwrap(),
            b"png3"
        );
    }

    #[test]
    fn test_pack_dir_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("renders");
        populate(&src);

        let first = dir.path().join("a.tar");
        let second = dir.path().join("b.tar");
        pack_dir(&src, &first).unwrap();
        pack_dir(&src, &second).unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_pack_dir_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = pack_dir(&dir.path().join("missing"), &dir.path().join("out.tar"));
        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
    }

    #[test]
    fn test_pack_dir_empty_source_is_archived() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("renders");
        std::fs::create_dir_all(&src).unwrap();
        let dest = dir.path().join("renders.tar");

        let summary = pack_dir(&src, &dest).unwrap();
        assert_eq!(summary.entries, 0);
        assert!(dest.is_file());
        assert!(list_entries(&dest).unwrap().is_empty());
    }
}
