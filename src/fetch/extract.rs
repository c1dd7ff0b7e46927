//! Archive extraction with optional leading-component stripping.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use crate::error::FetchError;

/// Supported archive formats, detected from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Detect the archive kind from a file name.
    pub fn from_name(name: &str) -> Result<Self, FetchError> {
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Ok(ArchiveKind::Tar)
        } else if name.ends_with(".zip") {
            Ok(ArchiveKind::Zip)
        } else {
            Err(FetchError::UnsupportedFormat(name.to_string()))
        }
    }
}

/// Extract an archive into `dest`, dropping `strip_components` leading path
/// components from every entry. Entries fully consumed by stripping are
/// skipped. Returns the number of files written.
///
/// # Errors
///
/// Returns `FetchError::UnsafeEntry` for entries that would escape `dest`
/// (absolute paths or `..` traversal) and `FetchError::UnsupportedFormat`
/// for unrecognized file names.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    strip_components: usize,
) -> Result<usize, FetchError> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| FetchError::UnsupportedFormat(archive.display().to_string()))?;

    match ArchiveKind::from_name(&name)? {
        ArchiveKind::Tar => extract_tar(File::open(archive)?, dest, strip_components),
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(File::open(archive)?), dest, strip_components),
        ArchiveKind::Zip => extract_zip(archive, dest, strip_components),
    }
}

fn extract_tar<R: std::io::Read>(
    reader: R,
    dest: &Path,
    strip_components: usize,
) -> Result<usize, FetchError> {
    let mut archive = tar::Archive::new(reader);
    let mut files = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let raw_path = entry.path()?.into_owned();

        let Some(stripped) = strip_path(&raw_path, strip_components) else {
            continue;
        };
        if !is_safe(&stripped) {
            return Err(FetchError::UnsafeEntry(raw_path.display().to_string()));
        }

        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if entry.header().entry_type().is_file() {
            files += 1;
        }
        entry.unpack(&target)?;
    }

    Ok(files)
}

fn extract_zip(archive: &Path, dest: &Path, strip_components: usize) -> Result<usize, FetchError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut files = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let raw_name = entry.name().to_string();
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(FetchError::UnsafeEntry(raw_name));
        };

        let Some(stripped) = strip_path(&enclosed, strip_components) else {
            continue;
        };
        if !is_safe(&stripped) {
            return Err(FetchError::UnsafeEntry(raw_name));
        }

        let target = dest.join(&stripped);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
            files += 1;
        }
    }

    Ok(files)
}

/// Drop `n` leading components from a path. Returns `None` when nothing
/// remains.
fn strip_path(path: &Path, n: usize) -> Option<PathBuf> {
    let mut components = path.components();
    for _ in 0..n {
        components.next()?;
    }
    let rest: PathBuf = components.collect();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// A path is safe when every component is a normal name.
fn is_safe(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn tar_header(size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(0o644);
        header.set_cksum();
        header
    }

    fn write_test_tar_gz(path: &Path) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let data = b"hello";
        let mut header = tar_header(data.len() as u64);
        builder
            .append_data(&mut header, "top/a.txt", data.as_slice())
            .unwrap();

        let data = b"nested";
        let mut header = tar_header(data.len() as u64);
        builder
            .append_data(&mut header, "top/sub/b.txt", data.as_slice())
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_archive_kind_detection() {
        assert_eq!(ArchiveKind::from_name("x.tar").unwrap(), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::from_name("x.tar.gz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_name("x.tgz").unwrap(), ArchiveKind::TarGz);
        assert_eq!(ArchiveKind::from_name("x.zip").unwrap(), ArchiveKind::Zip);
        assert!(ArchiveKind::from_name("x.tar.xz").is_err());
        assert!(ArchiveKind::from_name("x.rar").is_err());
    }

    #[test]
    fn test_strip_path() {
        assert_eq!(
            strip_path(Path::new("top/sub/file.txt"), 1),
            Some(PathBuf::from("sub/file.txt"))
        );
        assert_eq!(
            strip_path(Path::new("top/file.txt"), 0),
            Some(PathBuf::from("top/file.txt"))
        );
        assert_eq!(strip_path(Path::new("top"), 1), None);
        assert_eq!(strip_path(Path::new("top/file.txt"), 3), None);
    }

    #[test]
    fn test_is_safe_rejects_traversal() {
        assert!(is_safe(Path::new("a/b/c.txt")));
        assert!(!is_safe(Path::new("../escape.txt")));
        assert!(!is_safe(Path::new("/abs/path.txt")));
    }

    #[test]
    fn test_extract_tar_gz_with_strip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("test.tar.gz");
        write_test_tar_gz(&archive);

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, &dest, 1).unwrap();

        assert_eq!(files, 2);
        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "hello");
        assert_eq!(
            std::fs::read_to_string(dest.join("sub/b.txt")).unwrap(),
            "nested"
        );
        assert!(!dest.join("top").exists());
    }

    #[test]
    fn test_extract_tar_gz_without_strip_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("test.tar.gz");
        write_test_tar_gz(&archive);

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, &dest, 0).unwrap();

        assert_eq!(files, 2);
        assert!(dest.join("top/a.txt").exists());
        assert!(dest.join("top/sub/b.txt").exists());
    }

    #[test]
    fn test_extract_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("test.zip");

        let file = File::create(&archive).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("pix3d/pix3d.json", options).unwrap();
        writer.write_all(b"[]").unwrap();
        writer.start_file("pix3d/img/chair/0001.jpg", options).unwrap();
        writer.write_all(b"jpeg").unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let files = extract_archive(&archive, &dest, 0).unwrap();

        assert_eq!(files, 2);
        assert_eq!(
            std::fs::read_to_string(dest.join("pix3d/pix3d.json")).unwrap(),
            "[]"
        );
        assert!(dest.join("pix3d/img/chair/0001.jpg").exists());
    }

    #[test]
    fn test_extract_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("test.rar");
        std::fs::write(&archive, b"not an archive").unwrap();

        let result = extract_archive(&archive, dir.path(), 0);
        assert!(matches!(result, Err(FetchError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_extract_tar_rejects_traversal_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.tar");

        let file = File::create(&archive).unwrap();
        let mut builder = tar::Builder::new(file);
        let data = b"owned";
        // Builder::append_data refuses `..`, so write the name bytes directly.
        let mut header = tar_header(data.len() as u64);
        let name = b"dir/../../escape.txt";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_cksum();
        builder.append(&header, data.as_slice()).unwrap();
        builder.into_inner().unwrap();

        let dest = dir.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        let result = extract_archive(&archive, &dest, 0);
        assert!(matches!(result, Err(FetchError::UnsafeEntry(_))));
    }
}
