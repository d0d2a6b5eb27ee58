//! Pulling a database file out of a downloaded zip or tar.gz archive.
//!
//! Blocking I/O; callers run these on `spawn_blocking`.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::TempPath;
use zip::ZipArchive;

use super::InstallError;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = b"\x1f\x8b";

/// File extensions that mark an archive member as the database.
const DB_EXTENSIONS: &[&str] = &[".db", ".sqlite", ".sqlite3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

/// Sniffs the leading bytes of `path`.
pub fn detect(path: &Path) -> io::Result<Option<ArchiveKind>> {
    let mut head = [0u8; 4];
    let mut file = File::open(path)?;
    let mut n = 0;
    while n < head.len() {
        let r = file.read(&mut head[n..])?;
        if r == 0 {
            break;
        }
        n += r;
    }
    let head = &head[..n];
    if head.starts_with(ZIP_MAGIC) {
        Ok(Some(ArchiveKind::Zip))
    } else if head.starts_with(GZIP_MAGIC) {
        Ok(Some(ArchiveKind::TarGz))
    } else {
        Ok(None)
    }
}

fn is_db_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    DB_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// First member with a database extension, else the only member.
fn pick_member(names: &[String]) -> Option<usize> {
    names
        .iter()
        .position(|n| is_db_name(n))
        .or(if names.len() == 1 { Some(0) } else { None })
}

/// Extracts the database member of `archive` into a new temp file next to it.
///
/// Fails with [`InstallError::TooLarge`] once the member grows past
/// `max_ratio` times the archive size.
pub fn extract_database(
    archive: &Path,
    kind: ArchiveKind,
    max_ratio: u64,
) -> Result<(TempPath, u64), InstallError> {
    let archive_len = std::fs::metadata(archive)?.len();
    let limit = archive_len.saturating_mul(max_ratio);
    let dir = archive.parent().unwrap_or_else(|| Path::new("."));
    let out = tempfile::Builder::new()
        .prefix("extract-")
        .suffix(crate::storage::TEMP_SUFFIX)
        .tempfile_in(dir)?;
    let (mut out_file, out_path) = out.into_parts();

    let written = match kind {
        ArchiveKind::Zip => extract_zip(archive, limit, max_ratio, &mut out_file)?,
        ArchiveKind::TarGz => extract_tar_gz(archive, limit, max_ratio, &mut out_file)?,
    };
    out_file.sync_all()?;
    tracing::debug!(
        archive = %archive.display(),
        archive_len,
        extracted = written,
        "extracted database from archive"
    );
    Ok((out_path, written))
}

/// Copies at most `limit` bytes; one more byte available means too large.
fn copy_limited<R: Read>(
    reader: R,
    out: &mut File,
    limit: u64,
    max_ratio: u64,
) -> Result<u64, InstallError> {
    let copied = io::copy(&mut reader.take(limit.saturating_add(1)), out)?;
    if copied > limit {
        return Err(InstallError::TooLarge { ratio: max_ratio });
    }
    Ok(copied)
}

fn extract_zip(
    archive: &Path,
    limit: u64,
    max_ratio: u64,
    out: &mut File,
) -> Result<u64, InstallError> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(archive_err)?;
    let mut members = Vec::new();
    for i in 0..zip.len() {
        let entry = zip.by_index(i).map_err(archive_err)?;
        if !entry.is_dir() {
            members.push((i, entry.name().to_string()));
        }
    }
    let names: Vec<String> = members.iter().map(|(_, n)| n.clone()).collect();
    let picked = pick_member(&names).ok_or(InstallError::NoDatabaseInArchive)?;
    let (index, _) = members[picked];

    let entry = zip.by_index(index).map_err(archive_err)?;
    if entry.size() > limit {
        return Err(InstallError::TooLarge { ratio: max_ratio });
    }
    copy_limited(entry, out, limit, max_ratio)
}

fn extract_tar_gz(
    archive: &Path,
    limit: u64,
    max_ratio: u64,
    out: &mut File,
) -> Result<u64, InstallError> {
    // Entries are streamed, so list names first and extract on a second pass.
    let names = tar_member_names(archive)?;
    let picked = pick_member(&names).ok_or(InstallError::NoDatabaseInArchive)?;
    let wanted = &names[picked];

    let mut tar = Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries().map_err(archive_err)? {
        let entry = entry.map_err(archive_err)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let is_wanted = entry.path().map_err(archive_err)?.to_string_lossy() == wanted.as_str();
        if is_wanted {
            if entry.size() > limit {
                return Err(InstallError::TooLarge { ratio: max_ratio });
            }
            return copy_limited(entry, out, limit, max_ratio);
        }
    }
    Err(InstallError::NoDatabaseInArchive)
}

fn tar_member_names(archive: &Path) -> Result<Vec<String>, InstallError> {
    let mut tar = Archive::new(GzDecoder::new(File::open(archive)?));
    let mut names = Vec::new();
    for entry in tar.entries().map_err(archive_err)? {
        let entry = entry.map_err(archive_err)?;
        if entry.header().entry_type().is_file() {
            names.push(entry.path().map_err(archive_err)?.to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

fn archive_err<E: std::fmt::Display>(e: E) -> InstallError {
    InstallError::Archive(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in members {
            zip.start_file(*name, opts).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, members: &[(&str, &[u8])]) {
        let enc = flate2::write::GzEncoder::new(
            File::create(path).unwrap(),
            flate2::Compression::default(),
        );
        let mut tar = tar::Builder::new(enc);
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append_data(&mut header, name, *data).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn detects_by_magic_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("a.bin");
        write_zip(&zip, &[("x.db", b"data")]);
        assert_eq!(detect(&zip).unwrap(), Some(ArchiveKind::Zip));

        let tgz = dir.path().join("b.bin");
        write_tar_gz(&tgz, &[("x.db", b"data")]);
        assert_eq!(detect(&tgz).unwrap(), Some(ArchiveKind::TarGz));

        let plain = dir.path().join("c.db");
        std::fs::write(&plain, b"SQLite format 3\0").unwrap();
        assert_eq!(detect(&plain).unwrap(), None);

        let tiny = dir.path().join("d");
        std::fs::write(&tiny, b"P").unwrap();
        assert_eq!(detect(&tiny).unwrap(), None);
    }

    #[test]
    fn picks_database_member() {
        let names = vec!["README.md".to_string(), "data/test.sqlite".to_string()];
        assert_eq!(pick_member(&names), Some(1));
        assert_eq!(pick_member(&["only.bin".to_string()]), Some(0));
        assert_eq!(pick_member(&["a.txt".to_string(), "b.txt".to_string()]), None);
    }

    #[test]
    fn extracts_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("database.zip");
        write_zip(&zip, &[("notes.txt", b"hi"), ("test.db", b"database bytes")]);
        let (path, len) = extract_database(&zip, ArchiveKind::Zip, 20).unwrap();
        assert_eq!(len, 14);
        assert_eq!(std::fs::read(&path).unwrap(), b"database bytes");
    }

    #[test]
    fn extracts_from_tar_gz() {
        let dir = tempfile::tempdir().unwrap();
        let tgz = dir.path().join("database.tar.gz");
        write_tar_gz(&tgz, &[("test.db", b"database bytes")]);
        let (path, len) = extract_database(&tgz, ArchiveKind::TarGz, 20).unwrap();
        assert_eq!(len, 14);
        assert_eq!(std::fs::read(&path).unwrap(), b"database bytes");
    }

    #[test]
    fn refuses_compression_bomb() {
        let dir = tempfile::tempdir().unwrap();
        let payload = vec![b'x'; 2 * 1024 * 1024];
        let zip = dir.path().join("bomb.zip");
        write_zip(&zip, &[("test.db", &payload)]);
        let err = extract_database(&zip, ArchiveKind::Zip, 20).unwrap_err();
        assert!(err
            .to_string()
            .contains("would be more than 20x the size of the archive"));

        let tgz = dir.path().join("bomb.tar.gz");
        write_tar_gz(&tgz, &[("test.db", &payload)]);
        let err = extract_database(&tgz, ArchiveKind::TarGz, 20).unwrap_err();
        assert!(matches!(err, InstallError::TooLarge { ratio: 20 }));
    }

    #[test]
    fn archive_without_database() {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("docs.zip");
        write_zip(&zip, &[("a.txt", b"a"), ("b.txt", b"b")]);
        assert!(matches!(
            extract_database(&zip, ArchiveKind::Zip, 20),
            Err(InstallError::NoDatabaseInArchive)
        ));
    }
}
