//! Source archive extraction.
//!
//! Accepts zip and gzip-compressed tar archives, detected by content rather
//! than file name. Entries that would land outside the destination are refused.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::WorkspaceError;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
const EMPTY_ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

/// Sniff the archive format from its leading bytes.
pub fn detect_format(path: &Path) -> Result<ArchiveFormat, WorkspaceError> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    let read = file.read(&mut header)?;

    if read >= 4 && (header == ZIP_MAGIC || header == EMPTY_ZIP_MAGIC) {
        Ok(ArchiveFormat::Zip)
    } else if read >= 2 && header[..2] == GZIP_MAGIC {
        Ok(ArchiveFormat::TarGz)
    } else {
        Err(WorkspaceError::UnknownFormat)
    }
}

/// Extract `archive` into `dest` and return the root of the extracted tree.
///
/// When the archive holds a single top-level directory, that directory is
/// the root.
pub async fn extract(archive: &Path, dest: &Path) -> Result<PathBuf, WorkspaceError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| WorkspaceError::Archive(format!("extraction task failed: {}", e)))?
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<PathBuf, WorkspaceError> {
    fs::create_dir_all(dest)?;

    let format = detect_format(archive)?;
    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest)?,
    }

    let root = single_root(dest)?.unwrap_or_else(|| dest.to_path_buf());
    debug!(format = ?format, root = %root.display(), "Extracted archive");
    Ok(root)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), WorkspaceError> {
    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| WorkspaceError::UnsafePath(entry.name().to_string()))?;
        let out = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }

    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), WorkspaceError> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));

    for entry in tar.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.display().to_string();
        if !entry.unpack_in(dest)? {
            return Err(WorkspaceError::UnsafePath(name));
        }
    }

    Ok(())
}

/// The lone top-level directory of `dir`, if it has exactly one entry and that
/// entry is a directory.
fn single_root(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = fs::read_dir(dir)?;
    let first = match entries.next() {
        Some(entry) => entry?,
        None => return Ok(None),
    };
    if entries.next().is_some() {
        return Ok(None);
    }
    if first.file_type()?.is_dir() {
        Ok(Some(first.path()))
    } else {
        Ok(None)
    }
}
