//! Snapshot extraction over the installed source tree.
//!
//! Snapshots are gzipped tarballs whose entries all live under one top-level
//! directory (`owner-name-<sha>/`). That directory is stripped and the rest is
//! written over `dest` in place. Files not present in the snapshot are left
//! alone.
//!
//! Replacement is not atomic: an error partway leaves a mix of old and new
//! files on disk. The caller keeps the old version marker in that case, so
//! the next check installs the whole snapshot again.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, trace};

use crate::error::{Result, UpdateError};

/// Extract a gzipped tarball snapshot into `dest`.
///
/// Returns the number of files and symlinks written.
///
/// # Errors
///
/// - `UpdateError::Archive` for a corrupt or truncated archive
/// - `UpdateError::UnsafePath` for an entry (or symlink target) escaping
///   `dest`
/// - `UpdateError::Io` for filesystem failures
pub fn install_snapshot(snapshot: &[u8], dest: &Path) -> Result<usize> {
    unpack(GzDecoder::new(snapshot), dest)
}

fn unpack<R: Read>(reader: R, dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(reader);
    let mut installed = 0;

    for entry in archive.entries().map_err(UpdateError::archive)? {
        let mut entry = entry.map_err(UpdateError::archive)?;
        let entry_type = entry.header().entry_type();

        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let path = entry.path().map_err(UpdateError::archive)?.into_owned();
        let Some(relative) = strip_top_level(&path)? else {
            continue;
        };
        let target = dest.join(&relative);

        match entry_type {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                create_parent(&target)?;
                let expected = entry.size();
                entry.unpack(&target).map_err(UpdateError::archive)?;

                let written = fs::metadata(&target)?.len();
                if written != expected {
                    return Err(UpdateError::archive(format!(
                        "{} truncated: {written} of {expected} bytes",
                        relative.display()
                    )));
                }
                trace!(path = %relative.display(), bytes = written, "Installed file");
                installed += 1;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(UpdateError::archive)?
                    .ok_or_else(|| UpdateError::archive("symlink without target"))?
                    .into_owned();
                let depth = relative.components().count() - 1;
                if !is_contained(&link, depth) {
                    return Err(UpdateError::unsafe_path(&link));
                }

                create_parent(&target)?;
                if target.symlink_metadata().is_ok() {
                    fs::remove_file(&target)?;
                }
                entry.unpack(&target).map_err(UpdateError::archive)?;
                installed += 1;
            }
            other => {
                debug!(path = %relative.display(), entry_type = ?other, "Skipping archive entry");
            }
        }
    }

    Ok(installed)
}

/// Drop the top-level directory of an archive path.
///
/// Returns `None` for the top-level directory itself.
fn strip_top_level(path: &Path) -> Result<Option<PathBuf>> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => components.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(UpdateError::unsafe_path(path));
            }
        }
    }

    if components.len() < 2 {
        return Ok(None);
    }
    Ok(Some(components[1..].iter().collect()))
}

/// Whether a relative symlink target, resolved from a directory `depth`
/// levels below the install root, stays inside the install root.
fn is_contained(link: &Path, depth: usize) -> bool {
    let mut depth = depth as isize;
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("repo-abc123/", None)]
    #[case("repo-abc123", None)]
    #[case("repo-abc123/README.md", Some("README.md"))]
    #[case("./repo-abc123/src/main.py", Some("src/main.py"))]
    fn test_strip_top_level(#[case] input: &str, #[case] expected: Option<&str>) {
        let stripped = strip_top_level(Path::new(input)).unwrap();
        assert_eq!(stripped, expected.map(PathBuf::from));
    }

    #[rstest]
    #[case("repo/../../etc/passwd")]
    #[case("/etc/passwd")]
    fn test_strip_rejects_escapes(#[case] input: &str) {
        assert!(matches!(
            strip_top_level(Path::new(input)),
            Err(UpdateError::UnsafePath(_))
        ));
    }

    #[rstest]
    #[case("lib/app.py", 0, true)]
    #[case("./app.py", 0, true)]
    #[case("a/../b", 0, true)]
    #[case("../outside", 0, false)]
    #[case("../sibling", 1, true)]
    #[case("../../outside", 1, false)]
    #[case("a/../../outside", 0, false)]
    #[case("/etc/passwd", 3, false)]
    fn test_is_contained(#[case] link: &str, #[case] depth: usize, #[case] expected: bool) {
        assert_eq!(is_contained(Path::new(link), depth), expected);
    }
}
