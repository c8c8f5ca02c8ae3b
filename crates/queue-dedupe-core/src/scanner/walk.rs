use crate::model::NewFile;
use glob::Pattern;
use std::io;
use std::path::{Component, Path};
use tracing::{debug, error};
use walkdir::WalkDir;

/// Collect every regular file under `root` as one batch, in file-name order.
///
/// Symlinks are not followed. Paths matching an ignore pattern are skipped,
/// and an ignored directory is not descended into. Each file's folder path
/// starts with the name of `root` itself.
pub fn collect_batch(root: &Path, ignore_globs: &[String]) -> io::Result<Vec<NewFile>> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Not a directory: {}", root.display()),
        ));
    }

    let ignore_patterns = compile_patterns(ignore_globs);
    let base = root.parent().unwrap_or(root);
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry.path(), &ignore_patterns));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let denied = err
                    .io_error()
                    .map_or(false, |e| e.kind() == io::ErrorKind::PermissionDenied);
                if denied {
                    error!("Access denied while scanning {}: {}", root.display(), err);
                    continue;
                }
                return Err(err.into());
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let folder_path = path
            .parent()
            .and_then(|parent| parent.strip_prefix(base).ok())
            .map(folder_path_of)
            .unwrap_or_default();

        let file = NewFile::from_path(path, folder_path).map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error getting metadata for {}: {}", path.display(), err),
            )
        })?;
        files.push(file);
    }

    debug!("Collected {} files from {}", files.len(), root.display());
    Ok(files)
}

fn compile_patterns(globs: &[String]) -> Vec<Pattern> {
    globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect()
}

fn is_ignored(path: &Path, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| pattern.matches_path(path))
}

/// `/`-joined folder path, independent of the platform separator.
fn folder_path_of(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
