use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::YamasError;

/// Longest suffixes first so `.fastq.gz` is not mistaken for `.gz`.
const READ_EXTENSIONS: [&str; 4] = [".fastq.gz", ".fq.gz", ".fastq", ".fq"];

/// File name without its read extension, or `None` when it is not a read file.
pub fn read_stem(file_name: &str) -> Option<&str> {
    READ_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(ext))
        .filter(|stem| !stem.is_empty())
}

/// Read files directly inside `dir`, sorted by file name. Hidden files are skipped.
pub fn list_read_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, YamasError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| YamasError::Input(format!("cannot list reads in {dir}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| YamasError::Input(err.to_string()))?;
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            tracing::warn!(path = %entry.path().display(), "skipping non-utf8 file name");
            continue;
        };
        let Some(name) = path.file_name() else {
            continue;
        };
        if name.starts_with('.') || !path.as_std_path().is_file() || read_stem(name).is_none() {
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub fn find_first_ext(root: &Utf8Path, ext: &str) -> Option<Utf8PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(entries) = fs::read_dir(path.as_std_path()) else {
            continue;
        };
        let mut children = entries
            .flatten()
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
            .collect::<Vec<_>>();
        children.sort();
        for child in children {
            if child.as_std_path().is_dir() {
                stack.push(child);
            } else if child
                .extension()
                .map(|value| value.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
            {
                return Some(child);
            }
        }
    }
    None
}

/// Sub-directories of `dir`, sorted.
pub fn list_dirs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, YamasError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| YamasError::Storage(format!("read {dir}: {err}")))?;
    let mut dirs = entries
        .flatten()
        .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.path()).ok())
        .filter(|path| path.as_std_path().is_dir())
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

/// Writes through a temp file in the same directory so readers never see a partial file.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), YamasError> {
    let parent = path
        .parent()
        .ok_or_else(|| YamasError::Storage(format!("invalid destination path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| YamasError::Storage(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".yamas-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| YamasError::Storage(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| YamasError::Storage(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| YamasError::Storage(format!("write {path}: {err}")))?;
    Ok(())
}
