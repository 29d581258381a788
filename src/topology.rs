//! Infers whether converted reads are single- or paired-ended from their file names.
//!
//! `fasterq-dump --split-files` names paired reads `<run>_1.fastq` / `<run>_2.fastq` and
//! single reads `<run>.fastq`. Sorted, the first two files of a paired run therefore share
//! the run accession, while the first two files of a single-ended dataset belong to two
//! different runs. One distinct identifier in the sample means paired.

use std::collections::BTreeSet;

use camino::Utf8Path;

use crate::domain::ReadTopology;
use crate::error::YamasError;
use crate::fs_util::{list_read_files, read_stem};

/// Number of sorted file names inspected.
pub const SAMPLE_SIZE: usize = 2;

const SAMPLE_SEPARATOR: char = '_';

pub fn detect(root: &Utf8Path, reads_dir: &Utf8Path) -> Result<ReadTopology, YamasError> {
    let files = list_read_files(reads_dir)?;
    if files.is_empty() {
        return Err(YamasError::Input(format!(
            "no read files found in {reads_dir}"
        )));
    }

    let names = files
        .iter()
        .filter_map(|path| path.file_name())
        .take(SAMPLE_SIZE)
        .collect::<Vec<_>>();
    let has_reverse = classify(&names);
    tracing::info!(
        reads = %reads_dir,
        files = files.len(),
        sampled = ?names,
        paired = has_reverse,
        "detected read topology"
    );
    Ok(ReadTopology::new(root, has_reverse))
}

/// `true` when every sampled name shares one leading identifier. A lone file is single-ended.
pub fn classify(names: &[&str]) -> bool {
    if names.len() < 2 {
        return false;
    }
    let identifiers = names
        .iter()
        .filter_map(|name| read_stem(name))
        .map(sample_identifier)
        .collect::<BTreeSet<_>>();
    identifiers.len() == 1
}

pub fn sample_identifier(stem: &str) -> &str {
    stem.split(SAMPLE_SEPARATOR).next().unwrap_or(stem)
}
