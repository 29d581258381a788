use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::ReadTopology;
use crate::error::YamasError;
use crate::fs_util::{self, list_read_files, read_stem};

pub const SAMPLE_ID_HEADER: &str = "SampleID";
pub const SINGLE_PATH_HEADER: &str = "absolute-filepath";
pub const FORWARD_PATH_HEADER: &str = "forward-absolute-filepath";
pub const REVERSE_PATH_HEADER: &str = "reverse-absolute-filepath";

const FORWARD_MARKER: &str = "_1";
const REVERSE_MARKER: &str = "_2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SampleReads {
    Single(Utf8PathBuf),
    Paired {
        forward: Utf8PathBuf,
        reverse: Utf8PathBuf,
    },
}

impl SampleReads {
    pub fn paths(&self) -> Vec<&Utf8Path> {
        match self {
            SampleReads::Single(path) => vec![path.as_path()],
            SampleReads::Paired { forward, reverse } => vec![forward.as_path(), reverse.as_path()],
        }
    }
}

/// Sample id to read file(s), in the layout the demultiplexing toolkit imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    paired: bool,
    samples: BTreeMap<String, SampleReads>,
}

impl Manifest {
    pub fn from_reads(topology: &ReadTopology, reads_dir: &Utf8Path) -> Result<Self, YamasError> {
        let files = list_read_files(reads_dir)?;
        if files.is_empty() {
            return Err(YamasError::Input(format!(
                "no read files found in {reads_dir}"
            )));
        }
        if topology.is_paired() {
            Self::paired(files)
        } else {
            Self::single(files)
        }
    }

    fn single(files: Vec<Utf8PathBuf>) -> Result<Self, YamasError> {
        let mut samples = BTreeMap::new();
        for path in files {
            let sample = stem_of(&path)?.to_string();
            insert_unique(&mut samples, sample, SampleReads::Single(path))?;
        }
        Ok(Self {
            paired: false,
            samples,
        })
    }

    fn paired(files: Vec<Utf8PathBuf>) -> Result<Self, YamasError> {
        let mut forward = Vec::new();
        let mut reverse = Vec::new();
        for path in files {
            let stem = stem_of(&path)?;
            if let Some(base) = stem.strip_suffix(FORWARD_MARKER) {
                forward.push((base.to_string(), path));
            } else if let Some(base) = stem.strip_suffix(REVERSE_MARKER) {
                reverse.push((base.to_string(), path));
            } else {
                tracing::debug!(file = %path, "ignoring read file without a forward/reverse marker");
            }
        }

        if forward.len() != reverse.len() {
            return Err(YamasError::Input(format!(
                "paired reads are unbalanced: {} forward files, {} reverse files",
                forward.len(),
                reverse.len()
            )));
        }
        if forward.is_empty() {
            return Err(YamasError::Input(
                "paired topology but no `_1`/`_2` read files".to_string(),
            ));
        }

        forward.sort_by(|a, b| a.1.cmp(&b.1));
        reverse.sort_by(|a, b| a.1.cmp(&b.1));

        let mut samples = BTreeMap::new();
        for ((forward_base, forward_path), (reverse_base, reverse_path)) in
            forward.into_iter().zip(reverse)
        {
            if forward_base != reverse_base {
                tracing::warn!(
                    forward = %forward_path,
                    reverse = %reverse_path,
                    "paired files matched by position have different base names"
                );
            }
            insert_unique(
                &mut samples,
                forward_base,
                SampleReads::Paired {
                    forward: forward_path,
                    reverse: reverse_path,
                },
            )?;
        }
        Ok(Self {
            paired: true,
            samples,
        })
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, sample: &str) -> Option<&SampleReads> {
        self.samples.get(sample)
    }

    pub fn samples(&self) -> impl Iterator<Item = (&str, &SampleReads)> {
        self.samples
            .iter()
            .map(|(sample, reads)| (sample.as_str(), reads))
    }

    pub fn to_tsv(&self) -> Result<Vec<u8>, YamasError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        let header: &[&str] = if self.paired {
            &[SAMPLE_ID_HEADER, FORWARD_PATH_HEADER, REVERSE_PATH_HEADER]
        } else {
            &[SAMPLE_ID_HEADER, SINGLE_PATH_HEADER]
        };
        writer.write_record(header).map_err(format_error)?;
        for (sample, reads) in &self.samples {
            let mut record = vec![sample.as_str()];
            record.extend(reads.paths().into_iter().map(Utf8Path::as_str));
            writer.write_record(&record).map_err(format_error)?;
        }
        writer
            .into_inner()
            .map_err(|err| YamasError::Format(err.to_string()))
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), YamasError> {
        fs_util::write_atomic(path, &self.to_tsv()?)?;
        tracing::info!(manifest = %path, samples = self.len(), paired = self.paired, "wrote manifest");
        Ok(())
    }

    pub fn read(path: &Utf8Path) -> Result<Self, YamasError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path.as_std_path())
            .map_err(|err| YamasError::Input(format!("open manifest {path}: {err}")))?;
        let header = reader.headers().map_err(format_error)?.clone();
        let columns = header.iter().collect::<Vec<_>>();
        let paired = match columns.as_slice() {
            [SAMPLE_ID_HEADER, SINGLE_PATH_HEADER] => false,
            [SAMPLE_ID_HEADER, FORWARD_PATH_HEADER, REVERSE_PATH_HEADER] => true,
            _ => {
                return Err(YamasError::Format(format!(
                    "unrecognised manifest header in {path}: {columns:?}"
                )));
            }
        };

        let mut samples = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(format_error)?;
            let reads = if paired {
                SampleReads::Paired {
                    forward: Utf8PathBuf::from(&record[1]),
                    reverse: Utf8PathBuf::from(&record[2]),
                }
            } else {
                SampleReads::Single(Utf8PathBuf::from(&record[1]))
            };
            insert_unique(&mut samples, record[0].to_string(), reads)?;
        }
        Ok(Self { paired, samples })
    }
}

fn stem_of(path: &Utf8Path) -> Result<&str, YamasError> {
    path.file_name()
        .and_then(read_stem)
        .ok_or_else(|| YamasError::Input(format!("not a read file: {path}")))
}

fn insert_unique(
    samples: &mut BTreeMap<String, SampleReads>,
    sample: String,
    reads: SampleReads,
) -> Result<(), YamasError> {
    match samples.entry(sample) {
        Entry::Occupied(entry) => Err(YamasError::Input(format!(
            "duplicate sample id in reads: {}",
            entry.key()
        ))),
        Entry::Vacant(entry) => {
            entry.insert(reads);
            Ok(())
        }
    }
}

fn format_error(err: csv::Error) -> YamasError {
    YamasError::Format(err.to_string())
}
