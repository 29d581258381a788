use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::YamasError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = YamasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            && !trimmed.starts_with('.');
        if !is_valid {
            return Err(YamasError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for DatasetId {
    type Error = YamasError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetId> for String {
    fn from(value: DatasetId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum DataType {
    #[serde(rename = "16S")]
    #[value(name = "16S")]
    Amplicon16S,
    #[serde(rename = "18S")]
    #[value(name = "18S")]
    Amplicon18S,
    #[serde(rename = "Shotgun")]
    #[value(name = "Shotgun")]
    Shotgun,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Amplicon16S => "16S",
            DataType::Amplicon18S => "18S",
            DataType::Shotgun => "Shotgun",
        }
    }

    pub fn is_amplicon(&self) -> bool {
        match self {
            DataType::Amplicon16S | DataType::Amplicon18S => true,
            DataType::Shotgun => false,
        }
    }

    /// Artifact name of the taxonomy produced by the classifier for this marker gene.
    pub fn classification_artifact(&self) -> Result<&'static str, YamasError> {
        match self {
            DataType::Amplicon16S => Ok("gg-13-8-99-nb-classified.qza"),
            DataType::Amplicon18S => Ok("silva-132-99-nb-classified.qza"),
            DataType::Shotgun => Err(YamasError::Input(
                "shotgun datasets are not classified with a marker-gene classifier".to_string(),
            )),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = YamasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "16s" => Ok(DataType::Amplicon16S),
            "18s" => Ok(DataType::Amplicon18S),
            "shotgun" => Ok(DataType::Shotgun),
            _ => Err(YamasError::InvalidDataType(value.to_string())),
        }
    }
}

/// Whether a run's reads are single-ended or paired-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadTopology {
    root_directory: Utf8PathBuf,
    has_forward: bool,
    has_reverse: bool,
}

impl ReadTopology {
    pub fn new(root_directory: impl Into<Utf8PathBuf>, has_reverse: bool) -> Self {
        Self {
            root_directory: root_directory.into(),
            has_forward: true,
            has_reverse,
        }
    }

    /// Rebuilds a topology from persisted flags. A dataset without forward reads is never valid.
    pub fn from_flags(
        root_directory: impl Into<Utf8PathBuf>,
        has_forward: bool,
        has_reverse: bool,
    ) -> Result<Self, YamasError> {
        if !has_forward {
            return Err(YamasError::Resumption(
                "recorded topology has no forward reads".to_string(),
            ));
        }
        Ok(Self::new(root_directory, has_reverse))
    }

    pub fn root_directory(&self) -> &Utf8Path {
        &self.root_directory
    }

    pub fn has_forward(&self) -> bool {
        self.has_forward
    }

    pub fn has_reverse(&self) -> bool {
        self.has_reverse
    }

    pub fn is_paired(&self) -> bool {
        self.has_forward && self.has_reverse
    }

    pub fn label(&self) -> &'static str {
        if self.is_paired() { "paired" } else { "single" }
    }
}

/// Trimming and truncation positions handed to the denoiser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TrimSpec {
    Single {
        trim: u32,
        trunc: u32,
    },
    Paired {
        trim_forward: u32,
        trim_reverse: u32,
        trunc_forward: u32,
        trunc_reverse: u32,
    },
}

impl TrimSpec {
    pub fn from_values(trim: &[u32], trunc: &[u32]) -> Result<Self, YamasError> {
        match (trim, trunc) {
            ([trim], [trunc]) => Ok(TrimSpec::Single {
                trim: *trim,
                trunc: *trunc,
            }),
            ([trim_forward, trim_reverse], [trunc_forward, trunc_reverse]) => {
                Ok(TrimSpec::Paired {
                    trim_forward: *trim_forward,
                    trim_reverse: *trim_reverse,
                    trunc_forward: *trunc_forward,
                    trunc_reverse: *trunc_reverse,
                })
            }
            _ => Err(YamasError::Input(format!(
                "trim and trunc must both have one value (single-end) or two values (paired-end), got {} and {}",
                trim.len(),
                trunc.len()
            ))),
        }
    }

    pub fn check_against(&self, topology: &ReadTopology) -> Result<(), YamasError> {
        match (self, topology.is_paired()) {
            (TrimSpec::Single { .. }, false) | (TrimSpec::Paired { .. }, true) => Ok(()),
            (TrimSpec::Single { .. }, true) => Err(YamasError::Input(
                "reads are paired-end: give trim and trunc twice (forward, then reverse)"
                    .to_string(),
            )),
            (TrimSpec::Paired { .. }, false) => Err(YamasError::Input(
                "reads are single-end: give exactly one trim and one trunc value".to_string(),
            )),
        }
    }

    pub fn dada2_args(&self) -> Vec<String> {
        match self {
            TrimSpec::Single { trim, trunc } => vec![
                "--p-trim-left".to_string(),
                trim.to_string(),
                "--p-trunc-len".to_string(),
                trunc.to_string(),
            ],
            TrimSpec::Paired {
                trim_forward,
                trim_reverse,
                trunc_forward,
                trunc_reverse,
            } => vec![
                "--p-trim-left-f".to_string(),
                trim_forward.to_string(),
                "--p-trim-left-r".to_string(),
                trim_reverse.to_string(),
                "--p-trunc-len-f".to_string(),
                trunc_forward.to_string(),
                "--p-trunc-len-r".to_string(),
                trunc_reverse.to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_dataset_id_trims() {
        let id: DatasetId = " PRJEB12345 ".parse().unwrap();
        assert_eq!(id.as_str(), "PRJEB12345");
    }

    #[test]
    fn parse_dataset_id_rejects_paths() {
        assert_matches!(
            "../etc".parse::<DatasetId>(),
            Err(YamasError::InvalidDatasetId(_))
        );
        assert_matches!("".parse::<DatasetId>(), Err(YamasError::InvalidDatasetId(_)));
    }

    #[test]
    fn data_type_parse_is_case_insensitive() {
        assert_eq!("16s".parse::<DataType>().unwrap(), DataType::Amplicon16S);
        assert_eq!("SHOTGUN".parse::<DataType>().unwrap(), DataType::Shotgun);
        assert_matches!("ITS".parse::<DataType>(), Err(YamasError::InvalidDataType(_)));
    }

    #[test]
    fn trim_spec_must_match_topology() {
        let paired = ReadTopology::new("/tmp/run", true);
        let single = TrimSpec::from_values(&[10], &[150]).unwrap();
        assert_matches!(single.check_against(&paired), Err(YamasError::Input(_)));

        let both = TrimSpec::from_values(&[10, 12], &[150, 140]).unwrap();
        assert!(both.check_against(&paired).is_ok());
        assert_matches!(
            TrimSpec::from_values(&[10, 12], &[150]),
            Err(YamasError::Input(_))
        );
    }
}
