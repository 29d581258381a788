//! Merging of per-sample taxonomic profiles and reshaping into export tables.

use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::YamasError;
use crate::fs_util;

pub const CLADE_COLUMN: &str = "clade_name";
pub const ABUNDANCE_COLUMN: &str = "relative_abundance";
pub const SAMPLE_COLUMN: &str = "sample_id";
pub const PROFILE_SUFFIX: &str = "_profile";
pub const RANKS: [&str; 8] = [
    "kingdom", "phylum", "class", "order", "family", "genus", "species", "strain",
];

const HIERARCHY_DELIMITER: char = '|';
const ABSENT: &str = "0.0";

/// Column structure of a profile file. All inputs of one merge must agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLayout {
    Headed(Vec<String>),
    Bare,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleProfile {
    pub sample: String,
    pub layout: ProfileLayout,
    pub abundances: Vec<(String, String)>,
}

impl SampleProfile {
    pub fn read(path: &Utf8Path) -> Result<Self, YamasError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| YamasError::Input(format!("read profile {path}: {err}")))?;
        let sample = sample_name(path)?;
        Self::parse(sample, &content).map_err(|err| match err {
            YamasError::Format(message) => YamasError::Format(format!("{path}: {message}")),
            other => other,
        })
    }

    pub fn parse(sample: String, content: &str) -> Result<Self, YamasError> {
        let mut header: Option<Vec<String>> = None;
        let mut abundances = Vec::new();
        let mut columns: Option<(usize, usize)> = None;

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if abundances.is_empty() && comment.split('\t').any(|col| col == CLADE_COLUMN) {
                    header = Some(comment.split('\t').map(str::to_string).collect());
                }
                continue;
            }

            let (clade_index, abundance_index) = match columns {
                Some(indices) => indices,
                None => {
                    let indices = resolve_columns(header.as_deref())?;
                    columns = Some(indices);
                    indices
                }
            };

            let fields = line.split('\t').collect::<Vec<_>>();
            if header.is_none() && fields.len() != 2 {
                return Err(YamasError::Format(format!(
                    "line {}: expected `clade<TAB>abundance`, found {} columns",
                    line_no + 1,
                    fields.len()
                )));
            }
            let (Some(clade), Some(value)) = (fields.get(clade_index), fields.get(abundance_index))
            else {
                return Err(YamasError::Format(format!(
                    "line {}: missing abundance column",
                    line_no + 1
                )));
            };
            value.trim().parse::<f64>().map_err(|_| {
                YamasError::Format(format!(
                    "line {}: abundance `{value}` is not a number",
                    line_no + 1
                ))
            })?;
            abundances.push((clade.to_string(), value.trim().to_string()));
        }

        let layout = match header {
            Some(columns) => ProfileLayout::Headed(columns),
            None => ProfileLayout::Bare,
        };
        Ok(Self {
            sample,
            layout,
            abundances,
        })
    }
}

fn resolve_columns(header: Option<&[String]>) -> Result<(usize, usize), YamasError> {
    let Some(header) = header else {
        return Ok((0, 1));
    };
    let position = |name: &str| header.iter().position(|col| col == name);
    match (position(CLADE_COLUMN), position(ABUNDANCE_COLUMN)) {
        (Some(clade), Some(abundance)) => Ok((clade, abundance)),
        _ => Err(YamasError::Format(format!(
            "profile header lacks `{CLADE_COLUMN}` or `{ABUNDANCE_COLUMN}`: {header:?}"
        ))),
    }
}

/// Sample name from a profile file: the stem minus a trailing `_profile`.
pub fn sample_name(path: &Utf8Path) -> Result<String, YamasError> {
    let stem = path
        .file_stem()
        .ok_or_else(|| YamasError::Input(format!("profile path has no file name: {path}")))?;
    Ok(stem.strip_suffix(PROFILE_SUFFIX).unwrap_or(stem).to_string())
}

/// Taxa by samples. `values[t][s]` is the abundance of taxon `t` in sample `s`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedProfile {
    samples: Vec<String>,
    taxa: Vec<String>,
    values: Vec<Vec<String>>,
}

impl MergedProfile {
    pub fn merge(profiles: &[SampleProfile]) -> Result<Self, YamasError> {
        let Some(first) = profiles.first() else {
            return Err(YamasError::Input("no profiles to aggregate".to_string()));
        };
        let mut samples: Vec<String> = Vec::with_capacity(profiles.len());
        for profile in profiles {
            if profile.layout != first.layout {
                return Err(YamasError::Format(format!(
                    "profile {} has header {:?}, expected {:?}",
                    profile.sample, profile.layout, first.layout
                )));
            }
            if samples.contains(&profile.sample) {
                return Err(YamasError::Format(format!(
                    "sample {} appears in more than one profile",
                    profile.sample
                )));
            }
            samples.push(profile.sample.clone());
        }

        let mut index = HashMap::<String, usize>::new();
        let mut taxa = Vec::new();
        let mut values: Vec<Vec<String>> = Vec::new();
        for (column, profile) in profiles.iter().enumerate() {
            for (clade, value) in &profile.abundances {
                let row = *index.entry(clade.clone()).or_insert_with(|| {
                    taxa.push(clade.clone());
                    values.push(vec![ABSENT.to_string(); samples.len()]);
                    taxa.len() - 1
                });
                values[row][column] = value.clone();
            }
        }

        Ok(Self {
            samples,
            taxa,
            values,
        })
    }

    pub fn from_files(paths: &[Utf8PathBuf]) -> Result<Self, YamasError> {
        let profiles = paths
            .iter()
            .map(|path| SampleProfile::read(path))
            .collect::<Result<Vec<_>, _>>()?;
        Self::merge(&profiles)
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn value(&self, taxon: &str, sample: &str) -> Option<&str> {
        let row = self.taxa.iter().position(|candidate| candidate == taxon)?;
        let column = self.samples.iter().position(|candidate| candidate == sample)?;
        Some(self.values[row][column].as_str())
    }

    pub fn write_tsv(&self, path: &Utf8Path) -> Result<(), YamasError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(Vec::new());
        self.write_rows(&mut writer)?;
        finish(writer, path)
    }

    pub fn read_tsv(path: &Utf8Path) -> Result<Self, YamasError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_path(path.as_std_path())
            .map_err(|err| YamasError::Input(format!("open merged profile {path}: {err}")))?;
        let header = reader.headers().map_err(format_error)?.clone();
        if header.get(0) != Some(CLADE_COLUMN) {
            return Err(YamasError::Format(format!(
                "{path}: first column must be `{CLADE_COLUMN}`"
            )));
        }
        let samples = header.iter().skip(1).map(str::to_string).collect::<Vec<_>>();

        let mut taxa = Vec::new();
        let mut values = Vec::new();
        for record in reader.records() {
            let record = record.map_err(format_error)?;
            if record.len() != header.len() {
                return Err(YamasError::Format(format!(
                    "{path}: row for {} has {} columns, header has {}",
                    record.get(0).unwrap_or(""),
                    record.len(),
                    header.len()
                )));
            }
            taxa.push(record[0].to_string());
            values.push(record.iter().skip(1).map(str::to_string).collect());
        }
        Ok(Self {
            samples,
            taxa,
            values,
        })
    }

    /// Taxa as rows: taxon name, then one abundance column per sample.
    pub fn write_combined_csv(&self, path: &Utf8Path) -> Result<(), YamasError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_rows(&mut writer)?;
        finish(writer, path)
    }

    /// One row per taxon with its lineage split into rank columns.
    pub fn write_taxonomy_csv(&self, path: &Utf8Path) -> Result<(), YamasError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec![CLADE_COLUMN];
        header.extend(RANKS);
        writer.write_record(&header).map_err(format_error)?;
        for taxon in &self.taxa {
            let lineage = split_lineage(taxon)?;
            let mut record = vec![taxon.as_str()];
            record.extend(lineage.iter().map(String::as_str));
            writer.write_record(&record).map_err(format_error)?;
        }
        finish(writer, path)
    }

    /// Samples as rows, taxa as columns.
    pub fn write_transposed_csv(&self, path: &Utf8Path) -> Result<(), YamasError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut header = vec![SAMPLE_COLUMN];
        header.extend(self.taxa.iter().map(String::as_str));
        writer.write_record(&header).map_err(format_error)?;
        for (column, sample) in self.samples.iter().enumerate() {
            let mut record = vec![sample.as_str()];
            record.extend(self.values.iter().map(|row| row[column].as_str()));
            writer.write_record(&record).map_err(format_error)?;
        }
        finish(writer, path)
    }

    fn write_rows<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<(), YamasError> {
        let mut header = vec![CLADE_COLUMN];
        header.extend(self.samples.iter().map(String::as_str));
        writer.write_record(&header).map_err(format_error)?;
        for (taxon, row) in self.taxa.iter().zip(&self.values) {
            let mut record = vec![taxon.as_str()];
            record.extend(row.iter().map(String::as_str));
            writer.write_record(&record).map_err(format_error)?;
        }
        Ok(())
    }
}

/// `k__Bacteria|p__Firmicutes` becomes `["Bacteria", "Firmicutes", "", ...]`.
pub fn split_lineage(label: &str) -> Result<Vec<String>, YamasError> {
    let parts = label.split(HIERARCHY_DELIMITER).collect::<Vec<_>>();
    if parts.len() > RANKS.len() {
        return Err(YamasError::Format(format!(
            "taxon `{label}` has {} levels, at most {} are supported",
            parts.len(),
            RANKS.len()
        )));
    }
    let mut lineage = parts
        .into_iter()
        .map(|part| strip_rank_prefix(part).to_string())
        .collect::<Vec<_>>();
    lineage.resize(RANKS.len(), String::new());
    Ok(lineage)
}

fn strip_rank_prefix(part: &str) -> &str {
    match part.get(1..3) {
        Some("__") => &part[3..],
        _ => part,
    }
}

fn finish(writer: csv::Writer<Vec<u8>>, path: &Utf8Path) -> Result<(), YamasError> {
    let content = writer
        .into_inner()
        .map_err(|err| YamasError::Format(err.to_string()))?;
    fs_util::write_atomic(path, &content)
}

fn format_error(err: csv::Error) -> YamasError {
    YamasError::Format(err.to_string())
}
