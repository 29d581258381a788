//! Import of preprocessed Qiita studies: one multiplexed FASTQ plus the prep
//! information table carrying per-sample barcodes.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::commands::{self, artifact};
use crate::error::YamasError;
use crate::exec::ToolRunner;
use crate::runner::{RunContext, expect_output};
use crate::stage::Stage;

pub const BARCODE_COLUMN: &str = "barcode";

/// Files a Qiita import starts from. Recorded in the checkpoint so an interrupted
/// import can be resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QiitaInputs {
    pub preprocessed_fastq: Utf8PathBuf,
    pub prep_metadata: Utf8PathBuf,
}

/// The prep table must be tab-delimited with a `barcode` column.
pub fn check_prep_metadata(path: &Utf8Path) -> Result<(), YamasError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path.as_std_path())
        .map_err(|err| YamasError::Input(format!("cannot read prep metadata {path}: {err}")))?;
    let headers = reader
        .headers()
        .map_err(|err| YamasError::Input(format!("cannot read prep metadata {path}: {err}")))?;
    if headers.iter().any(|column| column.trim() == BARCODE_COLUMN) {
        Ok(())
    } else {
        Err(YamasError::Input(format!(
            "prep metadata {path} has no `{BARCODE_COLUMN}` column"
        )))
    }
}

pub(crate) fn run_stage<T: ToolRunner>(
    tools: &T,
    ctx: &RunContext,
    stage: Stage,
    log: &Utf8Path,
) -> Result<(), YamasError> {
    let ws = &ctx.workspace;
    let inputs = ctx.qiita.as_ref().ok_or_else(|| {
        YamasError::Resumption(format!(
            "{stage} needs the Qiita input files, which this run does not record"
        ))
    })?;
    let multiplexed = ws.artifact(artifact::MULTIPLEXED_SEQS);
    let demux = ws.artifact(&artifact::demux(false));
    let trimmed = ws.artifact(artifact::TRIMMED_SEQS);
    match stage {
        Stage::ImportMultiplexed => {
            expect_output(&inputs.preprocessed_fastq)?;
            tools.run_checked(
                &commands::qiime_import_multiplexed(&inputs.preprocessed_fastq, &multiplexed),
                log,
            )?;
            expect_output(&multiplexed)
        }
        Stage::DemuxBarcodes => {
            expect_output(&multiplexed)?;
            tools.run_checked(
                &commands::cutadapt_demux_single(
                    &multiplexed,
                    &inputs.prep_metadata,
                    &demux,
                    &ws.artifact(artifact::UNTRIMMED_SEQS),
                ),
                log,
            )?;
            expect_output(&demux)
        }
        Stage::TrimAdapters => {
            expect_output(&demux)?;
            tools.run_checked(&commands::cutadapt_trim_single(&demux, &trimmed), log)?;
            expect_output(&trimmed)
        }
        Stage::SummarizeTrimmed => {
            expect_output(&trimmed)?;
            let visualization = ctx.visualization_path();
            tools.run_checked(
                &commands::qiime_demux_summarize(&trimmed, &visualization),
                log,
            )?;
            tracing::info!(visualization = %visualization, "summarized trimmed reads");
            expect_output(&visualization)
        }
        other => Err(YamasError::Input(format!(
            "{other} is not part of a Qiita import"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn prep_metadata_needs_a_barcode_column() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let good = dir.join("prep.tsv");
        std::fs::write(&good, "sample_name\tbarcode\tprimer\nS1\tACGT\tGT\n").unwrap();
        let bad = dir.join("bad.tsv");
        std::fs::write(&bad, "sample_name\tprimer\nS1\tGT\n").unwrap();

        assert!(check_prep_metadata(&good).is_ok());
        assert_matches!(check_prep_metadata(&bad), Err(YamasError::Input(_)));
        assert_matches!(
            check_prep_metadata(&dir.join("absent.tsv")),
            Err(YamasError::Input(_))
        );
    }
}
