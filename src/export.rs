//! Stages that turn imported amplicon reads into feature, taxonomy and tree exports.

use std::collections::HashSet;
use std::fs;

use camino::Utf8Path;

use crate::commands::{self, Dada2Outputs, artifact};
use crate::error::YamasError;
use crate::exec::ToolRunner;
use crate::fs_util;
use crate::runner::{ExportOptions, RunContext, expect_output};
use crate::stage::Stage;

pub const FEATURE_BIOM: &str = "feature-table.biom";
pub const OTU_TSV: &str = "otu.tsv";
pub const OTU_CSV: &str = "otu.csv";
pub const OTU_PADDING_CSV: &str = "otu_padding.csv";
pub const TAXONOMY_DIR: &str = "taxonomy";
pub const TAXONOMY_TSV: &str = "taxonomy.tsv";
pub const TAXONOMY_CSV: &str = "taxonomy.csv";
pub const TREE_NEWICK: &str = "tree.nwk";

const BIOM_COMMENT: &str = "# Constructed from biom file";
const ABSENT_COUNT: &str = "0";

pub(crate) fn run_stage<T: ToolRunner>(
    tools: &T,
    ctx: &RunContext,
    stage: Stage,
    log: &Utf8Path,
) -> Result<(), YamasError> {
    let ws = &ctx.workspace;
    match stage {
        Stage::Denoise => {
            let options = options(ctx)?;
            let paired = ctx.topology()?.is_paired();
            let demux = ws.artifact(&artifact::demux(paired));
            expect_output(&demux)?;
            let table = ws.artifact(artifact::DADA2_TABLE);
            let sequences = ws.artifact(artifact::DADA2_REP_SEQS);
            let stats = ws.artifact(artifact::DADA2_STATS);
            tools.run_checked(
                &commands::dada2_denoise(
                    &demux,
                    &options.trim,
                    ctx.settings.threads,
                    Dada2Outputs {
                        table: &table,
                        representative_sequences: &sequences,
                        denoising_stats: &stats,
                    },
                ),
                log,
            )?;
            expect_output(&table)?;
            expect_output(&sequences)
        }
        Stage::ClusterFeatures => tools.run_checked(
            &commands::vsearch_cluster_de_novo(
                &ws.artifact(artifact::DADA2_TABLE),
                &ws.artifact(artifact::DADA2_REP_SEQS),
                &ws.artifact(artifact::CLUSTERED_TABLE),
                &ws.artifact(artifact::CLUSTERED_SEQS),
            ),
            log,
        ),
        Stage::ClassifyTaxonomy => {
            let options = options(ctx)?;
            let classification = ws.artifact(ctx.data_type.classification_artifact()?);
            tools.run_checked(
                &commands::classify_sklearn(
                    &ws.artifact(artifact::CLUSTERED_SEQS),
                    &options.classifier,
                    &classification,
                ),
                log,
            )
        }
        Stage::FilterTable => {
            let classification = ws.artifact(ctx.data_type.classification_artifact()?);
            let clean = ws.artifact(artifact::CLEAN_TABLE);
            tools.run_checked(
                &commands::taxa_filter_table(
                    &ws.artifact(artifact::CLUSTERED_TABLE),
                    &classification,
                    &clean,
                ),
                log,
            )?;
            tools.run_checked(
                &commands::filter_features(&clean, &ws.artifact(artifact::FILTERED_TABLE)),
                log,
            )
        }
        Stage::ExportFeatureTable => {
            let exports = ws.exports_dir();
            tools.run_checked(
                &commands::qiime_export(&ws.artifact(artifact::FILTERED_TABLE), &exports),
                log,
            )?;
            let otu = ws.export(OTU_TSV);
            tools.run_checked(&commands::biom_to_tsv(&ws.export(FEATURE_BIOM), &otu), log)?;
            expect_output(&otu)
        }
        Stage::ExportTaxonomy => {
            let classification = ws.artifact(ctx.data_type.classification_artifact()?);
            let taxonomy_dir = ws.export(TAXONOMY_DIR);
            tools.run_checked(&commands::qiime_export(&classification, &taxonomy_dir), log)?;
            expect_output(&taxonomy_dir.join(TAXONOMY_TSV))
        }
        Stage::BuildPhylogeny => {
            let aligned = ws.artifact(artifact::ALIGNED_SEQS);
            let tree = ws.artifact(artifact::TREE);
            tools.run_checked(
                &commands::mafft(&ws.artifact(artifact::CLUSTERED_SEQS), &aligned),
                log,
            )?;
            tools.run_checked(&commands::fasttree(&aligned, &tree), log)?;
            tools.run_checked(
                &commands::midpoint_root(&tree, &ws.artifact(artifact::ROOTED_TREE)),
                log,
            )
        }
        Stage::ExportTree => {
            tools.run_checked(
                &commands::qiime_export(&ws.artifact(artifact::ROOTED_TREE), &ws.exports_dir()),
                log,
            )?;
            expect_output(&ws.export(TREE_NEWICK))
        }
        Stage::ConvertTables => {
            let features = tsv_to_csv(&ws.export(OTU_TSV), &ws.export(OTU_CSV), true)?;
            let taxa = tsv_to_csv(
                &ws.export(TAXONOMY_DIR).join(TAXONOMY_TSV),
                &ws.export(TAXONOMY_CSV),
                false,
            )?;
            tracing::info!(features, taxa, "converted export tables to csv");
            Ok(())
        }
        Stage::PadFeatureTable => {
            let padding = pad_feature_table(
                &ws.export(OTU_CSV),
                &ws.export(TREE_NEWICK),
                &ws.export(OTU_PADDING_CSV),
            )?;
            tracing::info!(
                padded = padding.padded.len(),
                missing_from_tree = padding.missing_from_tree.len(),
                "wrote padded feature table"
            );
            Ok(())
        }
        other => Err(YamasError::Input(format!(
            "{other} is not an export stage"
        ))),
    }
}

fn options(ctx: &RunContext) -> Result<&ExportOptions, YamasError> {
    ctx.export.as_ref().ok_or_else(|| {
        YamasError::Input("export stages need trim, trunc and classifier options".to_string())
    })
}

/// Rewrites a tab-delimited table as CSV and returns the number of data rows.
/// With `skip_biom_comment` the leading `# Constructed from biom file` line is dropped.
pub fn tsv_to_csv(
    input: &Utf8Path,
    output: &Utf8Path,
    skip_biom_comment: bool,
) -> Result<usize, YamasError> {
    expect_output(input)?;
    let content = fs::read_to_string(input.as_std_path())
        .map_err(|err| YamasError::Storage(format!("read {input}: {err}")))?;
    let body = match content.split_once('\n') {
        Some((first, rest)) if skip_biom_comment && first.starts_with(BIOM_COMMENT) => rest,
        _ => content.as_str(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .from_reader(body.as_bytes());
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut rows = 0usize;
    for record in reader.records() {
        let record = record.map_err(|err| YamasError::Format(format!("{input}: {err}")))?;
        writer
            .write_record(&record)
            .map_err(|err| YamasError::Format(err.to_string()))?;
        rows += 1;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| YamasError::Storage(err.to_string()))?;
    fs_util::write_atomic(output, &bytes)?;
    Ok(rows.saturating_sub(1))
}

/// Leaf names of a Newick tree, in tree order. Internal node labels are skipped.
pub fn newick_leaves(tree: &str) -> Result<Vec<String>, YamasError> {
    let mut leaves = Vec::new();
    let mut chars = tree.trim().chars().peekable();
    let mut depth = 0usize;
    let mut expecting_leaf = true;

    while let Some(ch) = chars.next() {
        match ch {
            '(' => {
                depth += 1;
                expecting_leaf = true;
            }
            ',' => expecting_leaf = true,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    YamasError::Format("newick tree has an unmatched ')'".to_string())
                })?;
                expecting_leaf = false;
            }
            ';' => break,
            ':' => {
                while chars
                    .peek()
                    .is_some_and(|next| !matches!(next, ',' | ')' | ';' | '['))
                {
                    chars.next();
                }
            }
            '[' => {
                for skipped in chars.by_ref() {
                    if skipped == ']' {
                        break;
                    }
                }
            }
            '\'' => {
                let mut label = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            label.push('\'');
                        }
                        Some('\'') => break,
                        Some(other) => label.push(other),
                        None => {
                            return Err(YamasError::Format(
                                "newick tree has an unterminated quoted label".to_string(),
                            ));
                        }
                    }
                }
                if expecting_leaf && !label.is_empty() {
                    leaves.push(label);
                }
                expecting_leaf = false;
            }
            ws if ws.is_whitespace() => {}
            first => {
                let mut label = String::from(first);
                while let Some(next) = chars.peek() {
                    if matches!(next, '(' | ')' | ',' | ':' | ';' | '[') || next.is_whitespace() {
                        break;
                    }
                    label.push(*next);
                    chars.next();
                }
                if expecting_leaf {
                    leaves.push(label);
                }
                expecting_leaf = false;
            }
        }
    }

    if depth != 0 {
        return Err(YamasError::Format(
            "newick tree has unbalanced parentheses".to_string(),
        ));
    }
    Ok(leaves)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Padding {
    /// Tree leaves added to the table with zero counts.
    pub padded: Vec<String>,
    /// Table features that the tree does not contain.
    pub missing_from_tree: Vec<String>,
}

/// Copies the feature table and appends a zero row for every tree leaf it lacks.
pub fn pad_feature_table(
    otu_csv: &Utf8Path,
    tree: &Utf8Path,
    output: &Utf8Path,
) -> Result<Padding, YamasError> {
    expect_output(otu_csv)?;
    expect_output(tree)?;
    let newick = fs::read_to_string(tree.as_std_path())
        .map_err(|err| YamasError::Storage(format!("read {tree}: {err}")))?;
    let leaves = newick_leaves(&newick)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(otu_csv.as_std_path())
        .map_err(|err| YamasError::Storage(format!("open {otu_csv}: {err}")))?;
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut width = 0usize;
    let mut features = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| YamasError::Format(format!("{otu_csv}: {err}")))?;
        if index == 0 {
            width = record.len();
        } else if let Some(feature) = record.get(0) {
            features.push(feature.to_string());
        }
        writer
            .write_record(&record)
            .map_err(|err| YamasError::Format(err.to_string()))?;
    }
    if width == 0 {
        return Err(YamasError::Format(format!("{otu_csv} has no header row")));
    }

    let in_table = features.iter().map(String::as_str).collect::<HashSet<_>>();
    let in_tree = leaves.iter().map(String::as_str).collect::<HashSet<_>>();
    let missing_from_tree = features
        .iter()
        .filter(|feature| !in_tree.contains(feature.as_str()))
        .cloned()
        .collect::<Vec<_>>();
    if !missing_from_tree.is_empty() {
        tracing::warn!(features = ?missing_from_tree, "features absent from the tree");
    }

    let mut padded = Vec::new();
    for leaf in &leaves {
        if in_table.contains(leaf.as_str()) || padded.contains(leaf) {
            continue;
        }
        let mut row = vec![leaf.as_str()];
        row.extend(std::iter::repeat_n(ABSENT_COUNT, width - 1));
        writer
            .write_record(&row)
            .map_err(|err| YamasError::Format(err.to_string()))?;
        padded.push(leaf.clone());
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| YamasError::Storage(err.to_string()))?;
    fs_util::write_atomic(output, &bytes)?;
    Ok(Padding {
        padded,
        missing_from_tree,
    })
}
