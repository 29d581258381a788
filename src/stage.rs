use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Acquire,
    Convert,
    BuildManifest,
    ImportReads,
    Summarize,
    ProfileSamples,
    AggregateProfiles,
    Tabulate,
    ImportMultiplexed,
    DemuxBarcodes,
    TrimAdapters,
    SummarizeTrimmed,
    Denoise,
    ClusterFeatures,
    ClassifyTaxonomy,
    FilterTable,
    ExportFeatureTable,
    ExportTaxonomy,
    BuildPhylogeny,
    ExportTree,
    ConvertTables,
    PadFeatureTable,
}

const AMPLICON_PLAN: &[Stage] = &[
    Stage::Acquire,
    Stage::Convert,
    Stage::BuildManifest,
    Stage::ImportReads,
    Stage::Summarize,
];

const SHOTGUN_PLAN: &[Stage] = &[
    Stage::Acquire,
    Stage::Convert,
    Stage::ProfileSamples,
    Stage::AggregateProfiles,
    Stage::Tabulate,
];

const QIITA_PLAN: &[Stage] = &[
    Stage::ImportMultiplexed,
    Stage::DemuxBarcodes,
    Stage::TrimAdapters,
    Stage::SummarizeTrimmed,
];

const EXPORT_PLAN: &[Stage] = &[
    Stage::Denoise,
    Stage::ClusterFeatures,
    Stage::ClassifyTaxonomy,
    Stage::FilterTable,
    Stage::ExportFeatureTable,
    Stage::ExportTaxonomy,
    Stage::BuildPhylogeny,
    Stage::ExportTree,
    Stage::ConvertTables,
    Stage::PadFeatureTable,
];

/// An ordered list of stages. Fresh runs, resumed runs and exports all walk one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    stages: &'static [Stage],
}

impl Plan {
    pub fn acquisition(data_type: DataType) -> Self {
        let stages = match data_type {
            DataType::Amplicon16S | DataType::Amplicon18S => AMPLICON_PLAN,
            DataType::Shotgun => SHOTGUN_PLAN,
        };
        Self { stages }
    }

    /// Import of a preprocessed, still multiplexed Qiita study.
    pub fn qiita() -> Self {
        Self {
            stages: QIITA_PLAN,
        }
    }

    pub fn export() -> Self {
        Self {
            stages: EXPORT_PLAN,
        }
    }

    pub fn stages(&self) -> &'static [Stage] {
        self.stages
    }

    pub fn position(&self, stage: Stage) -> Option<usize> {
        self.stages.iter().position(|candidate| *candidate == stage)
    }

    /// The stages from `stage` (inclusive) to the end of the plan.
    pub fn from_stage(&self, stage: Stage) -> &'static [Stage] {
        match self.position(stage) {
            Some(index) => &self.stages[index..],
            None => &[],
        }
    }

    pub fn after(&self, stage: Stage) -> Option<Stage> {
        self.position(stage)
            .and_then(|index| self.stages.get(index + 1).copied())
    }

    /// Longest prefix of the plan contained in `completed`, in plan order.
    pub fn completed_prefix(&self, completed: &[Stage]) -> Vec<Stage> {
        self.stages
            .iter()
            .take_while(|stage| completed.contains(stage))
            .copied()
            .collect()
    }

    /// First stage not covered by the completed prefix; `None` when the plan is done.
    pub fn next_pending(&self, completed: &[Stage]) -> Option<Stage> {
        let done = self.completed_prefix(completed).len();
        self.stages.get(done).copied()
    }
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Convert => "convert",
            Stage::BuildManifest => "build-manifest",
            Stage::ImportReads => "import-reads",
            Stage::Summarize => "summarize",
            Stage::ProfileSamples => "profile-samples",
            Stage::AggregateProfiles => "aggregate-profiles",
            Stage::Tabulate => "tabulate",
            Stage::ImportMultiplexed => "import-multiplexed",
            Stage::DemuxBarcodes => "demux-barcodes",
            Stage::TrimAdapters => "trim-adapters",
            Stage::SummarizeTrimmed => "summarize-trimmed",
            Stage::Denoise => "denoise",
            Stage::ClusterFeatures => "cluster-features",
            Stage::ClassifyTaxonomy => "classify-taxonomy",
            Stage::FilterTable => "filter-table",
            Stage::ExportFeatureTable => "export-feature-table",
            Stage::ExportTaxonomy => "export-taxonomy",
            Stage::BuildPhylogeny => "build-phylogeny",
            Stage::ExportTree => "export-tree",
            Stage::ConvertTables => "convert-tables",
            Stage::PadFeatureTable => "pad-feature-table",
        }
    }

    /// External programs this stage invokes.
    pub fn tools(&self) -> &'static [&'static str] {
        match self {
            Stage::Acquire => &["prefetch"],
            Stage::Convert => &["fasterq-dump"],
            Stage::ImportReads
            | Stage::Summarize
            | Stage::ImportMultiplexed
            | Stage::DemuxBarcodes
            | Stage::TrimAdapters
            | Stage::SummarizeTrimmed
            | Stage::Denoise
            | Stage::ClusterFeatures
            | Stage::ClassifyTaxonomy
            | Stage::FilterTable
            | Stage::ExportTaxonomy
            | Stage::BuildPhylogeny
            | Stage::ExportTree => &["qiime"],
            Stage::ExportFeatureTable => &["qiime", "biom"],
            Stage::ProfileSamples => &["metaphlan"],
            Stage::BuildManifest
            | Stage::AggregateProfiles
            | Stage::Tabulate
            | Stage::ConvertTables
            | Stage::PadFeatureTable => &[],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Distinct tools needed by a run over `stages`, in first-use order.
pub fn required_tools(stages: &[Stage]) -> Vec<&'static str> {
    let mut tools = Vec::new();
    for stage in stages {
        for tool in stage.tools() {
            if !tools.contains(tool) {
                tools.push(*tool);
            }
        }
    }
    tools
}
