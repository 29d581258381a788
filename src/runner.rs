use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::app::{ProgressEvent, ProgressSink};
use crate::checkpoint::CheckpointRecord;
use crate::commands;
use crate::config::ResolvedConfig;
use crate::domain::{DataType, DatasetId, ReadTopology, TrimSpec};
use crate::error::YamasError;
use crate::exec::ToolRunner;
use crate::export;
use crate::fs_util;
use crate::manifest::Manifest;
use crate::ncbi::{self, RunInfoClient};
use crate::profile::{MergedProfile, PROFILE_SUFFIX};
use crate::qiita::{self, QiitaInputs};
use crate::stage::Stage;
use crate::topology;
use crate::workspace::RunWorkspace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub threads: usize,
    pub keep_raw: bool,
    pub profiler_database: Option<Utf8PathBuf>,
}

impl From<&ResolvedConfig> for RunSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            threads: config.threads,
            keep_raw: config.keep_raw,
            profiler_database: config.profiler_database.clone(),
        }
    }
}

/// Inputs of the export stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub trim: TrimSpec,
    pub classifier: Utf8PathBuf,
}

/// Mutable state of one run, threaded through every stage.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub workspace: RunWorkspace,
    pub dataset: DatasetId,
    pub data_type: DataType,
    pub topology: Option<ReadTopology>,
    pub accession_list: Option<Utf8PathBuf>,
    pub settings: RunSettings,
    pub export: Option<ExportOptions>,
    pub qiita: Option<QiitaInputs>,
    completed: Vec<Stage>,
}

impl RunContext {
    pub fn new(
        workspace: RunWorkspace,
        dataset: DatasetId,
        data_type: DataType,
        settings: RunSettings,
    ) -> Self {
        Self {
            workspace,
            dataset,
            data_type,
            topology: None,
            accession_list: None,
            settings,
            export: None,
            qiita: None,
            completed: Vec::new(),
        }
    }

    /// Context resumed with a known topology and the stages already done.
    pub fn resumed(
        workspace: RunWorkspace,
        dataset: DatasetId,
        data_type: DataType,
        settings: RunSettings,
        topology: ReadTopology,
        completed: Vec<Stage>,
    ) -> Self {
        Self {
            topology: Some(topology),
            completed,
            ..Self::new(workspace, dataset, data_type, settings)
        }
    }

    pub fn completed(&self) -> &[Stage] {
        &self.completed
    }

    pub fn topology(&self) -> Result<&ReadTopology, YamasError> {
        self.topology.as_ref().ok_or_else(|| {
            YamasError::Resumption("read topology is unknown; convert has not run".to_string())
        })
    }

    /// Marks `stage` done and, once the topology is known, rewrites the checkpoint.
    pub fn record_completed(&mut self, stage: Stage) -> Result<(), YamasError> {
        if !self.completed.contains(&stage) {
            self.completed.push(stage);
        }
        self.write_checkpoint()
    }

    pub fn write_checkpoint(&self) -> Result<(), YamasError> {
        let Some(topology) = &self.topology else {
            return Ok(());
        };
        let mut record = CheckpointRecord::new(
            self.dataset.clone(),
            self.data_type,
            topology,
            self.completed.clone(),
        );
        record.qiita = self.qiita.clone();
        record.write(&self.workspace.checkpoint_path())
    }

    pub fn merged_profile_path(&self) -> Utf8PathBuf {
        self.workspace
            .export(&format!("{}_merged_profile.txt", self.dataset))
    }

    pub fn visualization_path(&self) -> Utf8PathBuf {
        self.workspace
            .visualizations_dir()
            .join(format!("{}.qzv", self.dataset))
    }
}

/// Walks a list of stages, invoking external tools through `T` and the run-info service through `C`.
pub struct StageRunner<'a, T: ToolRunner, C: RunInfoClient> {
    tools: &'a T,
    run_info: &'a C,
}

impl<'a, T: ToolRunner, C: RunInfoClient> StageRunner<'a, T, C> {
    pub fn new(tools: &'a T, run_info: &'a C) -> Self {
        Self { tools, run_info }
    }

    /// Runs `stages` in order and stops at the first failure, which is returned as
    /// [`YamasError::Stage`]. Work finished before the failure is kept.
    pub fn run(
        &self,
        ctx: &mut RunContext,
        stages: &[Stage],
        sink: &dyn ProgressSink,
    ) -> Result<Vec<Stage>, YamasError> {
        let mut ran = Vec::with_capacity(stages.len());
        for (index, stage) in stages.iter().copied().enumerate() {
            sink.event(ProgressEvent {
                message: format!(
                    "[{}/{}] {}: {stage}",
                    index + 1,
                    stages.len(),
                    ctx.dataset
                ),
                elapsed: None,
            });
            let start = Instant::now();
            let span = tracing::info_span!("stage", stage = %stage, dataset = %ctx.dataset);
            let _guard = span.enter();

            self.run_stage(ctx, stage)
                .and_then(|()| ctx.record_completed(stage))
                .map_err(|source| {
                    tracing::error!(error = %source, "stage failed");
                    YamasError::Stage {
                        stage,
                        dataset: ctx.dataset.to_string(),
                        source: Box::new(source),
                    }
                })?;

            let elapsed = start.elapsed();
            tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "stage complete");
            sink.event(ProgressEvent {
                message: format!("{}: {stage} done", ctx.dataset),
                elapsed: Some(elapsed),
            });
            ran.push(stage);
        }
        Ok(ran)
    }

    fn run_stage(&self, ctx: &mut RunContext, stage: Stage) -> Result<(), YamasError> {
        let log = ctx.workspace.stage_log_path(stage);
        match stage {
            Stage::Acquire => self.acquire(ctx, &log),
            Stage::Convert => self.convert(ctx, &log),
            Stage::BuildManifest => build_manifest(ctx).map(|_| ()),
            Stage::ImportReads => self.import_reads(ctx, &log),
            Stage::Summarize => self.summarize(ctx, &log),
            Stage::ProfileSamples => self.profile_samples(ctx, &log),
            Stage::AggregateProfiles => aggregate_profiles(ctx),
            Stage::Tabulate => tabulate(ctx),
            Stage::ImportMultiplexed
            | Stage::DemuxBarcodes
            | Stage::TrimAdapters
            | Stage::SummarizeTrimmed => qiita::run_stage(self.tools, ctx, stage, &log),
            Stage::Denoise
            | Stage::ClusterFeatures
            | Stage::ClassifyTaxonomy
            | Stage::FilterTable
            | Stage::ExportFeatureTable
            | Stage::ExportTaxonomy
            | Stage::BuildPhylogeny
            | Stage::ExportTree
            | Stage::ConvertTables
            | Stage::PadFeatureTable => export::run_stage(self.tools, ctx, stage, &log),
        }
    }

    fn acquire(&self, ctx: &mut RunContext, log: &Utf8Path) -> Result<(), YamasError> {
        let list = match &ctx.accession_list {
            Some(path) => {
                if !path.as_std_path().is_file() {
                    return Err(YamasError::Input(format!(
                        "accession list {path} does not exist"
                    )));
                }
                path.clone()
            }
            None => {
                let table = self.run_info.fetch_run_info(&ctx.dataset)?;
                let accessions = ncbi::parse_accessions(&table)?;
                let path = ctx
                    .workspace
                    .root()
                    .join(format!("{}_acc_list.txt", ctx.dataset));
                let mut content = accessions.join("\n");
                content.push('\n');
                fs_util::write_atomic(&path, content.as_bytes())?;
                tracing::info!(runs = accessions.len(), list = %path, "wrote accession list");
                path
            }
        };
        ctx.accession_list = Some(list.clone());
        self.tools
            .run_checked(&commands::prefetch(&list, &ctx.workspace.raw_dir()), log)
    }

    fn convert(&self, ctx: &mut RunContext, log: &Utf8Path) -> Result<(), YamasError> {
        let raw = ctx.workspace.raw_dir();
        let reads = ctx.workspace.reads_dir();
        let runs = fs_util::list_dirs(&raw)?;
        if runs.is_empty() {
            return Err(YamasError::MissingOutput(raw.into_std_path_buf()));
        }
        for run in runs {
            let sra = fs_util::find_first_ext(&run, "sra")
                .ok_or_else(|| YamasError::MissingOutput(run.join("*.sra").into_std_path_buf()))?;
            self.tools
                .run_checked(&commands::fasterq_dump(&sra, &reads), log)?;
        }

        ctx.topology = Some(topology::detect(ctx.workspace.root(), &reads)?);
        ctx.record_completed(Stage::Convert)?;
        if !ctx.settings.keep_raw {
            ctx.workspace.prune_raw()?;
        }
        Ok(())
    }

    fn import_reads(&self, ctx: &RunContext, log: &Utf8Path) -> Result<(), YamasError> {
        let paired = ctx.topology()?.is_paired();
        let manifest = ctx.workspace.manifest_path();
        expect_output(&manifest)?;
        let demux = ctx.workspace.artifact(&commands::artifact::demux(paired));
        self.tools
            .run_checked(&commands::qiime_import(&manifest, &demux, paired), log)?;
        expect_output(&demux)
    }

    fn summarize(&self, ctx: &RunContext, log: &Utf8Path) -> Result<(), YamasError> {
        let paired = ctx.topology()?.is_paired();
        let demux = ctx.workspace.artifact(&commands::artifact::demux(paired));
        expect_output(&demux)?;
        let visualization = ctx.visualization_path();
        self.tools.run_checked(
            &commands::qiime_demux_summarize(&demux, &visualization),
            log,
        )?;
        expect_output(&visualization)
    }

    fn profile_samples(&self, ctx: &RunContext, log: &Utf8Path) -> Result<(), YamasError> {
        let manifest = build_manifest(ctx)?;
        for (sample, reads) in manifest.samples() {
            let bowtie2_out = ctx.workspace.artifact(&format!("{sample}.bowtie2.bz2"));
            if bowtie2_out.as_std_path().exists() {
                tracing::debug!(sample, path = %bowtie2_out, "removing stale bowtie2 output");
                fs::remove_file(bowtie2_out.as_std_path()).map_err(|err| {
                    YamasError::Storage(format!("remove {bowtie2_out}: {err}"))
                })?;
            }
            let profile = profile_path(&ctx.workspace, sample);
            self.tools.run_checked(
                &commands::metaphlan(
                    reads,
                    &bowtie2_out,
                    &profile,
                    ctx.settings.threads,
                    ctx.settings.profiler_database.as_deref(),
                ),
                log,
            )?;
            expect_output(&profile)?;
            tracing::info!(sample, "profiled sample");
        }
        Ok(())
    }
}

fn build_manifest(ctx: &RunContext) -> Result<Manifest, YamasError> {
    let manifest = Manifest::from_reads(ctx.topology()?, &ctx.workspace.reads_dir())?;
    let path = ctx.workspace.manifest_path();
    manifest.write(&path)?;
    tracing::info!(
        samples = manifest.len(),
        paired = manifest.is_paired(),
        manifest = %path,
        "wrote manifest"
    );
    Ok(manifest)
}

fn profile_path(workspace: &RunWorkspace, sample: &str) -> Utf8PathBuf {
    workspace.artifact(&format!("{sample}{PROFILE_SUFFIX}.txt"))
}

fn aggregate_profiles(ctx: &RunContext) -> Result<(), YamasError> {
    let manifest_path = ctx.workspace.manifest_path();
    let manifest = if manifest_path.as_std_path().is_file() {
        Manifest::read(&manifest_path)?
    } else {
        build_manifest(ctx)?
    };
    let profiles = manifest
        .samples()
        .map(|(sample, _)| profile_path(&ctx.workspace, sample))
        .collect::<Vec<_>>();
    for profile in &profiles {
        expect_output(profile)?;
    }

    let merged = MergedProfile::from_files(&profiles)?;
    let path = ctx.merged_profile_path();
    merged.write_tsv(&path)?;
    tracing::info!(
        samples = merged.samples().len(),
        taxa = merged.taxa().len(),
        merged = %path,
        "merged profiles"
    );
    Ok(())
}

fn tabulate(ctx: &RunContext) -> Result<(), YamasError> {
    let merged_path = ctx.merged_profile_path();
    expect_output(&merged_path)?;
    let merged = MergedProfile::read_tsv(&merged_path)?;
    let dataset = &ctx.dataset;
    merged.write_combined_csv(&ctx.workspace.export(&format!("{dataset}_combined_profile.csv")))?;
    merged.write_taxonomy_csv(&ctx.workspace.export(&format!("{dataset}_taxonomy.csv")))?;
    merged.write_transposed_csv(&ctx.workspace.export(&format!("{dataset}_final_table.csv")))?;
    Ok(())
}

pub(crate) fn expect_output(path: &Utf8Path) -> Result<(), YamasError> {
    if path.as_std_path().exists() {
        Ok(())
    } else {
        Err(YamasError::MissingOutput(path.as_std_path().to_path_buf()))
    }
}
