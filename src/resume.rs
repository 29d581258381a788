use camino::Utf8Path;

use crate::checkpoint::CheckpointRecord;
use crate::domain::{DataType, DatasetId};
use crate::error::YamasError;
use crate::runner::{RunContext, RunSettings};
use crate::stage::{Plan, Stage};
use crate::topology;
use crate::workspace::RunWorkspace;

/// Where an interrupted run picks up.
#[derive(Debug, Clone)]
pub struct Resumption {
    pub context: RunContext,
    pub pending: &'static [Stage],
}

/// Re-derives the topology from converted reads and continues after `convert`.
/// An existing checkpoint is authoritative, so this falls back to
/// [`resume_from_checkpoint`] whenever one is present.
pub fn resume_from_reads(
    root: &Utf8Path,
    dataset: DatasetId,
    data_type: DataType,
    settings: RunSettings,
) -> Result<Resumption, YamasError> {
    let workspace = RunWorkspace::attach(root)?;
    if workspace.checkpoint_path().as_std_path().exists() {
        tracing::info!(
            checkpoint = %workspace.checkpoint_path(),
            "checkpoint present; resuming from it instead of the converted reads"
        );
        return resume_from_checkpoint(root, dataset, data_type, settings);
    }
    workspace.ensure_layout()?;
    let topology = topology::detect(workspace.root(), &workspace.reads_dir())?;
    let plan = Plan::acquisition(data_type);
    let context = RunContext::resumed(
        workspace,
        dataset,
        data_type,
        settings,
        topology,
        vec![Stage::Acquire, Stage::Convert],
    );
    context.write_checkpoint()?;

    let pending = match plan.after(Stage::Convert) {
        Some(next) => plan.from_stage(next),
        None => &[],
    };
    tracing::info!(
        dataset = %context.dataset,
        root = %context.workspace.root(),
        next = ?pending.first(),
        "resuming from converted reads"
    );
    Ok(Resumption { context, pending })
}

/// Continues from the first stage the checkpoint does not record as done.
/// Nothing under `root` is created until the checkpoint has been validated.
pub fn resume_from_checkpoint(
    root: &Utf8Path,
    dataset: DatasetId,
    data_type: DataType,
    settings: RunSettings,
) -> Result<Resumption, YamasError> {
    let workspace = RunWorkspace::attach(root)?;
    let record = CheckpointRecord::read(&workspace.checkpoint_path())?;
    record.validate(&dataset, data_type)?;
    let topology = record.topology(workspace.root())?;
    workspace.ensure_layout()?;

    let plan = recorded_plan(&record);
    let completed = completed_stages(&plan, &record);
    let pending = match plan.next_pending(&completed) {
        Some(next) => plan.from_stage(next),
        None => &[],
    };
    tracing::info!(
        dataset = %dataset,
        root = %workspace.root(),
        completed = ?completed,
        next = ?pending.first(),
        "resuming from checkpoint"
    );

    let mut context =
        RunContext::resumed(workspace, dataset, data_type, settings, topology, completed);
    context.qiita = record.qiita;
    Ok(Resumption { context, pending })
}

/// Opens a finished amplicon run for the export stages.
pub fn resume_for_export(root: &Utf8Path, settings: RunSettings) -> Result<RunContext, YamasError> {
    let workspace = RunWorkspace::attach(root)?;
    let record = CheckpointRecord::read(&workspace.checkpoint_path())?;
    if !record.data_type.is_amplicon() {
        return Err(YamasError::Input(format!(
            "dataset {} is {}; only 16S and 18S runs can be exported",
            record.dataset_id, record.data_type
        )));
    }
    let topology = record.topology(workspace.root())?;
    let plan = recorded_plan(&record);
    let completed = completed_stages(&plan, &record);
    if let Some(next) = plan.next_pending(&completed) {
        return Err(YamasError::Resumption(format!(
            "dataset {} has not finished acquisition (next stage: {next}); run `yamas continue` first",
            record.dataset_id
        )));
    }
    workspace.ensure_layout()?;

    let mut context = RunContext::resumed(
        workspace,
        record.dataset_id,
        record.data_type,
        settings,
        topology,
        completed,
    );
    context.qiita = record.qiita;
    Ok(context)
}

/// Qiita imports record their input files; everything else came through SRA.
fn recorded_plan(record: &CheckpointRecord) -> Plan {
    match record.qiita {
        Some(_) => Plan::qiita(),
        None => Plan::acquisition(record.data_type),
    }
}

/// Valid prefix of the acquisition plan plus any recorded export stages. An SRA
/// record without a stage list still proves that conversion finished.
fn completed_stages(plan: &Plan, record: &CheckpointRecord) -> Vec<Stage> {
    let mut completed = plan.completed_prefix(&record.completed_stages);
    if record.qiita.is_none() && completed.len() < 2 {
        tracing::debug!("checkpoint lists no stages past conversion; assuming convert completed");
        completed = plan.stages()[..2].to_vec();
    }
    completed.extend(Plan::export().completed_prefix(&record.completed_stages));
    completed
}
