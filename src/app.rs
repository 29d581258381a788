use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{DataType, DatasetId, ReadTopology, TrimSpec};
use crate::error::YamasError;
use crate::exec::ToolRunner;
use crate::ncbi::RunInfoClient;
use crate::qiita::{self, QiitaInputs};
use crate::resume::{self, Resumption};
use crate::runner::{ExportOptions, RunContext, RunSettings, StageRunner};
use crate::stage::{Plan, Stage, required_tools};
use crate::workspace::RunWorkspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunOutcome {
    Completed,
    AlreadyComplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dataset_id: String,
    pub data_type: DataType,
    pub workspace: String,
    pub topology: Option<&'static str>,
    pub outcome: RunOutcome,
    pub stages_run: Vec<Stage>,
    pub completed_stages: Vec<Stage>,
}

impl RunReport {
    fn new(ctx: &RunContext, outcome: RunOutcome, stages_run: Vec<Stage>) -> Self {
        Self {
            dataset_id: ctx.dataset.to_string(),
            data_type: ctx.data_type,
            workspace: ctx.workspace.root().to_string(),
            topology: ctx.topology.as_ref().map(|topology| topology.label()),
            outcome,
            stages_run,
            completed_stages: ctx.completed().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub runs: Vec<RunReport>,
}

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub datasets: Vec<DatasetId>,
    pub data_type: DataType,
    pub accession_list: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ContinueRequest {
    pub dataset: DatasetId,
    pub root: Utf8PathBuf,
    pub data_type: DataType,
    pub from_reads: bool,
}

#[derive(Debug, Clone)]
pub struct QiitaRequest {
    pub dataset: DatasetId,
    pub preprocessed_fastq: Utf8PathBuf,
    pub prep_metadata: Utf8PathBuf,
    pub data_type: DataType,
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub root: Utf8PathBuf,
    pub trim: Vec<u32>,
    pub trunc: Vec<u32>,
    pub classifier: Utf8PathBuf,
    pub threads: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<T: ToolRunner, C: RunInfoClient> {
    tools: T,
    run_info: C,
    config: ResolvedConfig,
}

impl<T: ToolRunner, C: RunInfoClient> App<T, C> {
    pub fn new(tools: T, run_info: C, config: ResolvedConfig) -> Self {
        Self {
            tools,
            run_info,
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Fresh runs, one workspace per dataset, processed in order. Stops at the first failure.
    pub fn download(
        &self,
        request: DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, YamasError> {
        if request.datasets.is_empty() {
            return Err(YamasError::Input("no dataset ids given".to_string()));
        }
        if request.accession_list.is_some() && request.datasets.len() > 1 {
            return Err(YamasError::Input(
                "an accession list can only be supplied for a single dataset".to_string(),
            ));
        }
        let plan = Plan::acquisition(request.data_type);
        self.preflight(plan.stages())?;

        let mut runs = Vec::with_capacity(request.datasets.len());
        for dataset in request.datasets {
            let workspace = RunWorkspace::create(&self.config.base_dir, &dataset)?;
            sink.event(ProgressEvent {
                message: format!("phase=Prepare; workspace {}", workspace.root()),
                elapsed: None,
            });
            let mut ctx = RunContext::new(
                workspace,
                dataset,
                request.data_type,
                RunSettings::from(&self.config),
            );
            ctx.accession_list = request.accession_list.clone();
            let stages_run = self.runner().run(&mut ctx, plan.stages(), sink)?;
            runs.push(RunReport::new(&ctx, RunOutcome::Completed, stages_run));
        }
        Ok(DownloadResult { runs })
    }

    /// Resumes an interrupted run either from its checkpoint or from its converted reads.
    pub fn continue_run(
        &self,
        request: ContinueRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, YamasError> {
        let settings = RunSettings::from(&self.config);
        let Resumption {
            context: mut ctx,
            pending,
        } = if request.from_reads {
            resume::resume_from_reads(&request.root, request.dataset, request.data_type, settings)?
        } else {
            resume::resume_from_checkpoint(
                &request.root,
                request.dataset,
                request.data_type,
                settings,
            )?
        };

        if pending.is_empty() {
            sink.event(ProgressEvent {
                message: format!("{}: all stages already complete", ctx.dataset),
                elapsed: None,
            });
            return Ok(RunReport::new(&ctx, RunOutcome::AlreadyComplete, Vec::new()));
        }
        self.preflight(pending)?;
        let stages_run = self.runner().run(&mut ctx, pending, sink)?;
        Ok(RunReport::new(&ctx, RunOutcome::Completed, stages_run))
    }

    /// Imports a preprocessed Qiita study into `<base>/<dataset>`: demultiplex by barcode,
    /// trim the front adapter and summarize. The result can be exported like any amplicon run.
    pub fn qiita(
        &self,
        request: QiitaRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, YamasError> {
        if !request.data_type.is_amplicon() {
            return Err(YamasError::Input(format!(
                "Qiita imports support 16S and 18S data, not {}",
                request.data_type
            )));
        }
        let inputs = QiitaInputs {
            preprocessed_fastq: absolute_file(&request.preprocessed_fastq, "preprocessed fastq")?,
            prep_metadata: absolute_file(&request.prep_metadata, "prep metadata")?,
        };
        qiita::check_prep_metadata(&inputs.prep_metadata)?;
        let plan = Plan::qiita();
        self.preflight(plan.stages())?;

        let workspace = RunWorkspace::create(&self.config.base_dir, &request.dataset)?;
        sink.event(ProgressEvent {
            message: format!("phase=Prepare; workspace {}", workspace.root()),
            elapsed: None,
        });
        // cutadapt demux-single always yields single-end reads
        let topology = ReadTopology::new(workspace.root(), false);
        let mut ctx = RunContext::new(
            workspace,
            request.dataset,
            request.data_type,
            RunSettings::from(&self.config),
        );
        ctx.topology = Some(topology);
        ctx.qiita = Some(inputs);
        let stages_run = self.runner().run(&mut ctx, plan.stages(), sink)?;
        Ok(RunReport::new(&ctx, RunOutcome::Completed, stages_run))
    }

    /// Runs the export plan on a workspace whose acquisition finished, starting at the
    /// first export stage the checkpoint does not record.
    pub fn export(
        &self,
        request: ExportRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, YamasError> {
        let mut settings = RunSettings::from(&self.config);
        if let Some(threads) = request.threads {
            if threads == 0 {
                return Err(YamasError::Input("threads must be at least 1".to_string()));
            }
            settings.threads = threads;
        }
        let mut ctx = resume::resume_for_export(&request.root, settings)?;

        let classifier = absolute_file(&request.classifier, "classifier")?;
        let trim = TrimSpec::from_values(&request.trim, &request.trunc)?;
        trim.check_against(ctx.topology()?)?;
        ctx.export = Some(ExportOptions { trim, classifier });

        let plan = Plan::export();
        let pending = match plan.next_pending(ctx.completed()) {
            Some(next) => plan.from_stage(next),
            None => &[],
        };
        if pending.is_empty() {
            sink.event(ProgressEvent {
                message: format!("{}: export already complete", ctx.dataset),
                elapsed: None,
            });
            return Ok(RunReport::new(&ctx, RunOutcome::AlreadyComplete, Vec::new()));
        }
        self.preflight(pending)?;
        let stages_run = self.runner().run(&mut ctx, pending, sink)?;
        Ok(RunReport::new(&ctx, RunOutcome::Completed, stages_run))
    }

    /// Fails with [`YamasError::MissingTool`] naming every tool `stages` need that is not installed.
    pub fn preflight(&self, stages: &[Stage]) -> Result<(), YamasError> {
        let missing = required_tools(stages)
            .into_iter()
            .filter(|tool| !self.tools.is_available(tool))
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return Ok(());
        }
        Err(YamasError::MissingTool(missing.join(", ")))
    }

    fn runner(&self) -> StageRunner<'_, T, C> {
        StageRunner::new(&self.tools, &self.run_info)
    }
}

fn absolute_file(path: &Utf8Path, what: &str) -> Result<Utf8PathBuf, YamasError> {
    if !path.as_std_path().is_file() {
        return Err(YamasError::Input(format!("{what} {path} does not exist")));
    }
    let absolute = std::path::absolute(path.as_std_path())
        .map_err(|err| YamasError::Storage(format!("resolve {path}: {err}")))?;
    Utf8PathBuf::from_path_buf(absolute)
        .map_err(|_| YamasError::Storage(format!("non-utf8 path: {path}")))
}
