mod common;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use tempfile::tempdir;

use yamas::app::{App, ContinueRequest, ExportRequest, QiitaRequest, RunOutcome};
use yamas::checkpoint::CheckpointRecord;
use yamas::domain::DataType;
use yamas::error::YamasError;
use yamas::output::JsonOutput;
use yamas::stage::Stage;

use common::{MockRunInfo, MockTools, app, id, utf8, write};

const PREP_INFO: &str = "sample_name\tbarcode\tprimer\n\
10317.S1\tACGTACGTACGT\tGTGCCAGCMGCCGCGGTAA\n\
10317.S2\tTGCATGCATGCA\tGTGCCAGCMGCCGCGGTAA\n";

struct Study {
    fastq: Utf8PathBuf,
    metadata: Utf8PathBuf,
}

fn study(dir: &Utf8Path) -> Study {
    let fastq = dir.join("download/seqs.fastq.gz");
    let metadata = dir.join("download/prep_info.tsv");
    write(&fastq, "gz");
    write(&metadata, PREP_INFO);
    Study { fastq, metadata }
}

fn request(study: &Study, data_type: DataType) -> QiitaRequest {
    QiitaRequest {
        dataset: id("qiita-10317"),
        preprocessed_fastq: study.fastq.clone(),
        prep_metadata: study.metadata.clone(),
        data_type,
    }
}

fn imported(base: &Utf8Path) -> App<MockTools, MockRunInfo> {
    let app = app(MockTools::single(), &[], base);
    let study = study(base);
    app.qiita(request(&study, DataType::Amplicon16S), &JsonOutput)
        .unwrap();
    app.tools().reset();
    app
}

#[test]
fn qiita_import_demultiplexes_trims_and_summarizes() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let study = study(&base);
    let app = app(MockTools::single(), &[], &base);

    let report = app
        .qiita(request(&study, DataType::Amplicon16S), &JsonOutput)
        .unwrap();
    assert_eq!(
        report.stages_run,
        vec![
            Stage::ImportMultiplexed,
            Stage::DemuxBarcodes,
            Stage::TrimAdapters,
            Stage::SummarizeTrimmed
        ]
    );
    assert_eq!(report.topology, Some("single"));

    let invocations = app.tools().invocations();
    assert_eq!(
        invocations[0].flag_value("--type"),
        Some("MultiplexedSingleEndBarcodeInSequence")
    );
    assert_eq!(invocations[0].flag_value("--input-path"), Some(study.fastq.as_str()));
    assert_eq!(
        invocations[1].flag_value("--m-barcodes-file"),
        Some(study.metadata.as_str())
    );
    assert_eq!(invocations[1].flag_value("--m-barcodes-column"), Some("barcode"));
    assert_eq!(invocations[2].flag_value("--p-front"), Some("GCTACGGGGGG"));
    assert_eq!(app.tools().count("prefetch"), 0);

    let root = base.join("qiita-10317");
    assert!(root.join("artifacts/demux-single-end.qza").exists());
    assert!(root.join("visualizations/qiita-10317.qzv").exists());

    let record = CheckpointRecord::read(&root.join("checkpoint.json")).unwrap();
    assert!(!record.has_reverse);
    assert_eq!(record.completed_stages.len(), 4);
    assert_eq!(
        record.qiita.map(|inputs| inputs.prep_metadata),
        Some(study.metadata.clone())
    );
}

#[test]
fn prep_info_without_barcodes_is_rejected_before_any_work() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let study = study(&base);
    write(&study.metadata, "sample_name\tprimer\n10317.S1\tGTGCCAGC\n");
    let app = app(MockTools::single(), &[], &base);

    let err = app
        .qiita(request(&study, DataType::Amplicon16S), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, YamasError::Input(message) if message.contains("barcode"));
    assert!(app.tools().invocations().is_empty());
    assert!(!base.join("qiita-10317").exists());
}

#[test]
fn shotgun_qiita_import_is_rejected() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let study = study(&base);
    let app = app(MockTools::single(), &[], &base);

    let err = app
        .qiita(request(&study, DataType::Shotgun), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, YamasError::Input(_));
}

#[test]
fn interrupted_qiita_import_continues_from_its_checkpoint() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let study = study(&base);
    let app = app(MockTools::single(), &[], &base);
    app.tools().fail_on("cutadapt trim-single");
    let err = app
        .qiita(request(&study, DataType::Amplicon18S), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, YamasError::Stage { stage: Stage::TrimAdapters, .. });

    app.tools().clear_failure();
    app.tools().reset();
    let continued = ContinueRequest {
        dataset: id("qiita-10317"),
        root: base.join("qiita-10317"),
        data_type: DataType::Amplicon18S,
        from_reads: false,
    };
    let report = app.continue_run(continued.clone(), &JsonOutput).unwrap();
    assert_eq!(
        report.stages_run,
        vec![Stage::TrimAdapters, Stage::SummarizeTrimmed]
    );
    assert_eq!(app.tools().count("cutadapt demux-single"), 0);

    let again = app.continue_run(continued, &JsonOutput).unwrap();
    assert_eq!(again.outcome, RunOutcome::AlreadyComplete);
}

#[test]
fn qiita_import_can_be_exported() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let classifier = base.join("classifier.qza");
    write(&classifier, "classifier");
    let app = imported(&base);

    let report = app
        .export(
            ExportRequest {
                root: base.join("qiita-10317"),
                trim: vec![0],
                trunc: vec![150],
                classifier,
                threads: None,
            },
            &JsonOutput,
        )
        .unwrap();
    assert_eq!(report.stages_run.len(), 10);

    let denoise = app
        .tools()
        .invocations()
        .into_iter()
        .find(|invocation| invocation.args.get(1).map(String::as_str) == Some("denoise-single"))
        .unwrap();
    assert!(
        denoise
            .flag_value("--i-demultiplexed-seqs")
            .unwrap()
            .ends_with("artifacts/demux-single-end.qza")
    );
}
