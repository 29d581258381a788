mod common;

use std::fs;

use assert_matches::assert_matches;
use tempfile::tempdir;

use yamas::app::{DownloadRequest, RunOutcome};
use yamas::checkpoint::CheckpointRecord;
use yamas::domain::DataType;
use yamas::error::YamasError;
use yamas::output::JsonOutput;
use yamas::stage::Stage;

use common::{MockTools, app, id, utf8};

fn request(dataset: &str, data_type: DataType) -> DownloadRequest {
    DownloadRequest {
        datasets: vec![id(dataset)],
        data_type,
        accession_list: None,
    }
}

#[test]
fn shotgun_download_produces_profile_tables() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::paired(), &["SRR1", "SRR2"], &base);

    let result = app
        .download(request("DS1", DataType::Shotgun), &JsonOutput)
        .unwrap();
    let report = &result.runs[0];
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.topology, Some("paired"));
    assert_eq!(report.stages_run.len(), 5);

    let root = base.join("DS1");
    assert_eq!(
        fs::read_to_string(root.join("DS1_acc_list.txt")).unwrap(),
        "SRR1\nSRR2\n"
    );
    assert_eq!(app.tools().count("metaphlan"), 2);
    assert_eq!(app.tools().count("fasterq-dump"), 2);
    let metaphlan = app
        .tools()
        .invocations()
        .into_iter()
        .find(|invocation| invocation.program == "metaphlan")
        .unwrap();
    let (forward, reverse) = metaphlan.args[0].split_once(',').unwrap();
    assert!(forward.ends_with("reads/SRR1_1.fastq"));
    assert!(reverse.ends_with("reads/SRR1_2.fastq"));
    assert_eq!(metaphlan.flag_value("--nproc"), Some("2"));

    let final_table = fs::read_to_string(root.join("exports/DS1_final_table.csv")).unwrap();
    let lines = final_table.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("sample_id,k__Bacteria,"));
    assert_eq!(lines[0].split(',').count(), 5);
    assert!(lines[1].starts_with("SRR1,100.0,60.0,40.0,"));
    assert!(lines[2].ends_with(",0.0,40.0"));

    let merged = fs::read_to_string(root.join("exports/DS1_merged_profile.txt")).unwrap();
    assert!(merged.starts_with("clade_name\tSRR1\tSRR2\n"));
    assert!(root.join("exports/DS1_combined_profile.csv").exists());
    let taxonomy = fs::read_to_string(root.join("exports/DS1_taxonomy.csv")).unwrap();
    assert!(taxonomy.contains("k__Bacteria|p__Firmicutes,Bacteria,Firmicutes,"));

    let record = CheckpointRecord::read(&root.join("checkpoint.json")).unwrap();
    assert!(record.has_forward && record.has_reverse);
    assert_eq!(record.data_type, DataType::Shotgun);
    assert_eq!(record.completed_stages.last(), Some(&Stage::Tabulate));
    assert_eq!(fs::read_dir(root.join("raw")).unwrap().count(), 0);
}

#[test]
fn amplicon_download_imports_and_summarizes() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::single(), &["SRR7", "SRR8", "SRR9"], &base);

    let result = app
        .download(request("PRJNA9", DataType::Amplicon16S), &JsonOutput)
        .unwrap();
    assert_eq!(result.runs[0].topology, Some("single"));

    let root = base.join("PRJNA9");
    let manifest = fs::read_to_string(root.join("manifest.tsv")).unwrap();
    let mut lines = manifest.lines();
    assert_eq!(lines.next(), Some("SampleID\tabsolute-filepath"));
    assert_eq!(lines.count(), 3);
    assert!(root.join("artifacts/demux-single-end.qza").exists());
    assert!(root.join("visualizations/PRJNA9.qzv").exists());

    let import = app
        .tools()
        .invocations()
        .into_iter()
        .find(|invocation| invocation.args.first().map(String::as_str) == Some("tools"))
        .unwrap();
    assert_eq!(
        import.flag_value("--input-format"),
        Some("SingleEndFastqManifestPhred33V2")
    );
}

#[test]
fn supplied_accession_list_skips_the_run_info_service() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let list = base.join("accessions.txt");
    common::write(&list, "SRR5\n");
    let app = app(MockTools::paired(), &[], &base);

    let mut request = request("DS5", DataType::Amplicon18S);
    request.accession_list = Some(list.clone());
    let result = app.download(request, &JsonOutput).unwrap();
    assert_eq!(result.runs[0].topology, Some("paired"));
    assert_eq!(
        app.tools().invocations()[0].flag_value("--option-file"),
        Some(list.as_str())
    );
}

#[test]
fn missing_accession_list_fails_the_acquire_stage() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::paired(), &["SRR1"], &base);

    let mut request = request("DS5", DataType::Shotgun);
    request.accession_list = Some(base.join("nope.txt"));
    let err = app.download(request, &JsonOutput).unwrap_err();
    assert_matches!(&err, YamasError::Stage { stage: Stage::Acquire, .. });
    assert_matches!(err.root_cause(), YamasError::Input(_));
    assert!(app.tools().invocations().is_empty());
}

#[test]
fn preflight_rejects_missing_tools_before_any_stage() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::paired().without("metaphlan"), &["SRR1"], &base);

    let err = app
        .download(request("DS1", DataType::Shotgun), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, YamasError::MissingTool(tool) if tool == "metaphlan");
    assert!(app.tools().invocations().is_empty());
    assert!(!base.join("DS1").exists());
}

#[test]
fn failing_tool_halts_and_keeps_completed_stages() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::paired(), &["SRR1", "SRR2"], &base);
    app.tools().fail_on("demux summarize");

    let err = app
        .download(request("DS2", DataType::Amplicon16S), &JsonOutput)
        .unwrap_err();
    assert_matches!(
        &err,
        YamasError::Stage { stage: Stage::Summarize, dataset, .. } if dataset == "DS2"
    );
    assert_matches!(err.root_cause(), YamasError::ToolFailed { program, .. } if program == "qiime");

    let root = base.join("DS2");
    let record = CheckpointRecord::read(&root.join("checkpoint.json")).unwrap();
    assert_eq!(
        record.completed_stages,
        vec![
            Stage::Acquire,
            Stage::Convert,
            Stage::BuildManifest,
            Stage::ImportReads
        ]
    );
    assert!(root.join("artifacts/demux-paired-end.qza").exists());
    let log = fs::read_to_string(root.join("artifacts/logs/summarize.log")).unwrap();
    assert!(log.contains("qiime demux summarize"));
}

#[test]
fn convert_without_archive_is_a_stage_error() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::paired(), &["SRR1"], &base);
    // An empty run directory left behind by an interrupted download.
    fs::create_dir_all(base.join("DS3/raw/SRR0")).unwrap();

    let err = app
        .download(request("DS3", DataType::Shotgun), &JsonOutput)
        .unwrap_err();
    assert_matches!(&err, YamasError::Stage { stage: Stage::Convert, .. });
    assert_matches!(err.root_cause(), YamasError::MissingOutput(_));
}

#[test]
fn several_datasets_get_separate_workspaces() {
    let temp = tempdir().unwrap();
    let base = utf8(temp.path());
    let app = app(MockTools::single(), &["SRR1", "SRR2"], &base);

    let mut request = request("DSA", DataType::Shotgun);
    request.datasets.push(id("DSB"));
    let result = app.download(request, &JsonOutput).unwrap();
    assert_eq!(result.runs.len(), 2);
    assert!(base.join("DSA/exports/DSA_final_table.csv").exists());
    assert!(base.join("DSB/exports/DSB_final_table.csv").exists());
}
