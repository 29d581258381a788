use assert_matches::assert_matches;

use yamas::error::YamasError;
use yamas::ncbi::parse_accessions;

#[test]
fn run_column_is_located_by_name() {
    let table = "ReleaseDate,Run,spots\n\
2019-05-01,SRR9000001,120\n\
2019-05-01,DRR000002,98\n\
2019-05-01,SRX123,98\n";
    assert_eq!(
        parse_accessions(table).unwrap(),
        vec!["SRR9000001", "DRR000002"]
    );
}

#[test]
fn blank_lines_between_batches_are_skipped() {
    let table = "Run,spots\nERR1,1\n\nRun,spots\nERR2,2\n";
    assert_eq!(parse_accessions(table).unwrap(), vec!["ERR1", "ERR2"]);
}

#[test]
fn table_without_runs_is_an_input_error() {
    assert_matches!(
        parse_accessions("Run,spots\n"),
        Err(YamasError::Input(_))
    );
}
