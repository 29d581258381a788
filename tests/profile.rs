mod common;

use std::fs;

use assert_matches::assert_matches;
use tempfile::tempdir;

use yamas::error::YamasError;
use yamas::profile::{MergedProfile, SampleProfile};

use common::{metaphlan_profile, utf8, write};

#[test]
fn merge_fills_absent_taxa_with_zero() {
    let temp = tempdir().unwrap();
    let dir = utf8(temp.path());
    let first = dir.join("S1_profile.txt");
    let second = dir.join("S2_profile.txt");
    write(&first, &metaphlan_profile("S1"));
    write(&second, &metaphlan_profile("S2"));

    let merged = MergedProfile::from_files(&[first, second]).unwrap();
    assert_eq!(merged.samples(), ["S1", "S2"]);
    assert_eq!(merged.taxa().len(), 4);
    assert_eq!(merged.value("k__Bacteria|p__Taxon_S1", "S2"), Some("0.0"));
    assert_eq!(merged.value("k__Bacteria|p__Taxon_S2", "S2"), Some("40.0"));
}

#[test]
fn transposed_table_has_one_row_per_sample() {
    let temp = tempdir().unwrap();
    let dir = utf8(temp.path());
    let profiles = ["S1", "S2", "S3"]
        .iter()
        .map(|sample| {
            let path = dir.join(format!("{sample}_profile.txt"));
            write(&path, &metaphlan_profile(sample));
            path
        })
        .collect::<Vec<_>>();
    let merged = MergedProfile::from_files(&profiles).unwrap();

    let tsv = dir.join("merged.txt");
    merged.write_tsv(&tsv).unwrap();
    let reread = MergedProfile::read_tsv(&tsv).unwrap();
    assert_eq!(reread, merged);

    let out = dir.join("final.csv");
    reread.write_transposed_csv(&out).unwrap();
    let content = fs::read_to_string(&out).unwrap();
    let rows = content.lines().collect::<Vec<_>>();
    assert_eq!(rows.len(), 1 + 3);
    for row in &rows {
        assert_eq!(row.split(',').count(), merged.taxa().len() + 1);
    }
    assert!(rows[0].starts_with("sample_id,"));
}

#[test]
fn mixed_header_structures_are_rejected() {
    let headed = SampleProfile::parse("S1".to_string(), &metaphlan_profile("S1")).unwrap();
    let bare = SampleProfile::parse("S2".to_string(), "k__Bacteria\t100.0\n").unwrap();
    assert_matches!(
        MergedProfile::merge(&[headed, bare]),
        Err(YamasError::Format(_))
    );
}

#[test]
fn ragged_merged_table_is_a_format_error() {
    let temp = tempdir().unwrap();
    let path = utf8(temp.path()).join("merged.txt");
    write(&path, "clade_name\tS1\tS2\nk__Bacteria\t100.0\n");
    assert_matches!(MergedProfile::read_tsv(&path), Err(YamasError::Format(_)));
}

#[test]
fn non_numeric_abundance_is_a_format_error() {
    assert_matches!(
        SampleProfile::parse("S1".to_string(), "k__Bacteria\tmany\n"),
        Err(YamasError::Format(_))
    );
}
