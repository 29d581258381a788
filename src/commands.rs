//! Argument vectors for the external collaborators.

use camino::Utf8Path;

use crate::domain::TrimSpec;
use crate::exec::ToolInvocation;
use crate::manifest::SampleReads;

pub mod artifact {
    pub const DADA2_TABLE: &str = "dada2_table.qza";
    pub const DADA2_REP_SEQS: &str = "dada2_rep-seqs.qza";
    pub const DADA2_STATS: &str = "dada2_denoising-stats.qza";
    pub const CLUSTERED_TABLE: &str = "table-dn-99.qza";
    pub const CLUSTERED_SEQS: &str = "rep-seqs-dn-99.qza";
    pub const CLEAN_TABLE: &str = "clean_table.qza";
    pub const FILTERED_TABLE: &str = "feature-frequency-filtered-table.qza";
    pub const ALIGNED_SEQS: &str = "aligned-rep-seqs.qza";
    pub const TREE: &str = "fasttree-tree.qza";
    pub const ROOTED_TREE: &str = "fasttree-tree-rooted.qza";
    pub const MULTIPLEXED_SEQS: &str = "multiplexed-seqs.qza";
    pub const UNTRIMMED_SEQS: &str = "untrimmed.qza";
    pub const TRIMMED_SEQS: &str = "trimmed-seqs.qza";

    pub fn demux(paired: bool) -> String {
        format!("demux-{}-end.qza", if paired { "paired" } else { "single" })
    }
}

pub fn prefetch(accession_list: &Utf8Path, raw_dir: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("prefetch")
        .arg("--option-file")
        .arg(accession_list.as_str())
        .arg("--output-directory")
        .arg(raw_dir.as_str())
        .args(["--max-size", "u"])
}

pub fn fasterq_dump(sra_path: &Utf8Path, reads_dir: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("fasterq-dump")
        .arg("--split-files")
        .arg(sra_path.as_str())
        .arg("-O")
        .arg(reads_dir.as_str())
}

pub fn qiime_import(manifest: &Utf8Path, output: &Utf8Path, paired: bool) -> ToolInvocation {
    let (semantic_type, format) = if paired {
        (
            "SampleData[PairedEndSequencesWithQuality]",
            "PairedEndFastqManifestPhred33V2",
        )
    } else {
        (
            "SampleData[SequencesWithQuality]",
            "SingleEndFastqManifestPhred33V2",
        )
    };
    ToolInvocation::new("qiime")
        .args(["tools", "import", "--type", semantic_type])
        .arg("--input-path")
        .arg(manifest.as_str())
        .args(["--input-format", format])
        .arg("--output-path")
        .arg(output.as_str())
}

pub fn qiime_import_multiplexed(fastq: &Utf8Path, output: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args([
            "tools",
            "import",
            "--type",
            "MultiplexedSingleEndBarcodeInSequence",
            "--input-path",
        ])
        .arg(fastq.as_str())
        .arg("--output-path")
        .arg(output.as_str())
}

pub fn cutadapt_demux_single(
    multiplexed: &Utf8Path,
    barcodes: &Utf8Path,
    demux: &Utf8Path,
    untrimmed: &Utf8Path,
) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["cutadapt", "demux-single", "--i-seqs"])
        .arg(multiplexed.as_str())
        .arg("--m-barcodes-file")
        .arg(barcodes.as_str())
        .args(["--m-barcodes-column", "barcode", "--p-error-rate", "0"])
        .arg("--o-per-sample-sequences")
        .arg(demux.as_str())
        .arg("--o-untrimmed-sequences")
        .arg(untrimmed.as_str())
        .arg("--verbose")
}

/// Primer removed from the front of every demultiplexed Qiita read.
pub const QIITA_FRONT_ADAPTER: &str = "GCTACGGGGGG";

pub fn cutadapt_trim_single(demux: &Utf8Path, trimmed: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["cutadapt", "trim-single", "--i-demultiplexed-sequences"])
        .arg(demux.as_str())
        .args(["--p-front", QIITA_FRONT_ADAPTER, "--p-error-rate", "0"])
        .arg("--o-trimmed-sequences")
        .arg(trimmed.as_str())
        .arg("--verbose")
}

pub fn qiime_demux_summarize(demux: &Utf8Path, visualization: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["demux", "summarize", "--i-data"])
        .arg(demux.as_str())
        .arg("--o-visualization")
        .arg(visualization.as_str())
}

pub fn metaphlan(
    reads: &SampleReads,
    bowtie2_out: &Utf8Path,
    profile: &Utf8Path,
    threads: usize,
    database: Option<&Utf8Path>,
) -> ToolInvocation {
    let input = reads
        .paths()
        .iter()
        .map(|path| path.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let mut invocation = ToolInvocation::new("metaphlan")
        .arg(input)
        .args(["--input_type", "fastq", "--bowtie2out"])
        .arg(bowtie2_out.as_str())
        .arg("--nproc")
        .arg(threads.to_string())
        .arg("-o")
        .arg(profile.as_str());
    if let Some(database) = database {
        invocation = invocation.arg("--bowtie2db").arg(database.as_str());
    }
    invocation
}

pub struct Dada2Outputs<'a> {
    pub table: &'a Utf8Path,
    pub representative_sequences: &'a Utf8Path,
    pub denoising_stats: &'a Utf8Path,
}

pub fn dada2_denoise(
    demux: &Utf8Path,
    trim: &TrimSpec,
    threads: usize,
    outputs: Dada2Outputs<'_>,
) -> ToolInvocation {
    let method = match trim {
        TrimSpec::Single { .. } => "denoise-single",
        TrimSpec::Paired { .. } => "denoise-paired",
    };
    ToolInvocation::new("qiime")
        .args(["dada2", method, "--i-demultiplexed-seqs"])
        .arg(demux.as_str())
        .args(trim.dada2_args())
        .arg("--o-table")
        .arg(outputs.table.as_str())
        .arg("--p-n-threads")
        .arg(threads.to_string())
        .args(["--p-chimera-method", "consensus"])
        .arg("--o-representative-sequences")
        .arg(outputs.representative_sequences.as_str())
        .arg("--o-denoising-stats")
        .arg(outputs.denoising_stats.as_str())
        .arg("--verbose")
}

pub fn vsearch_cluster_de_novo(
    table: &Utf8Path,
    sequences: &Utf8Path,
    clustered_table: &Utf8Path,
    clustered_sequences: &Utf8Path,
) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["vsearch", "cluster-features-de-novo", "--i-table"])
        .arg(table.as_str())
        .arg("--i-sequences")
        .arg(sequences.as_str())
        .args(["--p-perc-identity", "0.99"])
        .arg("--o-clustered-table")
        .arg(clustered_table.as_str())
        .arg("--o-clustered-sequences")
        .arg(clustered_sequences.as_str())
}

pub fn classify_sklearn(
    sequences: &Utf8Path,
    classifier: &Utf8Path,
    classification: &Utf8Path,
) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["feature-classifier", "classify-sklearn", "--i-reads"])
        .arg(sequences.as_str())
        .arg("--i-classifier")
        .arg(classifier.as_str())
        .arg("--o-classification")
        .arg(classification.as_str())
}

pub fn taxa_filter_table(
    table: &Utf8Path,
    taxonomy: &Utf8Path,
    filtered: &Utf8Path,
) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["taxa", "filter-table", "--i-table"])
        .arg(table.as_str())
        .arg("--i-taxonomy")
        .arg(taxonomy.as_str())
        .args(["--p-exclude", "mitochondria,chloroplast"])
        .arg("--o-filtered-table")
        .arg(filtered.as_str())
}

pub fn filter_features(table: &Utf8Path, filtered: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["feature-table", "filter-features", "--i-table"])
        .arg(table.as_str())
        .args(["--p-min-samples", "3", "--p-min-frequency", "10"])
        .arg("--o-filtered-table")
        .arg(filtered.as_str())
}

pub fn qiime_export(input: &Utf8Path, output_dir: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["tools", "export", "--input-path"])
        .arg(input.as_str())
        .arg("--output-path")
        .arg(output_dir.as_str())
}

pub fn biom_to_tsv(biom: &Utf8Path, tsv: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("biom")
        .args(["convert", "-i"])
        .arg(biom.as_str())
        .arg("-o")
        .arg(tsv.as_str())
        .arg("--to-tsv")
}

pub fn mafft(sequences: &Utf8Path, alignment: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["alignment", "mafft", "--i-sequences"])
        .arg(sequences.as_str())
        .arg("--o-alignment")
        .arg(alignment.as_str())
}

pub fn fasttree(alignment: &Utf8Path, tree: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["phylogeny", "fasttree", "--i-alignment"])
        .arg(alignment.as_str())
        .arg("--o-tree")
        .arg(tree.as_str())
        .arg("--verbose")
}

pub fn midpoint_root(tree: &Utf8Path, rooted: &Utf8Path) -> ToolInvocation {
    ToolInvocation::new("qiime")
        .args(["phylogeny", "midpoint-root", "--i-tree"])
        .arg(tree.as_str())
        .arg("--o-rooted-tree")
        .arg(rooted.as_str())
}
