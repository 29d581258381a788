#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use yamas::app::App;
use yamas::config::ResolvedConfig;
use yamas::domain::DatasetId;
use yamas::error::YamasError;
use yamas::exec::{ToolInvocation, ToolRunner, ToolStatus};
use yamas::ncbi::RunInfoClient;

pub const FASTQ: &str = "@read1\nACGTACGT\n+\nIIIIIIII\n";

pub const OTU_TSV: &str = "# Constructed from biom file\n\
#OTU ID\tSRR1\tSRR2\n\
f1\t10.0\t3.0\n\
f2\t0.0\t7.0\n";

pub const TAXONOMY_TSV: &str = "Feature ID\tTaxon\tConfidence\n\
f1\tk__Bacteria; p__Firmicutes\t0.99\n\
f2\tk__Bacteria; p__Bacteroidetes\t0.97\n";

pub const NEWICK: &str = "((f1:0.1,f2:0.2)0.9:0.05,f3:0.3);\n";

/// Records every invocation and fabricates the files a real tool would leave behind.
pub struct MockTools {
    paired: bool,
    missing: Vec<String>,
    fail_on: Mutex<Option<String>>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl MockTools {
    pub fn paired() -> Self {
        Self::new(true)
    }

    pub fn single() -> Self {
        Self::new(false)
    }

    fn new(paired: bool) -> Self {
        Self {
            paired,
            missing: Vec::new(),
            fail_on: Mutex::new(None),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn without(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Any invocation whose command line contains `pattern` exits with status 1.
    pub fn fail_on(&self, pattern: &str) {
        *self.fail_on.lock().unwrap() = Some(pattern.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn reset(&self) {
        self.invocations.lock().unwrap().clear();
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    fn fabricate(&self, invocation: &ToolInvocation) {
        match invocation.program.as_str() {
            "prefetch" => {
                let list = invocation.flag_value("--option-file").unwrap();
                let out = Utf8Path::new(invocation.flag_value("--output-directory").unwrap());
                for accession in fs::read_to_string(list).unwrap().lines() {
                    let accession = accession.trim();
                    if accession.is_empty() {
                        continue;
                    }
                    write(&out.join(accession).join(format!("{accession}.sra")), "sra");
                }
            }
            "fasterq-dump" => {
                let sra = Utf8Path::new(&invocation.args[1]);
                let out = Utf8Path::new(invocation.flag_value("-O").unwrap());
                let accession = sra.file_stem().unwrap();
                if self.paired {
                    write(&out.join(format!("{accession}_1.fastq")), FASTQ);
                    write(&out.join(format!("{accession}_2.fastq")), FASTQ);
                } else {
                    write(&out.join(format!("{accession}.fastq")), FASTQ);
                }
            }
            "metaphlan" => {
                let out = Utf8Path::new(invocation.flag_value("-o").unwrap());
                let sample = out.file_stem().unwrap().trim_end_matches("_profile");
                write(out, &metaphlan_profile(sample));
            }
            "biom" => {
                write(Utf8Path::new(invocation.flag_value("-o").unwrap()), OTU_TSV);
            }
            "qiime" if invocation.args.starts_with(&["tools".to_string(), "export".to_string()]) => {
                let input = invocation.flag_value("--input-path").unwrap();
                let out = Utf8Path::new(invocation.flag_value("--output-path").unwrap());
                fs::create_dir_all(out).unwrap();
                if input.ends_with("feature-frequency-filtered-table.qza") {
                    write(&out.join("feature-table.biom"), "biom");
                } else if input.ends_with("classified.qza") {
                    write(&out.join("taxonomy.tsv"), TAXONOMY_TSV);
                } else if input.ends_with("fasttree-tree-rooted.qza") {
                    write(&out.join("tree.nwk"), NEWICK);
                }
            }
            "qiime" => {
                for (index, arg) in invocation.args.iter().enumerate() {
                    if arg.starts_with("--o-") || arg == "--output-path" {
                        write(Utf8Path::new(&invocation.args[index + 1]), "artifact");
                    }
                }
            }
            _ => {}
        }
    }
}

impl ToolRunner for MockTools {
    fn run(&self, invocation: &ToolInvocation, log: &Utf8Path) -> Result<ToolStatus, YamasError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        let mut log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .unwrap();
        writeln!(log_file, "$ {invocation}").unwrap();

        let failing = self.fail_on.lock().unwrap().clone();
        if let Some(pattern) = failing {
            if invocation.to_string().contains(&pattern) {
                return Ok(ToolStatus { code: Some(1) });
            }
        }
        self.fabricate(invocation);
        Ok(ToolStatus::success())
    }

    fn is_available(&self, program: &str) -> bool {
        !self.missing.iter().any(|missing| missing == program)
    }
}

pub fn metaphlan_profile(sample: &str) -> String {
    format!(
        "#mpa_vJan21_CHOCOPhlAnSGB_202103\n\
#SampleID\tMetaphlan_Analysis\n\
#clade_name\tNCBI_tax_id\trelative_abundance\tadditional_species\n\
k__Bacteria\t2\t100.0\t\n\
k__Bacteria|p__Firmicutes\t2|1239\t60.0\t\n\
k__Bacteria|p__Taxon_{sample}\t2|0\t40.0\t\n"
    )
}

/// Serves a fixed SRA run table.
pub struct MockRunInfo {
    accessions: Vec<String>,
    calls: Mutex<usize>,
}

impl MockRunInfo {
    pub fn new(accessions: &[&str]) -> Self {
        Self {
            accessions: accessions.iter().map(|acc| acc.to_string()).collect(),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl RunInfoClient for MockRunInfo {
    fn fetch_run_info(&self, _dataset: &DatasetId) -> Result<String, YamasError> {
        *self.calls.lock().unwrap() += 1;
        let mut table = "Run,ReleaseDate,LoadDate,spots\n".to_string();
        for accession in &self.accessions {
            table.push_str(&format!("{accession},2021-01-01,2021-01-01,1000\n"));
        }
        Ok(table)
    }
}

pub fn write(path: &Utf8Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn utf8(path: &std::path::Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn config(base: &Utf8Path) -> ResolvedConfig {
    ResolvedConfig {
        base_dir: base.to_path_buf(),
        threads: 2,
        ..ResolvedConfig::default()
    }
}

pub fn app(tools: MockTools, accessions: &[&str], base: &Utf8Path) -> App<MockTools, MockRunInfo> {
    App::new(tools, MockRunInfo::new(accessions), config(base))
}

pub fn id(value: &str) -> DatasetId {
    value.parse().unwrap()
}
