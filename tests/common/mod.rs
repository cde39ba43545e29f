#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use rnapip::cli::Arguments;
use rnapip::config::defs::{PipelineError, RunConfig};
use rnapip::pipelines::common::RunContext;
use rnapip::utils::artifacts::FsArtifactStore;
use rnapip::utils::command::{ToolInvocation, ToolRunner};

/// Records every invocation and leaves behind the files a real tool would.
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: RefCell<Vec<ToolInvocation>>,
    /// Program that fails instead of running.
    pub fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn failing(program: &str) -> Self {
        RecordingRunner { calls: RefCell::new(Vec::new()), fail_on: Some(program.to_string()) }
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.program.clone()).collect()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.program == program).count()
    }

    pub fn first(&self, program: &str) -> Option<ToolInvocation> {
        self.calls.borrow().iter().find(|c| c.program == program).cloned()
    }
}

fn touch(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

impl ToolRunner for RecordingRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), PipelineError> {
        self.calls.borrow_mut().push(invocation.clone());
        if self.fail_on.as_deref() == Some(invocation.program.as_str()) {
            return Err(PipelineError::ToolExecution {
                tool: invocation.program.clone(),
                error: "exited with exit status: 1".to_string(),
            });
        }
        if let Some(out) = &invocation.stdout {
            touch(out, &format!("stdout of {}\n", invocation.program));
        }
        for out in &invocation.produces {
            touch(out, &format!("written by {}\n", invocation.program));
        }
        Ok(())
    }
}

/// Scratch layout: `<tmp>/reads` holds the FASTQ paths, `<tmp>/work` is the
/// working directory, the sample sheet is `<tmp>/exp.tsv`.
pub struct Fixture {
    pub tmp: tempfile::TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("reads")).unwrap();
        fs::create_dir_all(tmp.path().join("work")).unwrap();
        Fixture { tmp }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    pub fn reads(&self) -> PathBuf {
        self.path("reads")
    }

    pub fn work(&self) -> PathBuf {
        self.path("work")
    }

    /// Leaves a finished STAR index where `config` points the aligner.
    pub fn prebuilt_star_index(&self) {
        touch(&self.path("index/SA"), "");
    }

    pub fn sheet(&self) -> PathBuf {
        self.path("exp.tsv")
    }

    /// Writes a paired sheet; each entry is (name, condition).
    pub fn write_paired_sheet(&self, samples: &[(&str, &str)]) {
        let mut text = String::from("sample\tread1\tread2\tcondition\tbatch\n");
        for (name, cond) in samples {
            let r = self.reads();
            text.push_str(&format!(
                "{n}\t{d}/{n}_r_1.fastq.gz\t{d}/{n}_r_2.fastq.gz\t{c}\tb1\n",
                n = name,
                d = r.display(),
                c = cond
            ));
        }
        fs::write(self.sheet(), text).unwrap();
    }

    pub fn write_single_sheet(&self, samples: &[(&str, &str)]) {
        let mut text = String::from("sample\tread1\tread2\tcondition\n");
        for (name, cond) in samples {
            text.push_str(&format!("{n}\t{d}/{n}.fq.gz\tNA\t{c}\n", n = name, d = self.reads().display(), c = cond));
        }
        fs::write(self.sheet(), text).unwrap();
    }

    pub fn config(&self, extra: &[&str]) -> Arc<RunConfig> {
        let sheet = self.sheet().display().to_string();
        let genome = self.path("genome.fa").display().to_string();
        let index = self.path("index").display().to_string();
        let mut argv: Vec<String> = vec![
            "rnapip".into(),
            sheet,
            genome,
            "--genome-index".into(),
            index,
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let args = Arguments::parse_from(argv);
        Arc::new(RunConfig::from_args(&args, &self.work(), "test".to_string(), 4).unwrap())
    }

    pub fn deseq_config(&self, extra: &[&str]) -> Arc<RunConfig> {
        let gtf = self.path("genes.gtf").display().to_string();
        let script = self.path("deseq.R").display().to_string();
        let mut argv: Vec<String> = vec!["--genome-gtf".into(), gtf, "--analysis-script".into(), script];
        argv.extend(extra.iter().map(|s| s.to_string()));
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        self.config(&argv)
    }

    pub fn context(&self, config: Arc<RunConfig>) -> RunContext<RecordingRunner, FsArtifactStore> {
        RunContext::new(config, RecordingRunner::default(), FsArtifactStore)
    }
}
