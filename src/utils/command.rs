/// Functions and structs for building and running external tool command lines

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use tokio::process::Command;

use crate::config::defs::{AnalysisType, Aligner, PipelineError, RunConfig, TOOL_PACKAGES};
use crate::config::defs::{
    CUFFDIFF_TAG, CUFFLINKS_TAG, CUFFMERGE_TAG, CUFFNORM_TAG, CUFFQUANT_TAG, HISAT2_BUILD_TAG,
    HISAT2_TAG, HTSEQ_COUNT_TAG, RSCRIPT_TAG, SAMTOOLS_TAG, STAR_TAG, TRIM_GALORE_TAG,
};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// One external process call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// File receiving the process standard output.
    pub stdout: Option<PathBuf>,
    /// Files the tool must leave behind when it succeeds.
    pub produces: Vec<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        ToolInvocation {
            program: program.to_string(),
            args,
            stdout: None,
            produces: Vec::new(),
        }
    }

    pub fn stdout_to(mut self, path: PathBuf) -> Self {
        self.stdout = Some(path);
        self
    }

    pub fn produces(mut self, paths: Vec<PathBuf>) -> Self {
        self.produces = paths;
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        if let Some(out) = &self.stdout {
            line.push_str(&format!(" > {}", out.display()));
        }
        line
    }
}

/// Launches tool invocations. Each call completes before it returns.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), PipelineError>;
}

/// Runs invocations as child processes. A nonzero exit is fatal, and so is a
/// zero exit that leaves a declared output missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<(), PipelineError> {
        info!("Running: {}", invocation.command_line());
        let tool_err = |error: String| PipelineError::ToolExecution {
            tool: invocation.program.clone(),
            error,
        };

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).stdin(Stdio::null());
        if let Some(out) = &invocation.stdout {
            let file = std::fs::File::create(out)
                .map_err(|e| tool_err(format!("Cannot create {}: {}", out.display(), e)))?;
            cmd.stdout(Stdio::from(file));
        }

        let status = cmd.status().await.map_err(|e| {
            tool_err(format!(
                "Failed to spawn: {}. Is {} installed?",
                e, invocation.program
            ))
        })?;

        if !status.success() {
            // A truncated capture would otherwise be taken as a finished artifact next run.
            if let Some(out) = &invocation.stdout {
                if let Err(e) = std::fs::remove_file(out) {
                    warn!("Could not remove partial output {}: {}", out.display(), e);
                }
            }
            return Err(tool_err(format!("exited with {}", status)));
        }

        for expected in &invocation.produces {
            if !expected.exists() {
                return Err(tool_err(format!(
                    "exited successfully but did not produce {}",
                    expected.display()
                )));
            }
        }
        debug!("{} finished", invocation.program);
        Ok(())
    }
}

pub mod trim_galore {
    use std::path::PathBuf;
    use crate::config::defs::{Layout, RunConfig, TRIM_GALORE_TAG};
    use super::{path_arg, ToolInvocation};

    pub fn arg_generator(config: &RunConfig, inputs: &[PathBuf], produces: Vec<PathBuf>) -> ToolInvocation {
        let mut args_vec: Vec<String> = vec!["--gzip".to_string()];
        args_vec.extend(config.trim.extra.iter().cloned());

        if !config.trim.out_dir_in_extra {
            args_vec.push("-o".to_string());
            args_vec.push(path_arg(&config.trim.out_dir));
        }

        if config.trim.fastqc {
            args_vec.push("--fastqc".to_string());
            if let Some(fastqc_args) = &config.trim.fastqc_args {
                args_vec.push("--fastqc_args".to_string());
                args_vec.push(fastqc_args.clone());
            }
        }

        if config.layout == Layout::PairedEnd {
            args_vec.push("--paired".to_string());
        }

        args_vec.extend(inputs.iter().map(|p| path_arg(p)));
        ToolInvocation::new(TRIM_GALORE_TAG, args_vec).produces(produces)
    }
}

pub mod star {
    use std::path::PathBuf;
    use crate::config::defs::{RunConfig, STAR_TAG};
    use super::{path_arg, ToolInvocation};

    /// Suffix array file, written last by `genomeGenerate`.
    pub fn index_marker(config: &RunConfig) -> PathBuf {
        config.genome_index.join("SA")
    }

    pub fn index_generator(config: &RunConfig) -> ToolInvocation {
        let args_vec = vec![
            "--runMode".to_string(),
            "genomeGenerate".to_string(),
            "--genomeDir".to_string(),
            path_arg(&config.genome_index),
            "--genomeFastaFiles".to_string(),
            path_arg(&config.genome_fasta),
            "--runThreadN".to_string(),
            config.threads.to_string(),
        ];
        ToolInvocation::new(STAR_TAG, args_vec).produces(vec![index_marker(config)])
    }

    /// Sorted BAM lands at `config.aligner_output()`.
    pub fn arg_generator(config: &RunConfig, reads: &[PathBuf]) -> ToolInvocation {
        let mut prefix = path_arg(&config.work_dir);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let mut args_vec = vec![
            "--genomeDir".to_string(),
            path_arg(&config.genome_index),
            "--runThreadN".to_string(),
            config.threads.to_string(),
            "--readFilesCommand".to_string(),
            "zcat".to_string(),
            "--outSAMtype".to_string(),
            "BAM".to_string(),
            "SortedByCoordinate".to_string(),
            "--outFileNamePrefix".to_string(),
            prefix,
            "--readFilesIn".to_string(),
        ];
        args_vec.extend(reads.iter().map(|p| path_arg(p)));
        ToolInvocation::new(STAR_TAG, args_vec).produces(vec![config.aligner_output()])
    }
}

pub mod hisat2 {
    use std::path::PathBuf;
    use crate::config::defs::{RunConfig, HISAT2_BUILD_TAG, HISAT2_RAW_SAM, HISAT2_TAG};
    use super::{path_arg, ToolInvocation};

    /// Index files are written under the index directory with this basename.
    pub const INDEX_BASENAME: &str = "genome";

    /// First file of a small (32-bit) index. Genomes over 4 Gbp get `.ht2l`
    /// files, which this pipeline does not build.
    pub fn index_marker(config: &RunConfig) -> PathBuf {
        config.genome_index.join(format!("{}.1.ht2", INDEX_BASENAME))
    }

    pub fn index_generator(config: &RunConfig) -> ToolInvocation {
        let args_vec = vec![
            "-p".to_string(),
            config.threads.to_string(),
            path_arg(&config.genome_fasta),
            path_arg(&config.genome_index.join(INDEX_BASENAME)),
        ];
        ToolInvocation::new(HISAT2_BUILD_TAG, args_vec).produces(vec![index_marker(config)])
    }

    pub fn raw_sam(config: &RunConfig) -> PathBuf {
        config.work_dir.join(HISAT2_RAW_SAM)
    }

    pub fn arg_generator(config: &RunConfig, reads: &[PathBuf]) -> ToolInvocation {
        let mut args_vec = vec![
            "-p".to_string(),
            config.threads.to_string(),
            "-x".to_string(),
            path_arg(&config.genome_index.join(INDEX_BASENAME)),
        ];
        match reads {
            [r1, r2] => {
                args_vec.extend(["-1".to_string(), path_arg(r1), "-2".to_string(), path_arg(r2)]);
            }
            _ => {
                args_vec.push("-U".to_string());
                args_vec.push(reads.iter().map(|p| path_arg(p)).collect::<Vec<_>>().join(","));
            }
        }
        args_vec.push("-S".to_string());
        args_vec.push(path_arg(&raw_sam(config)));
        ToolInvocation::new(HISAT2_TAG, args_vec).produces(vec![raw_sam(config)])
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::SAMTOOLS_TAG;
    use super::{path_arg, ToolInvocation};
    use crate::utils::file::bam_index_path;

    /// Keeps reads with mapping quality >= `mapq`, BAM written to `out`.
    pub fn mapq_filter(input: &Path, out: &Path, mapq: u32) -> ToolInvocation {
        let args_vec = vec![
            "view".to_string(),
            "-bq".to_string(),
            mapq.to_string(),
            path_arg(input),
        ];
        ToolInvocation::new(SAMTOOLS_TAG, args_vec)
            .stdout_to(out.to_path_buf())
            .produces(vec![out.to_path_buf()])
    }

    pub fn index(bam: &Path) -> ToolInvocation {
        ToolInvocation::new(SAMTOOLS_TAG, vec!["index".to_string(), path_arg(bam)])
            .produces(vec![bam_index_path(bam)])
    }

    pub fn sort(input: &Path, out: &Path, threads: usize) -> ToolInvocation {
        let args_vec = vec![
            "sort".to_string(),
            "-@".to_string(),
            threads.to_string(),
            "-o".to_string(),
            path_arg(out),
            path_arg(input),
        ];
        ToolInvocation::new(SAMTOOLS_TAG, args_vec).produces(vec![out.to_path_buf()])
    }
}

pub mod htseq {
    use std::path::Path;
    use crate::config::defs::{RunConfig, HTSEQ_COUNT_TAG};
    use super::{path_arg, ToolInvocation};

    pub fn arg_generator(config: &RunConfig, bam: &Path, gtf: &Path, out: &Path) -> ToolInvocation {
        let stranded = if config.stranded { "yes" } else { "no" };
        let args_vec = vec![
            "--format=bam".to_string(),
            format!("--stranded={}", stranded),
            path_arg(bam),
            path_arg(gtf),
        ];
        ToolInvocation::new(HTSEQ_COUNT_TAG, args_vec)
            .stdout_to(out.to_path_buf())
            .produces(vec![out.to_path_buf()])
    }
}

pub mod rscript {
    use std::path::{Path, PathBuf};
    use crate::config::defs::{RunConfig, RSCRIPT_TAG};
    use super::{path_arg, ToolInvocation};

    /// `Rscript --vanilla <script> <table> <selector> <geneset_gtf> <contrast> [levels]`
    pub fn arg_generator(
        config: &RunConfig,
        script: &Path,
        table: &Path,
        selector: &str,
        geneset_gtf: &Path,
    ) -> ToolInvocation {
        let mut args_vec = vec![
            "--vanilla".to_string(),
            path_arg(script),
            path_arg(table),
            selector.to_string(),
            path_arg(geneset_gtf),
            config.contrast.clone(),
        ];
        if let Some((a, b)) = &config.contrast_levels {
            args_vec.push(a.clone());
            args_vec.push(b.clone());
        }
        ToolInvocation::new(RSCRIPT_TAG, args_vec)
    }

    pub fn with_outputs(invocation: ToolInvocation, summary: Option<PathBuf>, produces: Vec<PathBuf>) -> ToolInvocation {
        let invocation = invocation.produces(produces);
        match summary {
            Some(path) => invocation.stdout_to(path),
            None => invocation,
        }
    }
}

pub mod cufflinks {
    use std::path::{Path, PathBuf};
    use crate::config::defs::{
        RunConfig, CUFFDIFF_TAG, CUFFLINKS_OUTPUTS, CUFFLINKS_TAG, CUFFMERGE_OUTPUT, CUFFMERGE_TAG,
        CUFFNORM_TAG, CUFFQUANT_OUTPUT, CUFFQUANT_TAG,
    };
    use super::{path_arg, ToolInvocation};

    /// Default-named outputs cufflinks leaves in `out_dir`.
    pub fn default_outputs(out_dir: &Path) -> Vec<PathBuf> {
        CUFFLINKS_OUTPUTS.iter().map(|n| out_dir.join(n)).collect()
    }

    pub fn arg_generator(config: &RunConfig, bam: &Path) -> ToolInvocation {
        let out_dir = config.cufflinks_out_dir();
        let mut args_vec = vec!["-p".to_string(), config.threads.to_string()];
        args_vec.extend(config.cufflinks.extra.iter().cloned());
        if let Some(gtf) = &config.cufflinks.geneset_guide {
            args_vec.push("-g".to_string());
            args_vec.push(path_arg(gtf));
        }
        if config.cufflinks.out_dir.is_none() {
            args_vec.push("-o".to_string());
            args_vec.push(path_arg(&out_dir));
        }
        args_vec.push(path_arg(bam));
        ToolInvocation::new(CUFFLINKS_TAG, args_vec).produces(default_outputs(&out_dir))
    }

    pub fn merge_generator(config: &RunConfig, manifest: &Path) -> ToolInvocation {
        let out_dir = config.cufflinks_out_dir();
        let mut args_vec = vec![
            "-s".to_string(),
            path_arg(&config.genome_fasta),
            "-p".to_string(),
            config.threads.to_string(),
            "-o".to_string(),
            path_arg(&out_dir),
        ];
        if let Some(guide) = config.cufflinks.merge_guide() {
            args_vec.push("-g".to_string());
            args_vec.push(path_arg(guide));
        }
        args_vec.push(path_arg(manifest));
        ToolInvocation::new(CUFFMERGE_TAG, args_vec).produces(vec![out_dir.join(CUFFMERGE_OUTPUT)])
    }

    /// `-u -b <genome> -p N [--library-type T]`, shared by cuffquant and cuffdiff.
    fn basic_options(config: &RunConfig) -> Vec<String> {
        let mut args_vec = vec![
            "-u".to_string(),
            "-b".to_string(),
            path_arg(&config.genome_fasta),
        ];
        args_vec.extend(thread_options(config));
        args_vec
    }

    fn thread_options(config: &RunConfig) -> Vec<String> {
        let mut args_vec = vec!["-p".to_string(), config.threads.to_string()];
        if let Some(library_type) = &config.cufflinks.library_type {
            args_vec.push("--library-type".to_string());
            args_vec.push(library_type.clone());
        }
        args_vec
    }

    pub fn quant_generator(config: &RunConfig, merged: &Path, bam: &Path) -> ToolInvocation {
        let out_dir = config.cufflinks_out_dir();
        let mut args_vec = basic_options(config);
        args_vec.extend(["-o".to_string(), path_arg(&out_dir), path_arg(merged), path_arg(bam)]);
        ToolInvocation::new(CUFFQUANT_TAG, args_vec).produces(vec![out_dir.join(CUFFQUANT_OUTPUT)])
    }

    fn comparison_args(mut args_vec: Vec<String>, out_dir: &Path, labels: &[String], merged: &Path, replicates: &[Vec<PathBuf>]) -> Vec<String> {
        args_vec.extend([
            "-o".to_string(),
            path_arg(out_dir),
            "-L".to_string(),
            labels.join(","),
            path_arg(merged),
        ]);
        args_vec.extend(replicates.iter().map(|group| {
            group.iter().map(|p| path_arg(p)).collect::<Vec<_>>().join(",")
        }));
        args_vec
    }

    pub fn diff_generator(config: &RunConfig, out_dir: &Path, labels: &[String], merged: &Path, replicates: &[Vec<PathBuf>], result: PathBuf) -> ToolInvocation {
        let args_vec = comparison_args(basic_options(config), out_dir, labels, merged, replicates);
        ToolInvocation::new(CUFFDIFF_TAG, args_vec).produces(vec![result])
    }

    pub fn norm_generator(config: &RunConfig, out_dir: &Path, labels: &[String], merged: &Path, replicates: &[Vec<PathBuf>], result: PathBuf) -> ToolInvocation {
        let args_vec = comparison_args(thread_options(config), out_dir, labels, merged, replicates);
        ToolInvocation::new(CUFFNORM_TAG, args_vec).produces(vec![result])
    }
}

/// Tools the configured branch will call.
pub fn required_tools(config: &RunConfig) -> Vec<&'static str> {
    let mut tools = vec![TRIM_GALORE_TAG, SAMTOOLS_TAG];
    match config.aligner {
        Aligner::Star => tools.push(STAR_TAG),
        Aligner::Hisat2 => tools.extend([HISAT2_TAG, HISAT2_BUILD_TAG]),
    }
    match config.analysis {
        AnalysisType::DESeq => tools.extend([HTSEQ_COUNT_TAG, RSCRIPT_TAG]),
        AnalysisType::Cufflinks => {
            tools.extend([CUFFLINKS_TAG, CUFFMERGE_TAG, CUFFQUANT_TAG, CUFFDIFF_TAG]);
            if config.run_cuffnorm {
                tools.push(CUFFNORM_TAG);
            }
        }
    }
    tools
}

/// Checks that `tool` can be spawned.
pub async fn presence_check(tool: &str) -> Result<(), PipelineError> {
    Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|_| ())
        .map_err(|e| {
            let package = TOOL_PACKAGES.get(tool).copied().unwrap_or(tool);
            PipelineError::ToolExecution {
                tool: tool.to_string(),
                error: format!("Failed to spawn: {}. Is {} ({}) installed?", e, tool, package),
            }
        })
}

pub async fn check_tools(config: &RunConfig) -> Result<(), PipelineError> {
    for tool in required_tools(config) {
        presence_check(tool).await?;
        debug!("{} found", tool);
    }
    Ok(())
}
