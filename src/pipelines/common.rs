use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::config::defs::{Aligner, Layout, PipelineError, RunConfig, Stage};
use crate::utils::artifacts::ArtifactStore;
use crate::utils::command::{hisat2, samtools, star, ToolRunner};
use crate::utils::file::{aligned_path, move_file, Lane};
use crate::utils::layout::PlannedRead;

/// Everything a stage needs: the resolved configuration, the process
/// launcher and the artifact gate.
pub struct RunContext<R: ToolRunner, S: ArtifactStore> {
    pub config: Arc<RunConfig>,
    pub runner: R,
    pub store: S,
}

impl<R: ToolRunner, S: ArtifactStore> RunContext<R, S> {
    pub fn new(config: Arc<RunConfig>, runner: R, store: S) -> Self {
        RunContext { config, runner, store }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedRead {
    pub planned: PlannedRead,
    pub trimmed: PathBuf,
}

/// Final BAM of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSample {
    pub sample_index: usize,
    pub bam: PathBuf,
}

/// Trims every planned read whose trimmed file is missing with a single
/// trim_galore call. In paired mode both mates go in when either is missing.
///
/// # Arguments
///
/// * `ctx` - Run context.
/// * `plan` - Planned reads in sample sheet order.
///
/// # Returns
/// Trimmed file for every planned read, in plan order.
pub async fn trim<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    plan: &[PlannedRead],
) -> Result<Vec<TrimmedRead>, PipelineError> {
    let config = &ctx.config;
    match config.layout {
        Layout::SingleEnd => info!("User specified input data to be single-end... Running single-end mode..."),
        Layout::PairedEnd => info!(
            "User specified input data to be paired-end... Running paired-end mode with tags {} and {}...",
            config.pair_tags.0, config.pair_tags.1
        ),
    }
    if !config.trim.fastqc {
        info!("Skipping fastqc step...");
    }

    let trimmed = plan
        .iter()
        .map(|p| {
            Ok(TrimmedRead {
                planned: p.clone(),
                trimmed: p.trimmed(&config.trim.out_dir, config.layout, &config.pair_tags)?,
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let pending_samples: BTreeSet<usize> = trimmed
        .iter()
        .filter(|t| ctx.store.should_run(&t.trimmed))
        .map(|t| t.planned.sample_index)
        .collect();

    let pending: Vec<&TrimmedRead> = trimmed
        .iter()
        .filter(|t| pending_samples.contains(&t.planned.sample_index))
        .collect();

    if !pending.is_empty() {
        if !config.trim.out_dir_in_extra {
            fs::create_dir_all(&config.trim.out_dir)?;
        }
        let inputs: Vec<PathBuf> = pending.iter().map(|t| t.planned.source.clone()).collect();
        let outputs: Vec<PathBuf> = pending.iter().map(|t| t.trimmed.clone()).collect();
        let invocation = crate::utils::command::trim_galore::arg_generator(config, &inputs, outputs.clone());
        ctx.runner.run(&invocation).await?;
        for out in &outputs {
            ctx.store.record(out, Stage::Trimmed);
        }
    }

    Ok(trimmed)
}

/// File whose presence marks a finished index for the configured aligner.
pub fn genome_index_marker(config: &RunConfig) -> PathBuf {
    match config.aligner {
        Aligner::Star => star::index_marker(config),
        Aligner::Hisat2 => hisat2::index_marker(config),
    }
}

/// Builds the aligner genome index unless a finished one is present. An
/// index directory without its marker file is rebuilt in place.
pub async fn ensure_genome_index<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
) -> Result<(), PipelineError> {
    let config = &ctx.config;
    let marker = genome_index_marker(config);
    if !ctx.store.should_run(&marker) {
        return Ok(());
    }
    info!(
        "{} indices not found. Generating {} indices in {}...",
        config.aligner.tag(),
        config.aligner.tag(),
        config.genome_index.display()
    );
    fs::create_dir_all(&config.genome_index)?;
    let invocation = match config.aligner {
        Aligner::Star => star::index_generator(config),
        Aligner::Hisat2 => hisat2::index_generator(config),
    };
    ctx.runner.run(&invocation).await?;
    ctx.store.record(&marker, Stage::Indexed);
    Ok(())
}

/// Runs the aligner on `reads`, leaving the sorted BAM at `config.aligner_output()`.
async fn run_aligner<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    reads: &[PathBuf],
) -> Result<(), PipelineError> {
    let config = &ctx.config;
    match config.aligner {
        Aligner::Star => ctx.runner.run(&star::arg_generator(config, reads)).await,
        Aligner::Hisat2 => {
            ctx.runner.run(&hisat2::arg_generator(config, reads)).await?;
            let sam = hisat2::raw_sam(config);
            ctx.runner
                .run(&samtools::sort(&sam, &config.aligner_output(), config.threads))
                .await?;
            fs::remove_file(&sam)?;
            Ok(())
        }
    }
}

/// Moves the aligner's fixed output to its canonical name. With a positive
/// threshold the reads are filtered into the target and the raw file removed;
/// with 0 the raw file is renamed and no filter runs.
pub async fn filter_mapq<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    raw: &Path,
    target: &Path,
    mapq: u32,
) -> Result<(), PipelineError> {
    if mapq > 0 {
        ctx.runner.run(&samtools::mapq_filter(raw, target, mapq)).await?;
        fs::remove_file(raw)?;
        ctx.store.record(target, Stage::Filtered);
    } else {
        move_file(raw, target)?;
        ctx.store.record(target, Stage::Aligned);
    }
    Ok(())
}

/// Aligns each sample (or pair) whose final BAM is missing.
///
/// # Arguments
///
/// * `ctx` - Run context.
/// * `trimmed` - Output of `trim`, in plan order.
///
/// # Returns
/// One final BAM per sample, in sample sheet order.
pub async fn align<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    trimmed: &[TrimmedRead],
) -> Result<Vec<AlignedSample>, PipelineError> {
    let config = &ctx.config;

    let units: Vec<(&TrimmedRead, Vec<PathBuf>)> = match config.layout {
        Layout::SingleEnd => trimmed.iter().map(|t| (t, vec![t.trimmed.clone()])).collect(),
        Layout::PairedEnd => {
            let r1: Vec<&TrimmedRead> = trimmed.iter().filter(|t| t.planned.lane == Some(Lane::First)).collect();
            let r2: Vec<&TrimmedRead> = trimmed.iter().filter(|t| t.planned.lane == Some(Lane::Second)).collect();
            if r1.len() != r2.len() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Number of fq files differs for read1 ({}) and read2 ({})",
                    r1.len(),
                    r2.len()
                )));
            }
            r1.into_iter()
                .zip(r2)
                .map(|(a, b)| (a, vec![a.trimmed.clone(), b.trimmed.clone()]))
                .collect()
        }
    };

    let bams: Vec<AlignedSample> = units
        .iter()
        .map(|(first, _)| AlignedSample {
            sample_index: first.planned.sample_index,
            bam: aligned_path(&first.planned.directory, &first.trimmed, config.layout, config.mapq),
        })
        .collect();

    let pending: Vec<usize> = bams
        .iter()
        .enumerate()
        .filter(|(_, a)| ctx.store.should_run(&a.bam))
        .map(|(i, _)| i)
        .collect();

    if pending.is_empty() {
        return Ok(bams);
    }

    ensure_genome_index(ctx).await?;
    info!("Aligning reads using {}...", config.aligner.tag());
    let raw = config.aligner_output();
    for i in pending {
        run_aligner(ctx, &units[i].1).await?;
        filter_mapq(ctx, &raw, &bams[i].bam, config.mapq).await?;
    }

    Ok(bams)
}
