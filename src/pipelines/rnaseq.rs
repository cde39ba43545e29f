use std::path::PathBuf;

use log::info;

use crate::config::defs::{AnalysisType, PipelineError};
use crate::pipelines::common::{self, RunContext};
use crate::pipelines::cufflinks::{self, CufflinksOutputs};
use crate::pipelines::deseq::{self, DeseqOutputs};
use crate::utils::artifacts::ArtifactStore;
use crate::utils::command::ToolRunner;
use crate::utils::layout;
use crate::utils::samples::SampleSheet;

#[derive(Debug, Clone, PartialEq)]
pub enum BranchOutputs {
    DESeq(DeseqOutputs),
    Cufflinks(CufflinksOutputs),
}

/// Artifacts of a complete run, each list in sample sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutputs {
    pub trimmed: Vec<PathBuf>,
    pub bams: Vec<PathBuf>,
    pub branch: BranchOutputs,
}

/// Checks sheet-dependent options before any tool is launched.
fn validate_sheet(analysis: AnalysisType, contrast: &str, sheet: &SampleSheet) -> Result<(), PipelineError> {
    match analysis {
        AnalysisType::DESeq => {
            if !sheet.covariate_names().iter().any(|c| c == contrast) {
                return Err(PipelineError::InvalidConfig(format!(
                    "Contrast column '{}' not found in sample sheet columns {:?}",
                    contrast,
                    sheet.covariate_names()
                )));
            }
            Ok(())
        }
        AnalysisType::Cufflinks => Ok(()),
    }
}

/// Runs the whole pipeline: trim, align (+ mapq filter), then the selected
/// analysis branch. Every stage receives the full, ordered output of the
/// previous one.
///
/// # Arguments
///
/// * `ctx` - Run context holding the resolved configuration, tool runner and artifact store.
///
/// # Returns
/// PipelineOutputs
pub async fn run<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
) -> Result<PipelineOutputs, PipelineError> {
    let config = &ctx.config;

    info!("Starting run {}", config.run_id);
    let sheet = SampleSheet::from_path(&config.samples_csv)?;
    validate_sheet(config.analysis, &config.contrast, &sheet)?;
    match config.analysis {
        AnalysisType::DESeq => info!("Differential gene expression analysis using DESeq2..."),
        AnalysisType::Cufflinks => info!("Analysis of transcript expression using Cufflinks..."),
    }
    info!("{} samples in {}", sheet.records.len(), config.samples_csv.display());

    let plan = layout::plan(&sheet.records, config.layout, &config.pair_tags)?;
    let trimmed = common::trim(ctx, &plan).await?;
    let aligned = common::align(ctx, &trimmed).await?;

    let branch = match config.analysis {
        AnalysisType::DESeq => BranchOutputs::DESeq(deseq::run(ctx, &sheet, &aligned).await?),
        AnalysisType::Cufflinks => BranchOutputs::Cufflinks(cufflinks::run(ctx, &sheet, &aligned).await?),
    };

    Ok(PipelineOutputs {
        trimmed: trimmed.into_iter().map(|t| t.trimmed).collect(),
        bams: aligned.into_iter().map(|a| a.bam).collect(),
        branch,
    })
}
