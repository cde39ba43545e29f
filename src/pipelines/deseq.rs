use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::defs::{
    PipelineError, Stage, DESEQ_RESULTS_SUFFIX, DESEQ_SCLUST_SUFFIX, DESEQ_SUMMARY_SUFFIX,
    DESEQ_TABLE_FIXED_HEADER, DESEQ_TABLE_SUFFIX, DESEQ_TPM_SUFFIX,
};
use crate::pipelines::common::{AlignedSample, RunContext};
use crate::utils::artifacts::ArtifactStore;
use crate::utils::command::{htseq, rscript, ToolRunner};
use crate::utils::file::{append_to_path, count_table_path, deseq_head};
use crate::utils::samples::SampleSheet;

/// Files of the count-based differential analysis, all sharing one prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct DeseqOutputs {
    pub count_tables: Vec<PathBuf>,
    pub table: PathBuf,
    pub sclust: PathBuf,
    pub tpm: PathBuf,
    pub summary: PathBuf,
    pub results: PathBuf,
}

impl DeseqOutputs {
    pub fn new(count_tables: Vec<PathBuf>, samples_csv: &Path) -> Result<Self, PipelineError> {
        let first = count_tables
            .first()
            .ok_or_else(|| PipelineError::InvalidConfig("No count tables to analyse".to_string()))?;
        let head = deseq_head(first, samples_csv);
        Ok(DeseqOutputs {
            table: append_to_path(&head, DESEQ_TABLE_SUFFIX),
            sclust: append_to_path(&head, DESEQ_SCLUST_SUFFIX),
            tpm: append_to_path(&head, DESEQ_TPM_SUFFIX),
            summary: append_to_path(&head, DESEQ_SUMMARY_SUFFIX),
            results: append_to_path(&head, DESEQ_RESULTS_SUFFIX),
            count_tables,
        })
    }
}

/// Step selector understood by the R script: `ea` (exploratory plots), `tpm`
/// and `deseq`, each present when its output is missing, joined by `_`.
/// None when every output exists.
pub fn step_selector<S: ArtifactStore>(store: &S, outputs: &DeseqOutputs) -> Option<String> {
    let steps: Vec<&str> = [
        ("ea", &outputs.sclust),
        ("tpm", &outputs.tpm),
        ("deseq", &outputs.results),
    ]
    .into_iter()
    .filter(|(_, path)| store.should_run(path))
    .map(|(flag, _)| flag)
    .collect();

    if steps.is_empty() { None } else { Some(steps.join("_")) }
}

/// Runs htseq-count on every BAM whose count table is missing.
pub async fn count_reads<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    aligned: &[AlignedSample],
) -> Result<Vec<PathBuf>, PipelineError> {
    let config = &ctx.config;
    let gtf = config.genome_gtf.as_deref().ok_or_else(|| {
        PipelineError::InvalidConfig("Counting reads needs --genome-gtf".to_string())
    })?;

    let mut tables = Vec::with_capacity(aligned.len());
    for sample in aligned {
        let table = count_table_path(&sample.bam);
        if ctx.store.should_run(&table) {
            ctx.runner
                .run(&htseq::arg_generator(config, &sample.bam, gtf, &table))
                .await?;
            ctx.store.record(&table, Stage::Quantified);
        }
        tables.push(table);
    }
    Ok(tables)
}

/// Text of the combined table handed to the R script:
/// `samplename filename <condition and covariate columns>`, one row per sample.
pub fn deseq_table(sheet: &SampleSheet, count_tables: &[PathBuf]) -> Result<String, PipelineError> {
    if sheet.records.len() != count_tables.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "{} samples but {} count tables",
            sheet.records.len(),
            count_tables.len()
        )));
    }

    let header: Vec<&str> = DESEQ_TABLE_FIXED_HEADER
        .iter()
        .copied()
        .chain(sheet.covariate_names().iter().map(String::as_str))
        .collect();

    let mut text = header.join("\t");
    text.push('\n');
    for (record, table) in sheet.records.iter().zip(count_tables) {
        let mut row = vec![record.name.clone(), table.to_string_lossy().into_owned()];
        row.extend(record.covariates.iter().cloned());
        text.push_str(&row.join("\t"));
        text.push('\n');
    }
    Ok(text)
}

/// Writes the combined table (once) and calls the R script for whichever of
/// its three steps still lack outputs.
pub async fn differential_expression<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    sheet: &SampleSheet,
    outputs: &DeseqOutputs,
) -> Result<(), PipelineError> {
    let config = &ctx.config;

    if ctx.store.should_run(&outputs.table) {
        fs::write(&outputs.table, deseq_table(sheet, &outputs.count_tables)?)?;
        ctx.store.record(&outputs.table, Stage::Quantified);
    }

    let Some(selector) = step_selector(&ctx.store, outputs) else {
        return Ok(());
    };

    let script = config.analysis_script.as_deref().ok_or_else(|| {
        PipelineError::InvalidConfig("DESeq analysis needs --analysis-script".to_string())
    })?;
    let geneset = config.geneset_gtf.as_deref().ok_or_else(|| {
        PipelineError::InvalidConfig("DESeq analysis needs --geneset-gtf or --genome-gtf".to_string())
    })?;

    let mut produces = Vec::new();
    let mut summary = None;
    for step in selector.split('_') {
        match step {
            "ea" => produces.push(outputs.sclust.clone()),
            "tpm" => produces.push(outputs.tpm.clone()),
            "deseq" => {
                produces.push(outputs.results.clone());
                summary = Some(outputs.summary.clone());
            }
            _ => {}
        }
    }

    info!("Running gene expression analysis steps: {}", selector);
    let invocation = rscript::arg_generator(config, script, &outputs.table, &selector, geneset);
    let invocation = rscript::with_outputs(invocation, summary, produces.clone());
    ctx.runner.run(&invocation).await?;
    for out in &produces {
        ctx.store.record(out, Stage::Differential);
    }
    Ok(())
}

/// Count-based branch: htseq-count per BAM, combined table, DESeq2.
pub async fn run<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    sheet: &SampleSheet,
    aligned: &[AlignedSample],
) -> Result<DeseqOutputs, PipelineError> {
    let tables = count_reads(ctx, aligned).await?;
    let outputs = DeseqOutputs::new(tables, &ctx.config.samples_csv)?;
    differential_expression(ctx, sheet, &outputs).await?;
    Ok(outputs)
}
