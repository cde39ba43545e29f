use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::defs::{
    PipelineError, Stage, ASSEMBLY_MANIFEST, CUFFDIFF_DIR, CUFFDIFF_RESULT, CUFFLINKS_OUTPUTS,
    CUFFLINKS_TRANSCRIPTS, CUFFMERGE_OUTPUT, CUFFNORM_DIR, CUFFNORM_RESULT, CUFFQUANT_OUTPUT,
};
use crate::pipelines::common::{AlignedSample, RunContext};
use crate::utils::artifacts::ArtifactStore;
use crate::utils::command::{cufflinks, samtools, ToolInvocation, ToolRunner};
use crate::utils::file::{
    abundances_path, append_to_path, assembly_prefix, bam_index_path, fresh_dir,
    merged_annotation_path, move_file,
};
use crate::utils::samples::{group_by_condition, group_labels, SampleSheet};

#[derive(Debug, Clone, PartialEq)]
pub struct CufflinksOutputs {
    pub manifest: PathBuf,
    pub transcripts: Vec<PathBuf>,
    pub merged: PathBuf,
    pub abundances: Vec<PathBuf>,
    pub cuffdiff_dir: PathBuf,
    pub cuffnorm_dir: Option<PathBuf>,
}

/// Indexes and assembles every BAM, then rewrites the assemblies manifest
/// (one transcripts file per line) for cuffmerge.
///
/// # Returns
/// (manifest path, per-sample transcripts files in sample order)
pub async fn assemble<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    aligned: &[AlignedSample],
) -> Result<(PathBuf, Vec<PathBuf>), PipelineError> {
    let config = &ctx.config;
    let out_dir = config.cufflinks_out_dir();
    fs::create_dir_all(&out_dir)?;

    let manifest = out_dir.join(ASSEMBLY_MANIFEST);
    if manifest.exists() {
        fs::remove_file(&manifest)?;
    }
    if config.cufflinks.extra.is_empty() {
        warn!("No options were specified for Cufflinks. Developer's default options will be used...");
    }
    if config.cufflinks.out_dir.is_none() {
        info!("No output folder for cufflinks has been specified. Assemblies will be saved next to their BAM files...");
    }

    let mut transcripts = Vec::with_capacity(aligned.len());
    for sample in aligned {
        let bai = bam_index_path(&sample.bam);
        if ctx.store.should_run(&bai) {
            info!("Indexing file {}...", sample.bam.display());
            ctx.runner.run(&samtools::index(&sample.bam)).await?;
        }

        let prefix = assembly_prefix(&sample.bam, config.cufflinks.out_dir.as_deref());
        let sample_transcripts = append_to_path(&prefix, CUFFLINKS_TRANSCRIPTS);
        if ctx.store.should_run(&sample_transcripts) {
            ctx.runner.run(&cufflinks::arg_generator(config, &sample.bam)).await?;
            for name in CUFFLINKS_OUTPUTS {
                move_file(&out_dir.join(name), &append_to_path(&prefix, name))?;
            }
            ctx.store.record(&sample_transcripts, Stage::Assembled);
        }
        transcripts.push(sample_transcripts);
    }

    let mut listing = String::new();
    for t in &transcripts {
        listing.push_str(&t.to_string_lossy());
        listing.push('\n');
    }
    fs::write(&manifest, listing)?;

    Ok((manifest, transcripts))
}

/// Merges the assemblies listed in `manifest` into one annotation.
pub async fn merge<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    manifest: &Path,
) -> Result<PathBuf, PipelineError> {
    let config = &ctx.config;
    let out_dir = config.cufflinks_out_dir();
    let merged = merged_annotation_path(&out_dir, &config.samples_csv);

    if ctx.store.should_run(&merged) {
        ctx.runner.run(&cufflinks::merge_generator(config, manifest)).await?;
        move_file(&out_dir.join(CUFFMERGE_OUTPUT), &merged)?;
        ctx.store.record(&merged, Stage::Merged);
    }
    Ok(merged)
}

/// Runs cuffquant on every BAM against the merged annotation.
pub async fn quantify<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    merged: &Path,
    aligned: &[AlignedSample],
) -> Result<Vec<PathBuf>, PipelineError> {
    let config = &ctx.config;
    let out_dir = config.cufflinks_out_dir();

    let mut abundances = Vec::with_capacity(aligned.len());
    for sample in aligned {
        let cxb = abundances_path(&out_dir, &sample.bam);
        if ctx.store.should_run(&cxb) {
            ctx.runner
                .run(&cufflinks::quant_generator(config, merged, &sample.bam))
                .await?;
            move_file(&out_dir.join(CUFFQUANT_OUTPUT), &cxb)?;
            ctx.store.record(&cxb, Stage::Quantified);
        }
        abundances.push(cxb);
    }
    Ok(abundances)
}

/// Directory already holding `result`: `base` itself or one of the
/// `<base>_<hex>` siblings an earlier run created next to a stale `base`.
fn finished_comparison_dir<S: ArtifactStore>(store: &S, base: &Path, result: &str) -> Option<PathBuf> {
    if store.exists(&base.join(result)) {
        return Some(base.to_path_buf());
    }
    let parent = base.parent()?;
    let prefix = format!("{}_", base.file_name()?.to_string_lossy());
    let mut siblings: Vec<PathBuf> = fs::read_dir(parent)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with(&prefix))
        })
        .collect();
    siblings.sort();
    siblings.into_iter().find(|dir| store.exists(&dir.join(result)))
}

/// Runs one comparison tool unless a finished output directory exists. A
/// `base` left behind without `result` is kept and a fresh sibling is used.
async fn compare<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    base: PathBuf,
    result: &str,
    build: impl Fn(&Path, PathBuf) -> ToolInvocation,
) -> Result<PathBuf, PipelineError> {
    if let Some(done) = finished_comparison_dir(&ctx.store, &base, result) {
        info!(
            "{} already exists and will not be overwritten. Skipping this folder/file...",
            done.join(result).display()
        );
        return Ok(done);
    }
    let dir = if base.exists() { fresh_dir(&base) } else { base };
    info!("Output will be saved in {}", dir.display());
    fs::create_dir_all(&dir)?;
    let result_path = dir.join(result);
    ctx.runner.run(&build(&dir, result_path.clone())).await?;
    ctx.store.record(&result_path, Stage::Differential);
    Ok(dir)
}

/// Single cuffdiff call over all replicate groups.
pub async fn differential<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    sheet: &SampleSheet,
    merged: &Path,
    abundances: &[PathBuf],
) -> Result<PathBuf, PipelineError> {
    let config = &ctx.config;
    let conditions = sheet.conditions();
    let groups = group_by_condition(abundances, &conditions)?;
    let labels = group_labels(&conditions);

    compare(ctx, config.cufflinks_out_dir().join(CUFFDIFF_DIR), CUFFDIFF_RESULT, |dir, result| {
        cufflinks::diff_generator(config, dir, &labels, merged, &groups, result)
    })
    .await
}

/// cuffnorm over the same groups as cuffdiff.
pub async fn normalize<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    sheet: &SampleSheet,
    merged: &Path,
    abundances: &[PathBuf],
) -> Result<PathBuf, PipelineError> {
    let config = &ctx.config;
    let conditions = sheet.conditions();
    let groups = group_by_condition(abundances, &conditions)?;
    let labels = group_labels(&conditions);

    compare(ctx, config.cufflinks_out_dir().join(CUFFNORM_DIR), CUFFNORM_RESULT, |dir, result| {
        cufflinks::norm_generator(config, dir, &labels, merged, &groups, result)
    })
    .await
}

/// Assembly-based branch: cufflinks, cuffmerge, cuffquant, cuffdiff and,
/// when requested, cuffnorm.
pub async fn run<R: ToolRunner, S: ArtifactStore>(
    ctx: &RunContext<R, S>,
    sheet: &SampleSheet,
    aligned: &[AlignedSample],
) -> Result<CufflinksOutputs, PipelineError> {
    info!("Running Cufflinks...");
    let (manifest, transcripts) = assemble(ctx, aligned).await?;
    let merged = merge(ctx, &manifest).await?;
    let abundances = quantify(ctx, &merged, aligned).await?;
    let cuffdiff_dir = differential(ctx, sheet, &merged, &abundances).await?;
    let cuffnorm_dir = if ctx.config.run_cuffnorm {
        Some(normalize(ctx, sheet, &merged, &abundances).await?)
    } else {
        None
    };

    Ok(CufflinksOutputs {
        manifest,
        transcripts,
        merged,
        abundances,
        cuffdiff_dir,
        cuffnorm_dir,
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::artifacts::FsArtifactStore;

    #[test]
    fn test_finished_comparison_found_in_sibling() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join(CUFFDIFF_DIR);
        assert_eq!(finished_comparison_dir(&FsArtifactStore, &base, CUFFDIFF_RESULT), None);

        fs::create_dir_all(&base).unwrap();
        let stale_norm = tmp.path().join("cuffnorm_0000beef");
        fs::create_dir_all(&stale_norm).unwrap();
        fs::write(stale_norm.join(CUFFDIFF_RESULT), "").unwrap();
        assert_eq!(finished_comparison_dir(&FsArtifactStore, &base, CUFFDIFF_RESULT), None);

        let sibling = tmp.path().join("cuffdiff_0badf00d");
        fs::create_dir_all(&sibling).unwrap();
        fs::write(sibling.join(CUFFDIFF_RESULT), "").unwrap();
        assert_eq!(finished_comparison_dir(&FsArtifactStore, &base, CUFFDIFF_RESULT), Some(sibling));

        fs::write(base.join(CUFFDIFF_RESULT), "").unwrap();
        assert_eq!(finished_comparison_dir(&FsArtifactStore, &base, CUFFDIFF_RESULT), Some(base));
    }
}
