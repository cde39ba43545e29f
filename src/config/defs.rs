use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::Arguments;
use crate::utils::file::expand_home;

// External software
pub const TRIM_GALORE_TAG: &str = "trim_galore";
pub const STAR_TAG: &str = "STAR";
pub const HISAT2_TAG: &str = "hisat2";
pub const HISAT2_BUILD_TAG: &str = "hisat2-build";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const HTSEQ_COUNT_TAG: &str = "htseq-count";
pub const RSCRIPT_TAG: &str = "Rscript";
pub const CUFFLINKS_TAG: &str = "cufflinks";
pub const CUFFMERGE_TAG: &str = "cuffmerge";
pub const CUFFQUANT_TAG: &str = "cuffquant";
pub const CUFFDIFF_TAG: &str = "cuffdiff";
pub const CUFFNORM_TAG: &str = "cuffnorm";

/// Environment variable holding the path of the DESeq2 R script when
/// `--analysis-script` is not given.
pub const ANALYSIS_SCRIPT_ENV: &str = "RNAseq_analysis";

lazy_static! {
    pub static ref TOOL_PACKAGES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(TRIM_GALORE_TAG, "trim-galore");
        m.insert(STAR_TAG, "star");
        m.insert(HISAT2_TAG, "hisat2");
        m.insert(HISAT2_BUILD_TAG, "hisat2");
        m.insert(SAMTOOLS_TAG, "samtools");
        m.insert(HTSEQ_COUNT_TAG, "htseq");
        m.insert(RSCRIPT_TAG, "r-base");
        m.insert(CUFFLINKS_TAG, "cufflinks");
        m.insert(CUFFMERGE_TAG, "cufflinks");
        m.insert(CUFFQUANT_TAG, "cufflinks");
        m.insert(CUFFDIFF_TAG, "cufflinks");
        m.insert(CUFFNORM_TAG, "cufflinks");

        m
    };
}

// Static Filenames
pub const DEFAULT_TRIM_DIR: &str = "trim_galore";
pub const ALIGNER_SORTED_BAM: &str = "Aligned.sortedByCoord.out.bam";
pub const HISAT2_RAW_SAM: &str = "Aligned.out.sam";
pub const ASSEMBLY_MANIFEST: &str = "assembly_GTF_list.txt";
pub const CUFFLINKS_OUTPUTS: [&str; 4] = [
    "genes.fpkm_tracking",
    "isoforms.fpkm_tracking",
    "skipped.gtf",
    "transcripts.gtf",
];
pub const CUFFLINKS_TRANSCRIPTS: &str = "transcripts.gtf";
pub const CUFFMERGE_OUTPUT: &str = "merged.gtf";
pub const CUFFQUANT_OUTPUT: &str = "abundances.cxb";
pub const CUFFDIFF_DIR: &str = "cuffdiff";
pub const CUFFDIFF_RESULT: &str = "gene_exp.diff";
pub const CUFFNORM_DIR: &str = "cuffnorm";
pub const CUFFNORM_RESULT: &str = "genes.fpkm_table";

// File name suffixes
pub const COMPRESSED_EXT: &str = "gz";
pub const SE_TRIMMED_SUFFIX: &str = "_trimmed.fq.gz";
pub const PE_TRIMMED_SUFFIXES: [&str; 2] = ["_val_1.fq.gz", "_val_2.fq.gz"];
pub const COUNT_TABLE_SUFFIX: &str = "_count_table.txt";
pub const BAM_INDEX_EXT: &str = ".bai";
pub const DESEQ_TABLE_SUFFIX: &str = "_DESeq_table.txt";
pub const DESEQ_SCLUST_SUFFIX: &str = "_sclust.pdf";
pub const DESEQ_TPM_SUFFIX: &str = "_tpm.txt";
pub const DESEQ_SUMMARY_SUFFIX: &str = "_DESeq_summary.txt";
pub const DESEQ_RESULTS_SUFFIX: &str = "_DESeq_results.txt";
pub const CUFFMERGE_SUFFIX: &str = "_cuffmerge.gtf";

// Static Parameters
pub const NA_VALUE: &str = "NA";
pub const DESEQ_TABLE_FIXED_HEADER: [&str; 2] = ["samplename", "filename"];
pub const SAMPLE_SHEET_MIN_COLUMNS: usize = 4;
pub const CONDITION_COLUMN: usize = 3;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File naming mismatch: {0}")]
    NamingMismatch(String),

    #[error("Sample sheet error: {0}")]
    SampleSheet(String),

    #[error("Tool {tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("I/O error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

/// Downstream analysis branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisType {
    DESeq,
    Cufflinks,
}

impl FromStr for AnalysisType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DESeq" | "DESeq2" => Ok(AnalysisType::DESeq),
            "Cufflinks" => Ok(AnalysisType::Cufflinks),
            other => Err(PipelineError::InvalidConfig(format!(
                "Expecting analysis type to be either DESeq or Cufflinks, got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aligner {
    Star,
    Hisat2,
}

impl Aligner {
    pub fn tag(&self) -> &'static str {
        match self {
            Aligner::Star => STAR_TAG,
            Aligner::Hisat2 => HISAT2_TAG,
        }
    }
}

impl FromStr for Aligner {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STAR" | "star" => Ok(Aligner::Star),
            "hisat2" | "HISAT2" => Ok(Aligner::Hisat2),
            "tophat2" => Err(PipelineError::InvalidConfig(
                "tophat2 is no longer supported; use STAR or hisat2".to_string(),
            )),
            other => Err(PipelineError::InvalidConfig(format!(
                "Unknown aligner '{}'. Options: STAR, hisat2",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    SingleEnd,
    PairedEnd,
}

/// Logical tag of a file produced by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Indexed,
    Trimmed,
    Aligned,
    Filtered,
    Quantified,
    Assembled,
    Merged,
    Differential,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Indexed => "indexed",
            Stage::Trimmed => "trimmed",
            Stage::Aligned => "aligned",
            Stage::Filtered => "filtered",
            Stage::Quantified => "quantified",
            Stage::Assembled => "assembled",
            Stage::Merged => "merged",
            Stage::Differential => "differential",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct TrimOptions {
    pub extra: Vec<String>,
    pub out_dir: PathBuf,
    /// True when `out_dir` was taken from `-o`/`--output_dir` inside `extra`.
    pub out_dir_in_extra: bool,
    pub fastqc: bool,
    pub fastqc_args: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CufflinksOptions {
    pub extra: Vec<String>,
    pub out_dir: Option<PathBuf>,
    pub library_type: Option<String>,
    /// Guide annotation given with `-g`/`--GTF-guide` inside `extra`.
    pub guide_in_options: Option<PathBuf>,
    /// Geneset annotation passed as guide because of `--cuff-gtf`.
    pub geneset_guide: Option<PathBuf>,
}

impl CufflinksOptions {
    pub fn parse(raw: Option<&str>) -> Self {
        let extra: Vec<String> = raw
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        let value_after = |flags: &[&str]| -> Option<String> {
            extra
                .iter()
                .position(|a| flags.contains(&a.as_str()))
                .and_then(|i| extra.get(i + 1).cloned())
        };

        let out_dir = value_after(&["-o", "--output-dir"]).map(PathBuf::from);
        let library_type = value_after(&["--library-type"]);
        let guide_in_options = value_after(&["-g", "--GTF-guide"]).map(PathBuf::from);

        CufflinksOptions {
            extra,
            out_dir,
            library_type,
            guide_in_options,
            geneset_guide: None,
        }
    }

    /// Guide annotation handed to cuffmerge, if any.
    pub fn merge_guide(&self) -> Option<&Path> {
        self.guide_in_options
            .as_deref()
            .or(self.geneset_guide.as_deref())
    }
}

/// Name of the log file written with `--log`.
pub fn log_file_name(run_id: &str) -> String {
    format!("rnapip-out-{}.log", run_id)
}

/// Fully resolved run configuration. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: String,
    pub work_dir: PathBuf,
    pub samples_csv: PathBuf,
    pub genome_fasta: PathBuf,
    pub analysis: AnalysisType,
    pub layout: Layout,
    pub pair_tags: (String, String),
    pub genome_gtf: Option<PathBuf>,
    pub geneset_gtf: Option<PathBuf>,
    pub trim: TrimOptions,
    pub aligner: Aligner,
    pub genome_index: PathBuf,
    pub mapq: u32,
    pub stranded: bool,
    pub contrast: String,
    pub contrast_levels: Option<(String, String)>,
    pub cufflinks: CufflinksOptions,
    pub run_cuffnorm: bool,
    pub analysis_script: Option<PathBuf>,
    pub threads: usize,
}

impl RunConfig {
    /// Validates the parsed command line and resolves every option the stages need.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments.
    /// * `work_dir` - Directory receiving tool default outputs.
    /// * `run_id` - Identifier of this run.
    /// * `threads` - CPU count handed to the external tools.
    ///
    /// # Returns
    /// RunConfig or PipelineError::InvalidConfig
    pub fn from_args(
        args: &Arguments,
        work_dir: &Path,
        run_id: String,
        threads: usize,
    ) -> Result<Self, PipelineError> {
        let analysis: AnalysisType = args.analysis_type.parse()?;
        let aligner: Aligner = args.aligner.parse()?;

        let genome_gtf = args.genome_gtf.as_deref().map(expand_home);
        if analysis == AnalysisType::DESeq && genome_gtf.is_none() {
            return Err(PipelineError::InvalidConfig(
                "Expecting file with gene annotations in gtf/gff format. Please provide it with --genome-gtf".to_string(),
            ));
        }
        let geneset_gtf = args
            .geneset_gtf
            .as_deref()
            .map(expand_home)
            .or_else(|| genome_gtf.clone());

        let pair_tags = match args.pair_tags.as_slice() {
            [a, b] if !a.is_empty() && !b.is_empty() && a != b => (a.clone(), b.clone()),
            _ => {
                return Err(PipelineError::InvalidConfig(format!(
                    "Expecting two distinct, non-empty paired read tags, got {:?}",
                    args.pair_tags
                )));
            }
        };

        let contrast_levels = match &args.contrast_levels {
            None => None,
            Some(levels) => match levels.as_slice() {
                [a, b] => Some((a.clone(), b.clone())),
                _ => {
                    return Err(PipelineError::InvalidConfig(
                        "--contrast-levels takes exactly two values".to_string(),
                    ));
                }
            },
        };

        let trim = resolve_trim_options(args, work_dir);

        let mut cufflinks = CufflinksOptions::parse(args.cuff_opt.as_deref());
        if analysis == AnalysisType::Cufflinks && args.cuff_gtf {
            if cufflinks.guide_in_options.is_some() {
                return Err(PipelineError::InvalidConfig(
                    "--cuff-gtf should not be specified if -g has already been set in --cuff-opt".to_string(),
                ));
            }
            match &geneset_gtf {
                Some(gtf) => cufflinks.geneset_guide = Some(gtf.clone()),
                None => {
                    return Err(PipelineError::InvalidConfig(
                        "--cuff-gtf needs --geneset-gtf or --genome-gtf".to_string(),
                    ));
                }
            }
        }

        let analysis_script = args
            .analysis_script
            .clone()
            .or_else(|| std::env::var(ANALYSIS_SCRIPT_ENV).ok())
            .map(|s| expand_home(&s));
        if analysis == AnalysisType::DESeq && analysis_script.is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "DESeq analysis needs the R script path: use --analysis-script or set {}",
                ANALYSIS_SCRIPT_ENV
            )));
        }

        let genome_index = match &args.genome_index {
            Some(index) => expand_home(index),
            None => work_dir.join(format!("{}_index", aligner.tag())),
        };

        Ok(RunConfig {
            run_id,
            work_dir: work_dir.to_path_buf(),
            samples_csv: expand_home(&args.samples_csv),
            genome_fasta: expand_home(&args.genome_fasta),
            analysis,
            layout: if args.single_end { Layout::SingleEnd } else { Layout::PairedEnd },
            pair_tags,
            genome_gtf,
            geneset_gtf,
            trim,
            aligner,
            genome_index,
            mapq: args.mapq,
            stranded: args.stranded,
            contrast: args.contrast.clone(),
            contrast_levels,
            cufflinks,
            run_cuffnorm: args.cuffnorm,
            analysis_script,
            threads: threads.max(1),
        })
    }

    /// Folder receiving cufflinks-family outputs.
    pub fn cufflinks_out_dir(&self) -> PathBuf {
        self.cufflinks
            .out_dir
            .clone()
            .unwrap_or_else(|| self.work_dir.clone())
    }

    pub fn log_file_name(&self) -> String {
        log_file_name(&self.run_id)
    }

    /// Fixed-name BAM the aligner leaves in the working directory.
    pub fn aligner_output(&self) -> PathBuf {
        self.work_dir.join(ALIGNER_SORTED_BAM)
    }
}

fn resolve_trim_options(args: &Arguments, work_dir: &Path) -> TrimOptions {
    let extra: Vec<String> = args
        .trim_galore
        .as_deref()
        .map(|s| s.split_whitespace().map(String::from).collect())
        .unwrap_or_default();

    let from_extra = extra
        .iter()
        .position(|a| a == "-o" || a == "--output_dir")
        .and_then(|i| extra.get(i + 1))
        .map(|d| expand_home(d));

    let (out_dir, out_dir_in_extra) = match from_extra {
        Some(dir) => (dir, true),
        None => (work_dir.join(DEFAULT_TRIM_DIR), false),
    };

    TrimOptions {
        extra,
        out_dir,
        out_dir_in_extra,
        fastqc: !args.skip_fastqc,
        fastqc_args: if args.skip_fastqc { None } else { args.fastqc_args.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> Arguments {
        let mut argv = vec!["rnapip", "samples.tsv", "genome.fa"];
        argv.extend_from_slice(extra);
        Arguments::parse_from(argv)
    }

    #[test]
    fn test_deseq_requires_genome_gtf() {
        let a = args(&["--analysis-script", "deseq.R"]);
        let err = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_analysis_type_rejected() {
        let a = args(&["--analysis-type", "edgeR", "--genome-gtf", "g.gtf"]);
        let err = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap_err();
        assert!(err.to_string().contains("edgeR"));
    }

    #[test]
    fn test_geneset_defaults_to_genome_gtf() {
        let a = args(&["--genome-gtf", "g.gtf", "--analysis-script", "deseq.R"]);
        let config = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap();
        assert_eq!(config.analysis, AnalysisType::DESeq);
        assert_eq!(config.geneset_gtf, Some(PathBuf::from("g.gtf")));
        assert_eq!(config.layout, Layout::PairedEnd);
        assert_eq!(config.pair_tags, ("r_1".to_string(), "r_2".to_string()));
        assert_eq!(config.mapq, 20);
        assert_eq!(config.genome_index, PathBuf::from("/work/STAR_index"));
        assert_eq!(config.trim.out_dir, PathBuf::from("/work/trim_galore"));
        assert!(config.trim.fastqc);
    }

    #[test]
    fn test_trim_output_dir_taken_from_options() {
        let a = args(&[
            "--genome-gtf", "g.gtf",
            "--analysis-script", "deseq.R",
            "--trim-galore", "--quality 25 -o /data/trimmed",
            "--skip-fastqc",
            "--fastqc-args", "--nogroup",
        ]);
        let config = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap();
        assert_eq!(config.trim.out_dir, PathBuf::from("/data/trimmed"));
        assert!(config.trim.out_dir_in_extra);
        assert!(!config.trim.fastqc);
        assert_eq!(config.trim.fastqc_args, None);
    }

    #[test]
    fn test_cufflinks_guide_conflict() {
        let a = args(&[
            "--analysis-type", "Cufflinks",
            "--genome-gtf", "g.gtf",
            "--cuff-opt", "-g other.gtf --library-type fr-firststrand",
            "--cuff-gtf",
        ]);
        let err = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_cufflinks_options_parsed() {
        let a = args(&[
            "--analysis-type", "Cufflinks",
            "--cuff-opt", "-o /data/cuff --library-type fr-firststrand -g guide.gtf",
        ]);
        let config = RunConfig::from_args(&a, Path::new("/work"), "id".into(), 4).unwrap();
        assert_eq!(config.cufflinks_out_dir(), PathBuf::from("/data/cuff"));
        assert_eq!(config.cufflinks.library_type.as_deref(), Some("fr-firststrand"));
        assert_eq!(config.cufflinks.merge_guide(), Some(Path::new("guide.gtf")));
    }

    #[test]
    fn test_run_id_names_log_file() {
        let a = args(&["--genome-gtf", "g.gtf", "--analysis-script", "deseq.R"]);
        let config = RunConfig::from_args(&a, Path::new("/work"), "3fa9".into(), 4).unwrap();
        assert_eq!(config.run_id, "3fa9");
        assert_eq!(config.log_file_name(), "rnapip-out-3fa9.log");
    }

    #[test]
    fn test_aligner_choices() {
        assert_eq!("STAR".parse::<Aligner>().unwrap(), Aligner::Star);
        assert_eq!("hisat2".parse::<Aligner>().unwrap(), Aligner::Hisat2);
        assert!("tophat2".parse::<Aligner>().is_err());
        assert!("bwa".parse::<Aligner>().is_err());
    }
}
