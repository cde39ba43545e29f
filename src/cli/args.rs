use clap::Parser;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "rnapip",
    version,
    about = "Process FASTQ files through trimming, alignment and RNA-seq differential expression analysis."
)]
pub struct Arguments {
    #[arg(
        value_name = "SAMPLES_CSV",
        help = "Tab-separated sample sheet: sample name, read1 path, read2 path (NA for single-end), condition, then any covariates."
    )]
    pub samples_csv: String,

    #[arg(value_name = "GENOME_FASTA", help = "Genome sequence FASTA used by the aligner and cufflinks tools.")]
    pub genome_fasta: String,

    #[arg(long = "analysis-type", default_value = "DESeq", help = "DESeq or Cufflinks")]
    pub analysis_type: String,

    #[arg(long = "genome-gtf", help = "Gene annotations (gtf/gff) for htseq-count. Required for DESeq.")]
    pub genome_gtf: Option<String>,

    #[arg(long = "geneset-gtf", help = "Gene annotations used to compute TPMs. Defaults to --genome-gtf.")]
    pub geneset_gtf: Option<String>,

    #[arg(long = "trim-galore", allow_hyphen_values = true, help = "Quoted options passed to trim_galore.")]
    pub trim_galore: Option<String>,

    #[arg(long = "fastqc-args", allow_hyphen_values = true, help = "Quoted options passed to fastqc through trim_galore.")]
    pub fastqc_args: Option<String>,

    #[arg(long = "skip-fastqc", default_value_t = false, help = "Skip fastqc; --fastqc-args is then ignored.")]
    pub skip_fastqc: bool,

    #[arg(long = "aligner", default_value = "STAR", help = "STAR or hisat2")]
    pub aligner: String,

    #[arg(long = "genome-index", alias = "star-index", help = "Directory holding the aligner genome index. Built when absent.")]
    pub genome_index: Option<String>,

    #[arg(long, default_value_t = 20, help = "Reads below this mapping quality are removed; 0 disables filtering.")]
    pub mapq: u32,

    #[arg(short = 'q', long = "quiet", action)]
    pub quiet: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "log", action, help = "Write the log to rnapip-out-<run id>.log instead of stderr.")]
    pub log: bool,

    #[arg(long, help = "CPU cores handed to the external tools. Defaults to all physical cores.")]
    pub cpu: Option<usize>,

    #[arg(
        long = "pe",
        num_args = 2,
        value_names = ["TAG1", "TAG2"],
        default_values = ["r_1", "r_2"],
        help = "Substrings that tell read1 and read2 FASTQ file names apart."
    )]
    pub pair_tags: Vec<String>,

    #[arg(long = "se", action, help = "Input reads are single-end.")]
    pub single_end: bool,

    #[arg(long, action, help = "Strand-specific library protocol.")]
    pub stranded: bool,

    #[arg(long, default_value = "condition", help = "Sample sheet column used as contrast by DESeq2.")]
    pub contrast: String,

    #[arg(long = "contrast-levels", num_args = 2, value_names = ["LEVEL_A", "LEVEL_B"])]
    pub contrast_levels: Option<Vec<String>>,

    #[arg(long = "cuff-opt", allow_hyphen_values = true, help = "Quoted options passed to cufflinks.")]
    pub cuff_opt: Option<String>,

    #[arg(long = "cuff-gtf", action, help = "Use --geneset-gtf as cufflinks/cuffmerge guide annotation.")]
    pub cuff_gtf: bool,

    #[arg(long = "cuffnorm", action, help = "Also run cuffnorm after cuffdiff.")]
    pub cuffnorm: bool,

    #[arg(long = "analysis-script", help = "DESeq2 R script. Defaults to $RNAseq_analysis.")]
    pub analysis_script: Option<String>,

    #[arg(short = 'o', long = "out", help = "Working directory for tool default outputs. Defaults to the current directory.")]
    pub work_dir: Option<String>,

    #[arg(long = "skip-tool-check", action)]
    pub skip_tool_check: bool,
}
