// src/utils/file.rs: canonical artifact names

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::defs::{
    Layout, PipelineError, BAM_INDEX_EXT, COMPRESSED_EXT, COUNT_TABLE_SUFFIX, CUFFMERGE_SUFFIX,
    CUFFQUANT_OUTPUT, PE_TRIMMED_SUFFIXES, SE_TRIMMED_SUFFIX,
};

/// Which read of a pair a file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    First,
    Second,
}

/// Expands a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    } else if path == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(path)
}

/// Appends `suffix` to the full path text, e.g. `a/b.bam` + `_x.txt` -> `a/b.bam_x.txt`.
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name of a read file without its format extension and at most one
/// compression suffix: `s_r_1.fastq.gz` -> `s_r_1`, `s.fq` -> `s`.
pub fn read_stem(path: &Path) -> String {
    let name = file_name_string(path);
    let mut parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return name;
    }
    let drop = if parts.last() == Some(&COMPRESSED_EXT) { 2 } else { 1 };
    parts.truncate(parts.len().saturating_sub(drop).max(1));
    parts.join(".")
}

/// Decides the lane of a read file from the configured pair tags.
/// A stem carrying neither tag, or both, cannot be routed.
pub fn pair_lane(stem: &str, tags: &(String, String)) -> Result<Lane, PipelineError> {
    match (stem.contains(&tags.0), stem.contains(&tags.1)) {
        (true, false) => Ok(Lane::First),
        (false, true) => Ok(Lane::Second),
        (false, false) => Err(PipelineError::NamingMismatch(format!(
            "Paired read tag ({} or {}) not found in {}",
            tags.0, tags.1, stem
        ))),
        (true, true) => Err(PipelineError::NamingMismatch(format!(
            "Both paired read tags ({} and {}) found in {}",
            tags.0, tags.1, stem
        ))),
    }
}

/// Name trim_galore gives to the trimmed version of `raw` inside `trim_dir`.
pub fn trimmed_path(
    trim_dir: &Path,
    raw: &Path,
    layout: Layout,
    tags: &(String, String),
) -> Result<PathBuf, PipelineError> {
    let stem = read_stem(raw);
    let suffix = match layout {
        Layout::SingleEnd => SE_TRIMMED_SUFFIX,
        Layout::PairedEnd => match pair_lane(&stem, tags)? {
            Lane::First => PE_TRIMMED_SUFFIXES[0],
            Lane::Second => PE_TRIMMED_SUFFIXES[1],
        },
    };
    Ok(trim_dir.join(format!("{}{}", stem, suffix)))
}

/// Final (optionally mapq-filtered) BAM for a sample, stored next to its raw reads.
pub fn aligned_path(read_dir: &Path, trimmed_r1: &Path, layout: Layout, mapq: u32) -> PathBuf {
    let pe = match layout {
        Layout::SingleEnd => "",
        Layout::PairedEnd => ".pe",
    };
    let tail = if mapq > 0 {
        format!("{}.sorted_fil_{}.out.bam", pe, mapq)
    } else {
        format!("{}.sorted.out.bam", pe)
    };
    read_dir.join(format!("{}{}", file_name_string(trimmed_r1), tail))
}

pub fn count_table_path(bam: &Path) -> PathBuf {
    append_to_path(bam, COUNT_TABLE_SUFFIX)
}

pub fn bam_index_path(bam: &Path) -> PathBuf {
    append_to_path(bam, BAM_INDEX_EXT)
}

/// Common prefix of the DESeq outputs: the sample sheet file name placed in
/// the directory of the first count table.
pub fn deseq_head(first_count_table: &Path, samples_csv: &Path) -> PathBuf {
    let dir = first_count_table.parent().unwrap_or_else(|| Path::new(""));
    dir.join(file_name_string(samples_csv))
}

/// Prefix of the renamed per-sample cufflinks outputs. Without an explicit
/// cufflinks output folder the files sit next to the BAM.
pub fn assembly_prefix(bam: &Path, out_folder: Option<&Path>) -> PathBuf {
    match out_folder {
        None => append_to_path(bam, "_"),
        Some(dir) => dir.join(format!("{}_", file_name_string(bam))),
    }
}

pub fn merged_annotation_path(out_folder: &Path, samples_csv: &Path) -> PathBuf {
    out_folder.join(format!("{}{}", file_name_string(samples_csv), CUFFMERGE_SUFFIX))
}

pub fn abundances_path(out_folder: &Path, bam: &Path) -> PathBuf {
    out_folder.join(format!("{}_{}", file_name_string(bam), CUFFQUANT_OUTPUT))
}

/// Returns `base` when it does not exist yet, otherwise a fresh sibling
/// `<base>_<hex>` so earlier results are never overwritten.
pub fn fresh_dir(base: &Path) -> PathBuf {
    let mut candidate = base.to_path_buf();
    while candidate.exists() {
        candidate = append_to_path(base, &format!("_{:08x}", rand::random::<u32>()));
    }
    candidate
}

/// Renames `from` to `to`, copying when they sit on different filesystems.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
