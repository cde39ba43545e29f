use std::path::{Path, PathBuf};

use crate::config::defs::{Layout, PipelineError};
use crate::utils::file::{pair_lane, read_stem, trimmed_path, Lane};
use crate::utils::samples::SampleRecord;

/// One read file scheduled for trimming.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRead {
    pub source: PathBuf,
    /// Directory that receives the sample's BAM: the read1 directory.
    pub directory: PathBuf,
    pub sample_index: usize,
    /// None in single-end mode.
    pub lane: Option<Lane>,
}

impl PlannedRead {
    pub fn trimmed(
        &self,
        trim_dir: &Path,
        layout: Layout,
        tags: &(String, String),
    ) -> Result<PathBuf, PipelineError> {
        trimmed_path(trim_dir, &self.source, layout, tags)
    }
}

/// Lays out every read file of the sheet in row order: one entry per row in
/// single-end mode, read1 then read2 per row in paired-end mode.
///
/// # Arguments
///
/// * `records` - Sample sheet rows.
/// * `layout` - Single or paired end.
/// * `tags` - Substrings distinguishing read1 from read2 file names.
///
/// # Returns
/// Ordered plan, or an error for any file the pair tags cannot route.
pub fn plan(
    records: &[SampleRecord],
    layout: Layout,
    tags: &(String, String),
) -> Result<Vec<PlannedRead>, PipelineError> {
    let mut planned = Vec::with_capacity(records.len() * 2);

    for (sample_index, record) in records.iter().enumerate() {
        let directory = record
            .read1
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match layout {
            Layout::SingleEnd => planned.push(PlannedRead {
                source: record.read1.clone(),
                directory,
                sample_index,
                lane: None,
            }),
            Layout::PairedEnd => {
                let read2 = record.read2.as_ref().ok_or_else(|| {
                    PipelineError::InvalidConfig(format!(
                        "Sample {} has no read2 file but paired-end mode was requested (use --se for single-end data)",
                        record.name
                    ))
                })?;
                let first = pair_lane(&read_stem(&record.read1), tags)?;
                let second = pair_lane(&read_stem(read2), tags)?;
                let ordered = match (first, second) {
                    (Lane::First, Lane::Second) => [(&record.read1, first), (read2, second)],
                    (Lane::Second, Lane::First) => [(read2, second), (&record.read1, first)],
                    _ => {
                        return Err(PipelineError::NamingMismatch(format!(
                            "Sample {} needs one {} file and one {} file: {} / {}",
                            record.name,
                            tags.0,
                            tags.1,
                            record.read1.display(),
                            read2.display()
                        )));
                    }
                };
                for (source, lane) in ordered {
                    planned.push(PlannedRead {
                        source: source.clone(),
                        directory: directory.clone(),
                        sample_index,
                        lane: Some(lane),
                    });
                }
            }
        }
    }

    Ok(planned)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::samples::SampleSheet;

    fn tags() -> (String, String) {
        ("r_1".to_string(), "r_2".to_string())
    }

    fn sheet(rows: &[(&str, &str, &str, &str)]) -> SampleSheet {
        let mut text = String::from("sample\tread1\tread2\tcondition\n");
        for (n, r1, r2, c) in rows {
            text.push_str(&format!("{}\t{}\t{}\t{}\n", n, r1, r2, c));
        }
        SampleSheet::parse(&text).unwrap()
    }

    #[test]
    fn test_paired_plan_has_two_entries_per_row() {
        let s = sheet(&[
            ("a", "/d1/a_r_1.fq.gz", "/d2/a_r_2.fq.gz", "WT"),
            ("b", "/d1/b_r_1.fastq", "/d1/b_r_2.fastq", "WT"),
            ("c", "/d3/c_r_1.fq.gz", "/d3/c_r_2.fq.gz", "KO"),
        ]);
        let t = tags();
        let p = plan(&s.records, Layout::PairedEnd, &t).unwrap();
        assert_eq!(p.len(), 6);
        for entry in &p {
            let name = entry.trimmed(Path::new("tg"), Layout::PairedEnd, &t).unwrap();
            let name = name.to_string_lossy().into_owned();
            assert!(name.contains(&t.0) ^ name.contains(&t.1), "{}", name);
        }
        assert_eq!(p[0].lane, Some(Lane::First));
        assert_eq!(p[1].lane, Some(Lane::Second));
        assert_eq!(p[1].directory, PathBuf::from("/d1"));
        assert_eq!(p[5].sample_index, 2);
    }

    #[test]
    fn test_single_plan_ignores_read2() {
        let s = sheet(&[("a", "/d/a.fq.gz", "NA", "WT"), ("b", "/d/b.fq.gz", "NA", "KO")]);
        let p = plan(&s.records, Layout::SingleEnd, &tags()).unwrap();
        assert_eq!(p.len(), 2);
        assert!(p.iter().all(|e| e.lane.is_none()));
        assert_eq!(p[1].source, PathBuf::from("/d/b.fq.gz"));
    }

    #[test]
    fn test_unroutable_name_aborts_planning() {
        let s = sheet(&[("a", "/d/a_R1.fq.gz", "/d/a_R2.fq.gz", "WT")]);
        let err = plan(&s.records, Layout::PairedEnd, &tags()).unwrap_err();
        assert!(matches!(err, PipelineError::NamingMismatch(_)));
    }

    #[test]
    fn test_row_needs_one_read_per_lane() {
        let s = sheet(&[
            ("a", "/d/a_r_1.fq.gz", "/d/a2_r_1.fq.gz", "WT"),
            ("b", "/d/b_r_2.fq.gz", "/d/b2_r_2.fq.gz", "KO"),
        ]);
        let err = plan(&s.records, Layout::PairedEnd, &tags()).unwrap_err();
        assert!(matches!(err, PipelineError::NamingMismatch(_)));

        let swapped = sheet(&[("a", "/d/a_r_2.fq.gz", "/d/a_r_1.fq.gz", "WT")]);
        let p = plan(&swapped.records, Layout::PairedEnd, &tags()).unwrap();
        assert_eq!(p[0].source, PathBuf::from("/d/a_r_1.fq.gz"));
        assert_eq!(p[0].lane, Some(Lane::First));
    }

    #[test]
    fn test_paired_mode_needs_read2() {
        let s = sheet(&[("a", "/d/a_r_1.fq.gz", "NA", "WT")]);
        assert!(plan(&s.records, Layout::PairedEnd, &tags()).is_err());
    }
}
