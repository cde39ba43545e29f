use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defs::{PipelineError, CONDITION_COLUMN, NA_VALUE, SAMPLE_SHEET_MIN_COLUMNS};
use crate::utils::file::expand_home;

/// One row of the sample sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub name: String,
    pub read1: PathBuf,
    pub read2: Option<PathBuf>,
    pub condition: String,
    /// Every column from the condition onwards, in sheet order.
    pub covariates: Vec<String>,
}

/// Parsed sample sheet. Row order is the sample identity.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    pub header: Vec<String>,
    pub records: Vec<SampleRecord>,
}

impl SampleSheet {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::SampleSheet(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Parses tab-separated text with a header row.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let header: Vec<String> = match lines.next() {
            Some((_, line)) => line.split('\t').map(|s| s.trim().to_string()).collect(),
            None => return Err(PipelineError::SampleSheet("Sample sheet is empty".to_string())),
        };
        if header.len() < SAMPLE_SHEET_MIN_COLUMNS {
            return Err(PipelineError::SampleSheet(format!(
                "Expected at least {} columns (sample, read1, read2, condition), found {}",
                SAMPLE_SHEET_MIN_COLUMNS,
                header.len()
            )));
        }

        let mut records = Vec::new();
        for (idx, line) in lines {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            if fields.len() != header.len() {
                return Err(PipelineError::SampleSheet(format!(
                    "Line {} has {} columns, header has {}",
                    idx + 1,
                    fields.len(),
                    header.len()
                )));
            }
            let read2 = match fields[2] {
                NA_VALUE | "" => None,
                r2 => Some(expand_home(r2)),
            };
            records.push(SampleRecord {
                name: fields[0].to_string(),
                read1: expand_home(fields[1]),
                read2,
                condition: fields[CONDITION_COLUMN].to_string(),
                covariates: fields[CONDITION_COLUMN..].iter().map(|s| s.to_string()).collect(),
            });
        }

        if records.is_empty() {
            return Err(PipelineError::SampleSheet("Sample sheet has no samples".to_string()));
        }
        Ok(SampleSheet { header, records })
    }

    /// Column names from the condition onwards.
    pub fn covariate_names(&self) -> &[String] {
        &self.header[CONDITION_COLUMN..]
    }

    pub fn conditions(&self) -> Vec<String> {
        self.records.iter().map(|r| r.condition.clone()).collect()
    }
}

/// Splits `items` into replicate groups. A new group starts exactly where the
/// condition differs from the previous row; nothing is sorted, so the sheet
/// must already list replicates next to each other.
pub fn group_by_condition<T: Clone>(
    items: &[T],
    conditions: &[String],
) -> Result<Vec<Vec<T>>, PipelineError> {
    if items.len() != conditions.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "{} artifacts but {} condition values",
            items.len(),
            conditions.len()
        )));
    }

    let mut groups: Vec<Vec<T>> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if i == 0 || conditions[i] != conditions[i - 1] {
            groups.push(Vec::new());
        }
        if let Some(group) = groups.last_mut() {
            group.push(item.clone());
        }
    }
    Ok(groups)
}

/// Condition label of each replicate group, in group order.
pub fn group_labels(conditions: &[String]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for (i, c) in conditions.iter().enumerate() {
        if i == 0 || *c != conditions[i - 1] {
            labels.push(c.clone());
        }
    }
    labels
}


#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "sample\tread1\tread2\tcondition\tbatch\n\
        wt1\t/d/wt1_r_1.fq.gz\t/d/wt1_r_2.fq.gz\tWT\tb1\n\
        mut1\t/d/mut1_r_1.fq.gz\tNA\tMut\tb2\n";

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_sheet() {
        let sheet = SampleSheet::parse(SHEET).unwrap();
        assert_eq!(sheet.records.len(), 2);
        assert_eq!(sheet.covariate_names(), &strings(&["condition", "batch"])[..]);
        assert_eq!(sheet.records[0].read2, Some(PathBuf::from("/d/wt1_r_2.fq.gz")));
        assert_eq!(sheet.records[1].read2, None);
        assert_eq!(sheet.records[1].covariates, strings(&["Mut", "b2"]));
        assert_eq!(sheet.conditions(), strings(&["WT", "Mut"]));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = SampleSheet::parse("a\tb\tc\td\nx\ty\tz\n").unwrap_err();
        assert!(matches!(err, PipelineError::SampleSheet(_)));
        assert!(SampleSheet::parse("a\tb\tc\n").is_err());
        assert!(SampleSheet::parse("a\tb\tc\td\n").is_err());
    }

    #[test]
    fn test_grouping_keeps_non_adjacent_recurrence_apart() {
        let conditions = strings(&["A", "A", "B", "B", "B", "A"]);
        let idx: Vec<usize> = (0..6).collect();
        let groups = group_by_condition(&idx, &conditions).unwrap();
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3, 4], vec![5]]);
        assert_eq!(group_labels(&conditions), strings(&["A", "B", "A"]));
    }

    #[test]
    fn test_grouping_edge_cases() {
        let empty: Vec<usize> = Vec::new();
        assert!(group_by_condition(&empty, &[]).unwrap().is_empty());
        assert_eq!(group_by_condition(&[7], &strings(&["X"])).unwrap(), vec![vec![7]]);
        assert!(group_by_condition(&[1, 2], &strings(&["X"])).is_err());
    }
}
