//! SGPA / CGPA calculation over published final marks.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{round2, FinalMarkRecord, FinalMarkStatus};

/// Whether an average had anything to average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpaStatus {
    Ok,
    InsufficientData,
}

/// Semester grade-point average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgpaResult {
    pub student_id: String,
    pub semester: u8,
    pub sgpa: f64,
    pub total_credits: f64,
    pub subject_count: usize,
    pub status: GpaStatus,
}

/// Cumulative grade-point average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CgpaResult {
    pub student_id: String,
    pub cgpa: f64,
    /// SGPA per semester, including semesters that did not count.
    pub semesters: Vec<SgpaResult>,
    pub status: GpaStatus,
}

/// Credit-weighted SGPA over the student's published records for `semester`.
///
/// `credits` maps subject assignment id to credit weight; records whose
/// subject has no credit entry are skipped.
pub fn compute_sgpa(
    student_id: &str,
    semester: u8,
    records: &[FinalMarkRecord],
    credits: &HashMap<String, f64>,
) -> SgpaResult {
    let mut weighted = 0.0;
    let mut total_credits = 0.0;
    let mut subject_count = 0;

    for record in records.iter().filter(|r| {
        r.student_id == student_id
            && r.semester == semester
            && r.status == FinalMarkStatus::Published
    }) {
        let Some(&credit) = credits.get(&record.subject_assignment_id) else {
            tracing::warn!(
                subject = %record.subject_assignment_id,
                "no credit weight for subject, skipping"
            );
            continue;
        };
        weighted += record.grade_point * credit;
        total_credits += credit;
        subject_count += 1;
    }

    if total_credits <= 0.0 {
        return SgpaResult {
            student_id: student_id.to_string(),
            semester,
            sgpa: 0.0,
            total_credits: 0.0,
            subject_count: 0,
            status: GpaStatus::InsufficientData,
        };
    }

    SgpaResult {
        student_id: student_id.to_string(),
        semester,
        sgpa: round2(weighted / total_credits),
        total_credits,
        subject_count,
        status: GpaStatus::Ok,
    }
}

/// Mean of the non-zero SGPAs across every semester the student has records in.
pub fn compute_cgpa(
    student_id: &str,
    records: &[FinalMarkRecord],
    credits: &HashMap<String, f64>,
) -> CgpaResult {
    let semesters: BTreeSet<u8> = records
        .iter()
        .filter(|r| r.student_id == student_id)
        .map(|r| r.semester)
        .collect();

    let sgpas: Vec<SgpaResult> = semesters
        .iter()
        .map(|&sem| compute_sgpa(student_id, sem, records, credits))
        .collect();

    let counted: Vec<f64> = sgpas.iter().map(|s| s.sgpa).filter(|&s| s > 0.0).collect();
    let (cgpa, status) = if counted.is_empty() {
        (0.0, GpaStatus::InsufficientData)
    } else {
        (
            round2(counted.iter().sum::<f64>() / counted.len() as f64),
            GpaStatus::Ok,
        )
    };

    CgpaResult {
        student_id: student_id.to_string(),
        cgpa,
        semesters: sgpas,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PassStatus;

    fn record(subject: &str, semester: u8, gp: f64, status: FinalMarkStatus) -> FinalMarkRecord {
        FinalMarkRecord {
            student_id: "s1".into(),
            subject_assignment_id: subject.into(),
            semester,
            internal1: None,
            internal2: None,
            best_internal: 0.0,
            external: 0.0,
            total: 0.0,
            percentage: 0.0,
            grade: String::new(),
            grade_point: gp,
            result: PassStatus::Pass,
            status,
            published_at: None,
        }
    }

    fn credits() -> HashMap<String, f64> {
        [("a", 4.0), ("b", 3.0), ("c", 2.0), ("d", 4.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn sgpa_is_credit_weighted() {
        let records = vec![
            record("a", 1, 9.0, FinalMarkStatus::Published),
            record("b", 1, 7.0, FinalMarkStatus::Published),
            record("c", 1, 10.0, FinalMarkStatus::Published),
        ];
        let sgpa = compute_sgpa("s1", 1, &records, &credits());
        // (36 + 21 + 20) / 9
        assert_eq!(sgpa.sgpa, 8.56);
        assert_eq!(sgpa.total_credits, 9.0);
        assert_eq!(sgpa.status, GpaStatus::Ok);
    }

    #[test]
    fn drafts_are_ignored() {
        let records = vec![
            record("a", 1, 9.0, FinalMarkStatus::Published),
            record("b", 1, 4.0, FinalMarkStatus::Draft),
        ];
        assert_eq!(compute_sgpa("s1", 1, &records, &credits()).sgpa, 9.0);
    }

    #[test]
    fn empty_semester_is_insufficient() {
        let records = vec![record("a", 1, 9.0, FinalMarkStatus::Draft)];
        let sgpa = compute_sgpa("s1", 1, &records, &credits());
        assert_eq!(sgpa.sgpa, 0.0);
        assert_eq!(sgpa.status, GpaStatus::InsufficientData);
    }

    #[test]
    fn cgpa_averages_nonzero_semesters() {
        let records = vec![
            record("a", 1, 8.0, FinalMarkStatus::Published),
            record("b", 2, 9.0, FinalMarkStatus::Published),
            record("c", 3, 7.0, FinalMarkStatus::Draft),
        ];
        let cgpa = compute_cgpa("s1", &records, &credits());
        assert_eq!(cgpa.semesters.len(), 3);
        assert_eq!(cgpa.cgpa, 8.5);
        assert_eq!(cgpa.status, GpaStatus::Ok);
    }

    #[test]
    fn cgpa_without_published_records() {
        let cgpa = compute_cgpa("s1", &[], &credits());
        assert_eq!(cgpa.cgpa, 0.0);
        assert_eq!(cgpa.status, GpaStatus::InsufficientData);
    }
}
