//! A library with the storage, caching and collection plumbing behind the gradeview dashboard.

pub mod cache;
pub mod collector;
pub mod file_store;
pub mod pipeline;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Longest student identifier accepted anywhere in the system.
pub const MAX_STUNO_LEN: usize = 32;

/// A student identifier that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid student identifier {0:?}")]
pub struct InvalidStudentId(pub String);

/// Check that a student identifier is safe to use as a cache key and inside a file name.
pub fn validate_stuno(stuno: &str) -> Result<&str, InvalidStudentId> {
    if stuno.is_empty()
        || stuno.len() > MAX_STUNO_LEN
        || !stuno.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(InvalidStudentId(stuno.to_string()));
    }
    Ok(stuno)
}

/// One analysed course offering for a student.
///
/// The record is kept exactly as the analysis script wrote it. Only the fields
/// needed for summaries are read, and anything missing reads as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseRecord(pub Value);

impl CourseRecord {
    fn field(&self, key: &str) -> Value {
        self.0.get(key).cloned().unwrap_or(Value::Null)
    }

    pub fn course_name(&self) -> Value {
        self.field("KOR_SBJT_NM")
    }

    pub fn instructor(&self) -> Value {
        self.field("STF_NM")
    }

    pub fn division(&self) -> Value {
        self.field("CPTN_DIV_NM")
    }

    pub fn year(&self) -> Value {
        self.field("YY")
    }

    pub fn semester_code(&self) -> Value {
        self.field("SHTM_CD")
    }

    pub fn rank(&self) -> Value {
        self.field("rank")
    }

    pub fn total_students(&self) -> Value {
        self.field("totalStudents")
    }

    /// The student's own computed total, `myData.totalScore`.
    pub fn total_score(&self) -> Value {
        self.0
            .pointer("/myData/totalScore")
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Project the record down to the fields shown in the course list.
    pub fn summarize(&self, id: usize) -> CourseSummary {
        CourseSummary {
            id,
            course_name: self.course_name(),
            instructor: self.instructor(),
            division: self.division(),
            yy: self.year(),
            shtm_cd: self.semester_code(),
            my_score: self.total_score(),
            my_rank: self.rank(),
            total_students: self.total_students(),
        }
    }
}

/// The list view of a course. `id` is the record's position in the analysis file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: usize,
    pub course_name: Value,
    pub instructor: Value,
    pub division: Value,
    pub yy: Value,
    pub shtm_cd: Value,
    pub my_score: Value,
    pub my_rank: Value,
    pub total_students: Value,
}

/// Summarize every record, tagging each with its positional index.
pub fn summarize_courses(records: &[CourseRecord]) -> Vec<CourseSummary> {
    records
        .iter()
        .enumerate()
        .map(|(id, record)| record.summarize(id))
        .collect()
}

/// A student's overall rank for one semester.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemesterRank {
    #[serde(rename = "YY")]
    pub year: Value,
    #[serde(rename = "SHTM_CD")]
    pub semester_code: Value,
    #[serde(rename = "SUST_RANK")]
    pub rank: Value,
}

impl SemesterRank {
    /// Pick the rank fields out of one raw grades entry.
    pub fn from_entry(entry: &Value) -> Self {
        let pick = |key: &str| entry.get(key).cloned().unwrap_or(Value::Null);
        Self {
            year: pick("YY"),
            semester_code: pick("SHTM_CD"),
            rank: pick("SUST_RANK"),
        }
    }
}

/// The result of a collection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectOutcome {
    pub cached: bool,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> CourseRecord {
        CourseRecord(json!({
            "KOR_SBJT_NM": "자료구조",
            "STF_NM": "김교수",
            "CPTN_DIV_NM": "전공필수",
            "YY": "2024",
            "SHTM_CD": "10",
            "LECT_NO": "0001",
            "rank": 3,
            "totalStudents": 42,
            "percentile": 7.1,
            "myData": {
                "totalScore": 91.0,
                "grade": "A+",
                "scores": { "attendance": 10, "midterm": 28, "final": 33 }
            },
            "gradeDistribution": [{ "grade": "A+", "count": 4, "percentage": 9.5 }]
        }))
    }

    #[test]
    fn test_validate_stuno() {
        assert_eq!(validate_stuno("12345678"), Ok("12345678"));
        assert_eq!(validate_stuno("A2024b"), Ok("A2024b"));
        assert!(validate_stuno("").is_err());
        assert!(validate_stuno("../etc").is_err());
        assert!(validate_stuno("123 456").is_err());
        assert!(validate_stuno(&"9".repeat(MAX_STUNO_LEN + 1)).is_err());
        assert!(validate_stuno(&"9".repeat(MAX_STUNO_LEN)).is_ok());
    }

    #[test]
    fn test_summarize_record() {
        let summary = sample_record().summarize(5);
        assert_eq!(summary.id, 5);
        assert_eq!(summary.course_name, json!("자료구조"));
        assert_eq!(summary.instructor, json!("김교수"));
        assert_eq!(summary.division, json!("전공필수"));
        assert_eq!(summary.yy, json!("2024"));
        assert_eq!(summary.shtm_cd, json!("10"));
        assert_eq!(summary.my_score, json!(91.0));
        assert_eq!(summary.my_rank, json!(3));
        assert_eq!(summary.total_students, json!(42));
    }

    #[test]
    fn test_summary_wire_names() {
        let value = serde_json::to_value(sample_record().summarize(0)).unwrap();
        for key in [
            "id",
            "courseName",
            "instructor",
            "division",
            "yy",
            "shtmCd",
            "myScore",
            "myRank",
            "totalStudents",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        // detail-only fields stay out of the list view
        for key in ["percentile", "myData", "gradeDistribution"] {
            assert!(value.get(key).is_none(), "unexpected {key}");
        }
    }

    #[test]
    fn test_summarize_sparse_record() {
        let summary = CourseRecord(json!({ "KOR_SBJT_NM": "미적분학" })).summarize(0);
        assert_eq!(summary.course_name, json!("미적분학"));
        assert_eq!(summary.my_score, Value::Null);
        assert_eq!(summary.instructor, Value::Null);

        // not even an object; passes through as all-null
        let summary = CourseRecord(json!(17)).summarize(1);
        assert_eq!(summary.course_name, Value::Null);
    }

    #[test]
    fn test_summarize_courses_keeps_order() {
        let records: Vec<CourseRecord> = [91.0, 85.5, 77.2]
            .iter()
            .map(|score| CourseRecord(json!({ "myData": { "totalScore": score } })))
            .collect();
        let summaries = summarize_courses(&records);
        assert_eq!(summaries.len(), 3);
        for (i, summary) in summaries.iter().enumerate() {
            assert_eq!(summary.id, i);
        }
        assert_eq!(summaries[1].my_score, json!(85.5));
    }

    #[test]
    fn test_semester_rank_projection() {
        let entry = json!({ "YY": "2023", "SHTM_CD": "20", "SUST_RANK": 12, "GPA": 4.1 });
        let rank = SemesterRank::from_entry(&entry);
        assert_eq!(
            serde_json::to_value(&rank).unwrap(),
            json!({ "YY": "2023", "SHTM_CD": "20", "SUST_RANK": 12 })
        );

        let rank = SemesterRank::from_entry(&json!({ "YY": "2022" }));
        assert_eq!(rank.rank, Value::Null);
    }

    #[test]
    fn test_record_serializes_verbatim() {
        let record = sample_record();
        assert_eq!(serde_json::to_value(&record).unwrap(), record.0);
    }
}
