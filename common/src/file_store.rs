//! Read-only access to the per-student JSON files written by the collection scripts.

use super::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const ANALYSIS_DIR: &str = "analysis";
const GRADES_DIR: &str = "grades";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed data in {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Locates analysis and grades files under a data directory by naming convention.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn analysis_path(&self, stuno: &str) -> PathBuf {
        self.root
            .join(ANALYSIS_DIR)
            .join(format!("analysis_{stuno}.json"))
    }

    pub fn grades_path(&self, stuno: &str) -> PathBuf {
        self.root
            .join(GRADES_DIR)
            .join(format!("grades_{stuno}.json"))
    }

    /// Load every analysed course for a student, in file order.
    /// Returns `Ok(None)` if the student has no analysis file.
    pub async fn load_analysis(&self, stuno: &str) -> Result<Option<Vec<CourseRecord>>, StoreError> {
        let path = self.analysis_path(stuno);
        let Some(entries) = read_json_array(&path).await? else {
            return Ok(None);
        };
        log::debug!("Loaded {} course records from {}", entries.len(), path.display());
        Ok(Some(entries.into_iter().map(CourseRecord).collect()))
    }

    /// Load the per-semester ranks for a student.
    /// Returns `Ok(None)` if the student has no grades file.
    pub async fn load_ranks(&self, stuno: &str) -> Result<Option<Vec<SemesterRank>>, StoreError> {
        let path = self.grades_path(stuno);
        let Some(entries) = read_json_array(&path).await? else {
            return Ok(None);
        };
        Ok(Some(entries.iter().map(SemesterRank::from_entry).collect()))
    }
}

/// Read a file holding a top-level JSON array. A missing file is not an error.
async fn read_json_array(path: &Path) -> Result<Option<Vec<Value>>, StoreError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| StoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, sub: &str, name: &str, contents: &str) {
        let folder = dir.path().join(sub);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join(name), contents).unwrap();
    }

    #[test_log::test(tokio::test)]
    async fn test_load_analysis_in_file_order() {
        let dir = TempDir::new().unwrap();
        let body = json!([
            { "KOR_SBJT_NM": "A", "myData": { "totalScore": 91.0 } },
            { "KOR_SBJT_NM": "B", "myData": { "totalScore": 85.5 } },
            { "KOR_SBJT_NM": "C", "myData": { "totalScore": 77.2 } }
        ]);
        write(&dir, "analysis", "analysis_12345678.json", &body.to_string());

        let store = FileStore::new(dir.path());
        let records = store.load_analysis("12345678").await.unwrap().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].course_name(), json!("A"));
        assert_eq!(records[2].total_score(), json!(77.2));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_files_are_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.load_analysis("1").await.unwrap().is_none());
        assert!(store.load_ranks("1").await.unwrap().is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_json_is_distinct_from_missing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "analysis", "analysis_7.json", "[{\"KOR_SBJT_NM\": ");
        write(&dir, "grades", "grades_7.json", "{\"YY\": \"2024\"}");

        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.load_analysis("7").await,
            Err(StoreError::Malformed { .. })
        ));
        // valid JSON, but not an array
        assert!(matches!(
            store.load_ranks("7").await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_load_ranks_projects_entries() {
        let dir = TempDir::new().unwrap();
        let body = json!([
            { "YY": "2023", "SHTM_CD": "10", "SUST_RANK": 4, "AVG": 4.3 },
            { "YY": "2023", "SHTM_CD": "20", "SUST_RANK": null }
        ]);
        write(&dir, "grades", "grades_42.json", &body.to_string());

        let ranks = FileStore::new(dir.path())
            .load_ranks("42")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&ranks).unwrap(),
            json!([
                { "YY": "2023", "SHTM_CD": "10", "SUST_RANK": 4 },
                { "YY": "2023", "SHTM_CD": "20", "SUST_RANK": null }
            ])
        );
    }

    #[test]
    fn test_paths_follow_naming_convention() {
        let store = FileStore::new("/srv/grades");
        assert_eq!(
            store.analysis_path("2024001"),
            PathBuf::from("/srv/grades/analysis/analysis_2024001.json")
        );
        assert_eq!(
            store.grades_path("2024001"),
            PathBuf::from("/srv/grades/grades/grades_2024001.json")
        );
    }
}
