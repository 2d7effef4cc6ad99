//! Discovery of the raw files a table reads: a source directory (which may contain glob
//! components) searched recursively, filtered on the file name.

use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tpcdi_batch::file_utils;

use crate::{Error, Result};

/// Marker preceding the batch number in the path of a batch file.
const BATCH_MARKER: &str = "/Batch";

/// Wildcards never cross a path separator and match leading dots, like a path glob filter.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn has_glob(s: &str) -> bool {
    s.contains(['*', '?', '['])
}

/// Compile a file name glob (`*`, `?`, `[abc]`, `[!abc]`).
pub fn parse_glob(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|e| Error::InvalidGlob {
        pattern: pattern.to_owned(),
        reason: e.to_string(),
    })
}

/// Batch number following `/Batch` in `path`, if any.
pub fn batch_id_from_path(path: &str) -> Option<i32> {
    let start = path.find(BATCH_MARKER)? + BATCH_MARKER.len();
    let digits: String = path[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Selects the files of one table.
#[derive(Debug, Clone)]
pub struct FileFilter {
    base: PathBuf,
    dir_patterns: Vec<Pattern>,
    file_pattern: Pattern,
}

impl FileFilter {
    /// `source_dir` may use glob components (for example `/data/sf=10/Batch[23]`); files are
    /// searched recursively below the directories it matches.
    pub fn new(source_dir: &Path, filename_glob: &str) -> Result<Self> {
        let mut base = PathBuf::new();
        let mut dir_patterns = vec![];
        for component in source_dir.components() {
            let part = component.as_os_str().to_string_lossy();
            if dir_patterns.is_empty() && !has_glob(&part) {
                base.push(component);
            } else if matches!(component, Component::Normal(_)) {
                dir_patterns.push(parse_glob(&part)?);
            }
        }
        Ok(Self {
            base,
            dir_patterns,
            file_pattern: parse_glob(filename_glob)?,
        })
    }

    pub fn matches(&self, file: &Path) -> bool {
        let Ok(relative) = file.strip_prefix(&self.base) else {
            return false;
        };
        let Some(name) = relative.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        if !self.file_pattern.matches_with(&name, MATCH_OPTIONS) {
            return false;
        }

        let dirs: Vec<_> = relative
            .parent()
            .into_iter()
            .flat_map(|p| p.components())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        dirs.len() >= self.dir_patterns.len()
            && self
                .dir_patterns
                .iter()
                .zip(&dirs)
                .all(|(pattern, dir)| pattern.matches_with(dir, MATCH_OPTIONS))
    }

    /// Matching files, sorted by path.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        Ok(file_utils::list_files(&self.base)?
            .into_iter()
            .filter(|f| self.matches(f))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn globs() {
        let cases = [
            ("DailyMarket.txt", "DailyMarket.txt", true),
            ("DailyMarket.txt", "DailyMarketXtxt", false),
            ("Customer*.txt", "CustomerMgmt.txt", true),
            ("Customer*.txt", "Customer.csv", false),
            (
                "FINWIRE[0-9][0-9][0-9][0-9]Q[1-4]",
                "FINWIRE1967Q1",
                true,
            ),
            (
                "FINWIRE[0-9][0-9][0-9][0-9]Q[1-4]",
                "FINWIRE1967Q1_audit.csv",
                false,
            ),
            ("HR.???", "HR.csv", true),
            ("[!A]*.txt", "Account.txt", false),
            ("[!A]*.txt", "Trade.txt", true),
            ("Batch*", "Batch1/Account.txt", false),
            ("[[]x].txt", "[x].txt", true),
        ];
        for (pattern, name, expected) in cases {
            assert_eq!(
                parse_glob(pattern)
                    .unwrap()
                    .matches_with(name, MATCH_OPTIONS),
                expected,
                "{pattern} vs {name}"
            );
        }

        assert!(matches!(
            parse_glob("Batch[12"),
            Err(Error::InvalidGlob { .. })
        ));
    }

    #[test]
    fn batch_ids() {
        assert_eq!(
            batch_id_from_path("/tmp/tpcdi/sf=10/Batch2/Account.txt"),
            Some(2)
        );
        assert_eq!(
            batch_id_from_path("/tmp/tpcdi/sf=10/Batch12/Account.txt"),
            Some(12)
        );
        assert_eq!(batch_id_from_path("/tmp/tpcdi/sf=10/HR.csv"), None);
        assert_eq!(batch_id_from_path("/tmp/Batches/x.txt"), None);
    }

    #[test]
    fn filters_directories_and_names() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("sf=1");
        for name in [
            "Batch1/DailyMarket.txt",
            "Batch2/DailyMarket.txt",
            "Batch2/DailyMarket_audit.csv",
            "Batch3/nested/DailyMarket.txt",
            "Other/DailyMarket.txt",
        ] {
            let path = root.join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let filter = FileFilter::new(&root.join("Batch[23]"), "DailyMarket.txt").unwrap();
        let files: Vec<_> = filter
            .list()
            .unwrap()
            .into_iter()
            .map(|f| f.strip_prefix(&root).unwrap().display().to_string())
            .collect();
        assert_eq!(
            files,
            vec!["Batch2/DailyMarket.txt", "Batch3/nested/DailyMarket.txt"]
        );

        let all = FileFilter::new(&root, "*.txt").unwrap().list().unwrap();
        assert_eq!(all.len(), 4);

        let missing = FileFilter::new(&root.join("Batch9"), "*.txt").unwrap();
        assert!(missing.list().unwrap().is_empty());
    }
}
