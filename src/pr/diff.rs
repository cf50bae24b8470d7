use super::types::DiffFile;
use super::PrError;

/// Parse a unified diff (as served by GitHub's diff media type) into
/// per-file change statistics.
///
/// Only lines inside a hunk are counted, so `---`/`+++` file headers never
/// inflate the totals. New files are recognised by `--- /dev/null`, deleted
/// files by `+++ /dev/null`.
pub fn parse_diff(raw_diff: &str) -> Result<Vec<DiffFile>, PrError> {
    if raw_diff.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut files: Vec<DiffFile> = Vec::new();
    let mut in_hunk = false;

    for line in raw_diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            files.push(DiffFile {
                path: header_path(rest)?,
                is_new: false,
                is_deleted: false,
                additions: 0,
                deletions: 0,
            });
            in_hunk = false;
            continue;
        }

        let Some(file) = files.last_mut() else {
            // Preamble before the first file header (e.g. a mail header).
            continue;
        };

        if line.starts_with("@@") {
            check_hunk_header(line)?;
            in_hunk = true;
            continue;
        }

        if !in_hunk {
            if let Some(path) = line.strip_prefix("--- ") {
                file.is_new = path.trim() == "/dev/null";
            } else if let Some(path) = line.strip_prefix("+++ ") {
                file.is_deleted = path.trim() == "/dev/null";
            }
            continue;
        }

        match line.as_bytes().first() {
            Some(b'+') => file.additions += 1,
            Some(b'-') => file.deletions += 1,
            _ => {}
        }
    }

    Ok(files)
}

fn header_path(rest: &str) -> Result<String, PrError> {
    let mut parts = rest.split_whitespace();
    let a_path = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing a/ path in diff header".to_string()))?;
    let b_path = parts
        .next()
        .ok_or_else(|| PrError::DiffParse("Missing b/ path in diff header".to_string()))?;
    Ok(b_path
        .strip_prefix("b/")
        .or_else(|| a_path.strip_prefix("a/"))
        .unwrap_or(b_path)
        .to_string())
}

/// Validate `@@ -a,b +c,d @@`; counts are optional per the unified format.
fn check_hunk_header(line: &str) -> Result<(), PrError> {
    let body = line
        .strip_prefix("@@")
        .and_then(|rest| rest.split("@@").next())
        .map(str::trim)
        .ok_or_else(|| PrError::DiffParse(format!("Invalid hunk header: {}", line)))?;

    let mut ranges = body.split_whitespace();
    for prefix in ['-', '+'] {
        let range = ranges
            .next()
            .and_then(|r| r.strip_prefix(prefix))
            .ok_or_else(|| PrError::DiffParse(format!("Invalid hunk header: {}", line)))?;
        let valid = range
            .split(',')
            .all(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(PrError::DiffParse(format!("Invalid range in hunk header: {}", line)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = r#"diff --git a/src/main.rs b/src/main.rs
index abc1234..def5678 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,5 +1,7 @@
 fn main() {
-    println!("old");
+    println!("new");
+    // Added a comment
 }
"#;

    #[test]
    fn test_parse_single_file_diff() {
        let files = parse_diff(SAMPLE_DIFF).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "src/main.rs");
        assert_eq!(files[0].additions, 2);
        assert_eq!(files[0].deletions, 1);
    }

    #[test]
    fn test_parse_new_and_deleted_files() {
        let diff = r#"diff --git a/new_file.txt b/new_file.txt
new file mode 100644
index 0000000..e69de29
--- /dev/null
+++ b/new_file.txt
@@ -0,0 +1,2 @@
+hello
+world
diff --git a/old_file.txt b/old_file.txt
deleted file mode 100644
index e69de29..0000000
--- a/old_file.txt
+++ /dev/null
@@ -1,2 +0,0 @@
-hello
-world
"#;
        let files = parse_diff(diff).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].is_new);
        assert!(!files[0].is_deleted);
        assert_eq!(files[0].additions, 2);
        assert!(files[1].is_deleted);
        assert_eq!(files[1].path, "old_file.txt");
        assert_eq!(files[1].deletions, 2);
    }

    #[test]
    fn test_header_lines_are_not_counted() {
        let files = parse_diff(SAMPLE_DIFF).unwrap();
        // `--- a/...` and `+++ b/...` precede the hunk
        assert_eq!(files[0].lines_changed(), 3);
    }

    #[test]
    fn test_single_line_range_without_count() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-a\n+b\n";
        let files = parse_diff(diff).unwrap();
        assert_eq!(files[0].additions, 1);
        assert_eq!(files[0].deletions, 1);
    }

    #[test]
    fn test_invalid_hunk_header() {
        let diff = "diff --git a/x b/x\n--- a/x\n+++ b/x\n@@ nonsense @@\n+b\n";
        assert!(parse_diff(diff).is_err());
    }

    #[test]
    fn test_parse_empty_diff() {
        let files = parse_diff("").unwrap();
        assert!(files.is_empty());
    }
}
