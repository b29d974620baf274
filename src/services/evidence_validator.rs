//! Evidence verification against the repository snapshot.
//!
//! Scorers hallucinate citations; every file/line/commit reference is checked
//! against the snapshot before any finding reaches a human. Verification is a
//! pure function of (evidence, snapshot): calling it twice yields an
//! identical result.

use tracing::warn;

use crate::domain::models::{Evidence, RepoSnapshot};

/// Reason strings attached to unverified evidence. Fixed so that audit
/// tooling can match on them.
pub const REASON_FILE_NOT_FOUND: &str = "file not found";
pub const REASON_LINE_OUT_OF_RANGE: &str = "line out of range";
pub const REASON_COMMIT_NOT_FOUND: &str = "commit not found";

/// Verify one evidence citation, returning a copy with `verified`/`error`
/// set. Rules apply in order: missing file, line past the file's end,
/// unknown commit, otherwise verified.
pub fn verify(evidence: &Evidence, snapshot: &RepoSnapshot) -> Evidence {
    let mut out = evidence.clone();

    if let Some(path) = &evidence.file_path {
        let Some(line_count) = snapshot.files.iter().find(|f| &f.path == path).map(|f| f.line_count)
        else {
            out.verified = false;
            out.error = Some(REASON_FILE_NOT_FOUND.to_string());
            return out;
        };
        if let Some(line) = evidence.line {
            if line > line_count {
                out.verified = false;
                out.error = Some(REASON_LINE_OUT_OF_RANGE.to_string());
                return out;
            }
        }
    }

    if let Some(commit) = &evidence.commit {
        if !snapshot.commit_set().contains(commit.as_str()) {
            out.verified = false;
            out.error = Some(REASON_COMMIT_NOT_FOUND.to_string());
            return out;
        }
    }

    out.verified = true;
    out.error = None;
    out
}

/// Verify every citation in a batch, preserving order.
pub fn verify_all(evidence: &[Evidence], snapshot: &RepoSnapshot) -> Vec<Evidence> {
    evidence.iter().map(|e| verify(e, snapshot)).collect()
}

/// Fraction of verified citations in a batch. Returns 1.0 for an empty batch
/// so evidence-free submissions never trip the alert.
#[allow(clippy::cast_precision_loss)]
pub fn verification_rate(evidence: &[Evidence]) -> f64 {
    if evidence.is_empty() {
        return 1.0;
    }
    let verified = evidence.iter().filter(|e| e.verified).count();
    verified as f64 / evidence.len() as f64
}

/// Log each unverified citation at warn level for the audit trail.
pub fn log_unverified(submission_id: uuid::Uuid, evidence: &[Evidence]) {
    for e in evidence.iter().filter(|e| !e.verified) {
        warn!(
            %submission_id,
            scorer = %e.scorer,
            file = e.file_path.as_deref().unwrap_or("-"),
            reason = e.error.as_deref().unwrap_or("unknown"),
            "Evidence citation failed verification"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SnapshotFile;

    fn snapshot() -> RepoSnapshot {
        RepoSnapshot {
            files: vec![
                SnapshotFile { path: "src/main.rs".to_string(), line_count: 100 },
                SnapshotFile { path: "README.md".to_string(), line_count: 20 },
            ],
            commits: vec!["abc123".to_string(), "def456".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_verified_when_all_references_exist() {
        let ev = Evidence::new("security", "finding")
            .with_file("src/main.rs")
            .with_line(50)
            .with_commit("abc123");
        let out = verify(&ev, &snapshot());
        assert!(out.verified);
        assert!(out.error.is_none());
    }

    #[test]
    fn test_missing_file() {
        let ev = Evidence::new("security", "finding").with_file("src/ghost.rs");
        let out = verify(&ev, &snapshot());
        assert!(!out.verified);
        assert_eq!(out.error.as_deref(), Some(REASON_FILE_NOT_FOUND));
    }

    #[test]
    fn test_line_out_of_range() {
        let ev = Evidence::new("security", "finding").with_file("README.md").with_line(21);
        let out = verify(&ev, &snapshot());
        assert!(!out.verified);
        assert_eq!(out.error.as_deref(), Some(REASON_LINE_OUT_OF_RANGE));
    }

    #[test]
    fn test_line_at_exact_end_is_valid() {
        let ev = Evidence::new("security", "finding").with_file("README.md").with_line(20);
        assert!(verify(&ev, &snapshot()).verified);
    }

    #[test]
    fn test_unknown_commit() {
        let ev = Evidence::new("security", "finding").with_commit("999999");
        let out = verify(&ev, &snapshot());
        assert!(!out.verified);
        assert_eq!(out.error.as_deref(), Some(REASON_COMMIT_NOT_FOUND));
    }

    #[test]
    fn test_file_check_precedes_commit_check() {
        // Both references are bad; the file rule wins because it runs first.
        let ev = Evidence::new("security", "finding")
            .with_file("src/ghost.rs")
            .with_commit("999999");
        let out = verify(&ev, &snapshot());
        assert_eq!(out.error.as_deref(), Some(REASON_FILE_NOT_FOUND));
    }

    #[test]
    fn test_citation_free_evidence_verifies() {
        let ev = Evidence::new("security", "general observation");
        assert!(verify(&ev, &snapshot()).verified);
    }

    #[test]
    fn test_idempotent() {
        let ev = Evidence::new("security", "finding").with_file("src/ghost.rs");
        let snap = snapshot();
        let once = verify(&ev, &snap);
        let twice = verify(&once, &snap);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_verification_rate() {
        let snap = snapshot();
        let batch = verify_all(
            &[
                Evidence::new("a", "ok").with_file("src/main.rs"),
                Evidence::new("b", "bad").with_file("src/ghost.rs"),
            ],
            &snap,
        );
        assert!((verification_rate(&batch) - 0.5).abs() < f64::EPSILON);
        assert!((verification_rate(&[]) - 1.0).abs() < f64::EPSILON);
    }
}
