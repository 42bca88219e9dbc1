//! Campaign target-result files: tab-separated append logs plus cleanup of
//! a campaign's source targets file. Grounded on `src/utils/target_files.py`
//! — same three files per campaign (`{campaign_id}_success.txt`,
//! `_failure.txt`, `_other.txt`), same `identifier\t[reason\t]timestamp`
//! line format, same case-insensitive `@`-stripped matching when pruning
//! the source file. The source-file rewrite goes through a temp file plus
//! rename rather than the original's direct overwrite, so a crash mid-write
//! can't truncate an operator's targets list. Blocking file I/O runs on
//! `spawn_blocking`, the Rust analogue of the original's `asyncio.to_thread`.

use std::path::{Path, PathBuf};

use uuid::Uuid;

const TARGETS_DIR: &str = "data/targets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    Success,
    Failure,
    Other,
}

impl ResultType {
    fn file_suffix(self) -> &'static str {
        match self {
            ResultType::Success => "success",
            ResultType::Failure => "failure",
            ResultType::Other => "other",
        }
    }
}

fn ensure_targets_dir() -> std::io::Result<PathBuf> {
    let dir = PathBuf::from(TARGETS_DIR);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn result_file_path(campaign_id: Uuid, result: ResultType) -> std::io::Result<PathBuf> {
    let dir = ensure_targets_dir()?;
    Ok(dir.join(format!("{campaign_id}_{}.txt", result.file_suffix())))
}

/// Appends one line to the campaign's result file for `result`.
pub async fn append_result(
    campaign_id: Uuid,
    result: ResultType,
    identifier: String,
    reason: Option<String>,
) -> std::io::Result<()> {
    let path = result_file_path(campaign_id, result)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let line = match reason {
        Some(reason) => format!("{identifier}\t{reason}\t{timestamp}\n"),
        None => format!("{identifier}\t{timestamp}\n"),
    };
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())
    })
    .await
    .expect("append_result blocking task panicked")
}

/// Strips processed identifiers out of a campaign's source targets file,
/// matching case-insensitively with a leading `@` ignored on both sides.
/// Returns the number of lines removed; `0` if the file doesn't exist.
pub async fn remove_from_source_file(source_file_path: String, identifiers: Vec<String>) -> std::io::Result<usize> {
    tokio::task::spawn_blocking(move || {
        let path = Path::new(&source_file_path);
        if !path.exists() {
            return Ok(0);
        }
        let wanted: std::collections::HashSet<String> = identifiers
            .iter()
            .map(|s| s.to_lowercase().trim_start_matches('@').to_string())
            .collect();

        let contents = std::fs::read_to_string(path)?;
        let mut removed = 0usize;
        let mut remaining = String::new();
        for line in contents.lines() {
            let normalized = line.trim().to_lowercase();
            let normalized = normalized.trim_start_matches('@');
            if !normalized.is_empty() && wanted.contains(normalized) {
                removed += 1;
            } else {
                remaining.push_str(line);
                remaining.push('\n');
            }
        }
        // Write-then-rename so a crash mid-write leaves the original file
        // intact instead of truncated.
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, remaining)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(removed)
    })
    .await
    .expect("remove_from_source_file blocking task panicked")
}

/// Records a target's outcome and, if the campaign has a source file
/// configured, prunes that identifier out of it.
pub async fn record_target_result(
    campaign_id: Uuid,
    identifier: String,
    result: ResultType,
    reason: Option<String>,
    source_file_path: Option<String>,
) -> std::io::Result<()> {
    append_result(campaign_id, result, identifier.clone(), reason).await?;
    if let Some(path) = source_file_path {
        remove_from_source_file(path, vec![identifier]).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultStats {
    pub success: u64,
    pub failure: u64,
    pub other: u64,
}

pub async fn result_stats(campaign_id: Uuid) -> ResultStats {
    let mut stats = ResultStats::default();
    for (result, count) in [
        (ResultType::Success, &mut stats.success),
        (ResultType::Failure, &mut stats.failure),
        (ResultType::Other, &mut stats.other),
    ] {
        if let Ok(path) = result_file_path(campaign_id, result) {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                *count = contents.lines().filter(|l| !l.trim().is_empty()).count() as u64;
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_then_prune_source_file() {
        let campaign_id = Uuid::new_v4();
        let dir = std::env::temp_dir().join(format!("fleet-results-test-{campaign_id}"));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("targets.txt");
        std::fs::write(&source, "@alice\nbob\nCarol\n").unwrap();

        record_target_result(
            campaign_id,
            "alice".into(),
            ResultType::Success,
            None,
            Some(source.to_string_lossy().into_owned()),
        )
        .await
        .unwrap();

        let remaining = std::fs::read_to_string(&source).unwrap();
        assert!(!remaining.to_lowercase().contains("alice"));
        assert!(remaining.to_lowercase().contains("bob"));

        let stats = result_stats(campaign_id).await;
        assert_eq!(stats.success, 1);

        std::fs::remove_dir_all(&dir).ok();
        std::fs::remove_file(result_file_path(campaign_id, ResultType::Success).unwrap()).ok();
    }
}
