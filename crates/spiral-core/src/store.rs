//! Persistence of pipeline outcomes.
//!
//! - `ResultRecord`: flat, serializable view of a [`PipelineResult`]
//! - `ResultQuery`: filter + ordering for reading records back
//! - `StoreStats`: aggregates over a set of stored records
//! - `ResultStore`: async store trait (append, list, query, prune, stats)
//! - `JsonlResultStore`: one JSON object per line in a local file
//! - `MemoryResultStore`: in-memory store for tests and dry runs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::domain::{Decision, Event, Mode, PipelineResult, Result, SpiralError};

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Stable id of an event: 16 hex chars of the text digest, an underscore,
/// then 8 hex chars of the digest of the context serialized as JSON.
pub fn record_id(event: &Event) -> Result<String> {
    let text = sha256_hex(event.text.as_bytes());
    let context = sha256_hex(&serde_json::to_vec(&event.context)?);
    Ok(format!("{}_{}", &text[..16], &context[..8]))
}

/// Retention priority of a result in [0, 1].
///
/// The mean of the two scores, weighted by the decision and boosted by up to
/// 20% for longer texts (one extra percent per ten characters).
pub fn importance(decision: Decision, confidence: f64, success: f64, len_chars: usize) -> f64 {
    let base = (confidence + success) / 2.0;
    let length_factor = (1.0 + len_chars as f64 / 1000.0).min(1.2);
    (base * decision.importance_weight() * length_factor).clamp(0.0, 1.0)
}

/// Flat record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    /// Full SHA-256 hex digest of the event text.
    pub text_digest: String,
    pub decision: Decision,
    pub confidence: f64,
    pub success: f64,
    #[serde(default)]
    pub importance: f64,
    pub iteration_count: usize,
    pub mode: Mode,
    pub processing_time_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl ResultRecord {
    pub fn from_result(event: &Event, result: &PipelineResult) -> Result<Self> {
        let confidence = result.score.confidence();
        let success = result.score.success();
        Ok(Self {
            id: record_id(event)?,
            text_digest: sha256_hex(event.text.as_bytes()),
            decision: result.decision,
            confidence,
            success,
            importance: importance(
                result.decision,
                confidence,
                success,
                event.text.chars().count(),
            ),
            iteration_count: result.iteration_count(),
            mode: result.mode,
            processing_time_ms: result.processing_time_ms(),
            timestamp: result.timestamp,
        })
    }
}

/// Which records to read back and how many.
///
/// Matches are ordered by importance, highest first, then newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultQuery {
    pub decision: Option<Decision>,
    pub min_importance: Option<f64>,
    /// Only records at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ResultQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = Some(min_importance);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only records from the last `days` days.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `days` is negative or too large to subtract from now.
    pub fn recent_days(self, days: i64) -> Result<Self> {
        Ok(self.since(days_ago(days)?))
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &ResultRecord) -> bool {
        self.decision.map_or(true, |d| record.decision == d)
            && self.min_importance.map_or(true, |m| record.importance >= m)
            && self.since.map_or(true, |t| record.timestamp >= t)
    }

    /// Filter, order and truncate `records`.
    pub fn apply(&self, records: Vec<ResultRecord>) -> Vec<ResultRecord> {
        let mut matched: Vec<ResultRecord> =
            records.into_iter().filter(|r| self.matches(r)).collect();
        matched.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// The instant `days` days before now.
///
/// # Errors
///
/// `InvalidConfig` when `days` is negative or out of range.
pub fn days_ago(days: i64) -> Result<DateTime<Utc>> {
    if days < 0 {
        return Err(SpiralError::InvalidConfig(format!(
            "day count must not be negative, got {days}"
        )));
    }
    chrono::Duration::try_days(days)
        .and_then(|span| Utc::now().checked_sub_signed(span))
        .ok_or_else(|| SpiralError::InvalidConfig(format!("day count {days} is out of range")))
}

/// Aggregates over stored records.
///
/// Means and rates are `0.0` for an empty store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub count: usize,
    pub mean_confidence: f64,
    pub mean_success: f64,
    pub mean_importance: f64,
    pub mean_iterations: f64,
    pub acceptance_rate: f64,
    pub force_acceptance_rate: f64,
    pub rejection_rate: f64,
    /// Share of runs that needed more than one iteration.
    pub revision_rate: f64,
    /// Decision name to number of records.
    pub decisions: BTreeMap<String, usize>,
    /// Final mode name to number of records.
    pub mode_usage: BTreeMap<String, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

impl StoreStats {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut stats = StoreStats {
            count: records.len(),
            ..StoreStats::default()
        };
        if records.is_empty() {
            return stats;
        }

        let mut revised = 0usize;
        for record in records {
            stats.mean_confidence += record.confidence;
            stats.mean_success += record.success;
            stats.mean_importance += record.importance;
            stats.mean_iterations += record.iteration_count as f64;
            if record.iteration_count > 1 {
                revised += 1;
            }
            *stats
                .decisions
                .entry(record.decision.as_str().to_string())
                .or_default() += 1;
            *stats
                .mode_usage
                .entry(record.mode.as_str().to_string())
                .or_default() += 1;
            stats.oldest = Some(stats.oldest.map_or(record.timestamp, |t| t.min(record.timestamp)));
            stats.newest = Some(stats.newest.map_or(record.timestamp, |t| t.max(record.timestamp)));
        }

        let n = records.len() as f64;
        let rate = |decision: Decision| {
            stats.decisions.get(decision.as_str()).copied().unwrap_or(0) as f64 / n
        };
        let acceptance_rate = rate(Decision::Accept);
        let force_acceptance_rate = rate(Decision::ForceAccept);
        let rejection_rate = rate(Decision::Reject);

        stats.mean_confidence /= n;
        stats.mean_success /= n;
        stats.mean_importance /= n;
        stats.mean_iterations /= n;
        stats.acceptance_rate = acceptance_rate;
        stats.force_acceptance_rate = force_acceptance_rate;
        stats.rejection_rate = rejection_rate;
        stats.revision_rate = revised as f64 / n;
        stats
    }
}

/// Store of [`ResultRecord`]s.
///
/// Records come back from `list` in insertion order.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn append(&self, record: &ResultRecord) -> Result<()>;

    /// All records, or only the most recent `limit` when given.
    async fn list(&self, limit: Option<usize>) -> Result<Vec<ResultRecord>>;

    async fn len(&self) -> Result<usize>;

    /// Records matching `query`, ordered as [`ResultQuery::apply`] orders them.
    async fn query(&self, query: &ResultQuery) -> Result<Vec<ResultRecord>> {
        Ok(query.apply(self.list(None).await?))
    }

    /// Delete records older than `older_than` whose importance is below
    /// `min_importance`. Returns how many were removed.
    async fn prune(&self, older_than: DateTime<Utc>, min_importance: f64) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats::from_records(&self.list(None).await?))
    }
}

fn tail(mut records: Vec<ResultRecord>, limit: Option<usize>) -> Vec<ResultRecord> {
    if let Some(limit) = limit {
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
    }
    records
}

fn is_prunable(record: &ResultRecord, older_than: DateTime<Utc>, min_importance: f64) -> bool {
    record.timestamp < older_than && record.importance < min_importance
}

/// Newline-delimited JSON file store.
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_records(&self) -> Result<Vec<ResultRecord>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let records = raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(serde_json::from_str::<ResultRecord>)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[async_trait]
impl ResultStore for JsonlResultStore {
    async fn append(&self, record: &ResultRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        tracing::debug!(path = %self.path.display(), id = %record.id, "result appended");
        Ok(())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<ResultRecord>> {
        Ok(tail(self.read_records().await?, limit))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read_records().await?.len())
    }

    /// Rewrites the file through a sibling temp file and a rename.
    async fn prune(&self, older_than: DateTime<Utc>, min_importance: f64) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .read_records()
            .await?
            .into_iter()
            .partition(|r| is_prunable(r, older_than, min_importance));
        if removed.is_empty() {
            return Ok(0);
        }

        let mut body = Vec::new();
        for record in &kept {
            serde_json::to_writer(&mut body, record)?;
            body.push(b'\n');
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::info!(
            path = %self.path.display(),
            removed = removed.len(),
            kept = kept.len(),
            "store pruned"
        );
        Ok(removed.len())
    }
}

/// In-memory store backed by a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<Vec<ResultRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, Vec<ResultRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(&self, record: &ResultRecord) -> Result<()> {
        self.records().push(record.clone());
        Ok(())
    }

    async fn list(&self, limit: Option<usize>) -> Result<Vec<ResultRecord>> {
        let records = self.records().clone();
        Ok(tail(records, limit))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records().len())
    }

    async fn prune(&self, older_than: DateTime<Utc>, min_importance: f64) -> Result<usize> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|r| !is_prunable(r, older_than, min_importance));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(id: &str) -> ResultRecord {
        ResultRecord {
            id: id.to_string(),
            text_digest: sha256_hex(id.as_bytes()),
            decision: Decision::Accept,
            confidence: 0.8,
            success: 0.9,
            importance: 0.85,
            iteration_count: 1,
            mode: Mode::Balanced,
            processing_time_ms: 0.5,
            timestamp: Utc::now(),
        }
    }

    fn aged(id: &str, decision: Decision, importance: f64, days_old: i64) -> ResultRecord {
        ResultRecord {
            decision,
            importance,
            timestamp: Utc::now() - Duration::days(days_old),
            ..record(id)
        }
    }

    #[test]
    fn test_record_id_shape() {
        let id = record_id(&Event::new("hello")).expect("id");
        let (text, context) = id.split_once('_').expect("underscore");
        assert_eq!(text.len(), 16);
        assert_eq!(context.len(), 8);
        assert!(id.chars().all(|c| c == '_' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_record_id_depends_on_context() {
        let plain = record_id(&Event::new("hello")).expect("id");
        let tagged = record_id(&Event::new("hello").with_context("source", "x_platform"))
            .expect("id");
        assert_eq!(plain[..16], tagged[..16]);
        assert_ne!(plain, tagged);
        assert_eq!(plain, record_id(&Event::new("hello")).expect("id"));
    }

    #[test]
    fn test_importance_weights_decision_and_length() {
        assert!((importance(Decision::Accept, 0.6, 0.8, 0) - 0.7).abs() < 1e-12);
        assert!((importance(Decision::Reject, 0.6, 0.8, 0) - 0.42).abs() < 1e-12);
        // 100 chars is a 10% boost
        assert!((importance(Decision::Accept, 0.6, 0.8, 100) - 0.77).abs() < 1e-12);
        // the length boost saturates at 20%
        let long = importance(Decision::Accept, 0.5, 0.5, 10_000);
        assert!((long - 0.6).abs() < 1e-12);
        assert_eq!(importance(Decision::ForceAccept, 1.0, 1.0, 500), 1.0);
    }

    #[test]
    fn test_query_filters_and_orders_by_importance_then_recency() {
        let records = vec![
            aged("low", Decision::Accept, 0.2, 1),
            aged("old-high", Decision::Accept, 0.9, 10),
            aged("new-high", Decision::Accept, 0.9, 0),
            aged("rejected", Decision::Reject, 0.95, 0),
        ];

        let ids = |q: &ResultQuery| -> Vec<String> {
            q.apply(records.clone()).into_iter().map(|r| r.id).collect()
        };

        assert_eq!(
            ids(&ResultQuery::new()),
            vec!["rejected", "new-high", "old-high", "low"]
        );
        assert_eq!(
            ids(&ResultQuery::new().decision(Decision::Accept).min_importance(0.5)),
            vec!["new-high", "old-high"]
        );
        assert_eq!(
            ids(&ResultQuery::new().recent_days(5).expect("days").limit(2)),
            vec!["rejected", "new-high"]
        );
        assert!(ResultQuery::new().recent_days(-1).is_err());
    }

    #[test]
    fn test_stats_over_records() {
        let mut records = vec![
            aged("a", Decision::Accept, 0.8, 0),
            aged("b", Decision::ForceAccept, 0.4, 1),
            aged("c", Decision::Reject, 0.3, 2),
            aged("d", Decision::Accept, 0.5, 3),
        ];
        records[1].iteration_count = 100;
        records[2].mode = Mode::Verification;

        let stats = StoreStats::from_records(&records);
        assert_eq!(stats.count, 4);
        assert!((stats.acceptance_rate - 0.5).abs() < 1e-12);
        assert!((stats.force_acceptance_rate - 0.25).abs() < 1e-12);
        assert!((stats.rejection_rate - 0.25).abs() < 1e-12);
        assert!((stats.revision_rate - 0.25).abs() < 1e-12);
        assert!((stats.mean_importance - 0.5).abs() < 1e-12);
        assert!((stats.mean_iterations - 103.0 / 4.0).abs() < 1e-12);
        assert_eq!(stats.decisions.get("ACCEPT"), Some(&2));
        assert_eq!(stats.mode_usage.get("BALANCED"), Some(&3));
        assert_eq!(stats.mode_usage.get("VERIFICATION"), Some(&1));
        assert_eq!(stats.newest, Some(records[0].timestamp));
        assert_eq!(stats.oldest, Some(records[3].timestamp));

        assert_eq!(StoreStats::from_records(&[]), StoreStats::default());
    }

    #[tokio::test]
    async fn test_memory_store_append_and_list() {
        let store = MemoryResultStore::new();
        for id in ["a", "b", "c"] {
            store.append(&record(id)).await.expect("append");
        }
        assert_eq!(store.len().await.expect("len"), 3);
        let last_two: Vec<String> = store
            .list(Some(2))
            .await
            .expect("list")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(last_two, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_memory_store_prune_needs_both_age_and_low_importance() {
        let store = MemoryResultStore::new();
        store.append(&aged("old-low", Decision::Reject, 0.1, 40)).await.expect("append");
        store.append(&aged("old-high", Decision::Accept, 0.9, 40)).await.expect("append");
        store.append(&aged("new-low", Decision::Reject, 0.1, 1)).await.expect("append");

        let removed = store.prune(days_ago(30).expect("cutoff"), 0.3).await.expect("prune");
        assert_eq!(removed, 1);
        let ids: Vec<String> = store.list(None).await.expect("list").into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["old-high", "new-low"]);
    }

    #[tokio::test]
    async fn test_jsonl_store_persists_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("results.jsonl");
        let store = JsonlResultStore::new(&path);
        assert_eq!(store.len().await.expect("len"), 0);

        store.append(&record("a")).await.expect("append");
        store.append(&record("b")).await.expect("append");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(raw.lines().count(), 2);

        let reopened = JsonlResultStore::new(&path);
        let records = reopened.list(None).await.expect("list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].id, "b");
        assert_eq!(records[1].decision, Decision::Accept);
        assert_eq!(records[1].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_jsonl_store_prune_rewrites_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        let store = JsonlResultStore::new(&path);
        store.append(&aged("old-low", Decision::Reject, 0.1, 40)).await.expect("append");
        store.append(&aged("keep", Decision::Accept, 0.9, 40)).await.expect("append");

        let cutoff = days_ago(30).expect("cutoff");
        assert_eq!(store.prune(cutoff, 0.3).await.expect("prune"), 1);
        assert_eq!(store.prune(cutoff, 0.3).await.expect("prune"), 0);

        let raw = std::fs::read_to_string(&path).expect("read");
        assert_eq!(raw.lines().count(), 1);
        let reopened = JsonlResultStore::new(&path);
        let records = reopened.list(None).await.expect("list");
        assert_eq!(records[0].id, "keep");
        assert!(!dir.path().join("results.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_jsonl_store_query_and_stats_use_stored_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonlResultStore::new(dir.path().join("results.jsonl"));
        store.append(&aged("a", Decision::Accept, 0.7, 0)).await.expect("append");
        store.append(&aged("b", Decision::Reject, 0.2, 0)).await.expect("append");

        let accepted = store
            .query(&ResultQuery::new().decision(Decision::Accept))
            .await
            .expect("query");
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].id, "a");

        let stats = store.stats().await.expect("stats");
        assert_eq!(stats.count, 2);
        assert!((stats.rejection_rate - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_jsonl_store_reads_records_without_importance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        let mut line = serde_json::to_value(record("legacy")).expect("to value");
        line.as_object_mut().expect("object").remove("importance");
        std::fs::write(&path, format!("{line}\n")).expect("write");

        let records = JsonlResultStore::new(&path).list(None).await.expect("list");
        assert_eq!(records[0].importance, 0.0);
    }

    #[tokio::test]
    async fn test_jsonl_store_rejects_corrupt_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results.jsonl");
        std::fs::write(&path, "{not json}\n").expect("write");
        let store = JsonlResultStore::new(&path);
        assert!(store.list(None).await.is_err());
    }
}
