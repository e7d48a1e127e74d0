//! C5: the long-lived batch orchestrator process. Walks the source table in
//! ID order, spawns the per-batch driver (C6) as a subprocess for each
//! fixed-size batch, reconciles success against the vector store, and
//! advances a crash-safe checkpoint only after a batch's side effects are
//! durably committed.

pub mod checkpoint;
pub mod retry;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::collaborators::{SourceTable, VectorStore};
use crate::config::AppConfig;
use crate::domain::WorkItem;
use crate::orchestrator::checkpoint::BatchCheckpoint;
use crate::orchestrator::retry::RetrySet;
use crate::verify;

#[derive(Serialize)]
struct JobInputItem<'a> {
    platform: &'a str,
    code: &'a str,
}

pub struct BatchOrchestrator {
    config: Arc<AppConfig>,
    source_table: Arc<dyn SourceTable>,
    vector_store: Arc<dyn VectorStore>,
    checkpoint_path: PathBuf,
}

impl BatchOrchestrator {
    pub fn new(config: Arc<AppConfig>, source_table: Arc<dyn SourceTable>, vector_store: Arc<dyn VectorStore>) -> Self {
        let checkpoint_path = config.checkpoint_file.clone();
        Self {
            config,
            source_table,
            vector_store,
            checkpoint_path,
        }
    }

    /// Runs the main cursor walk followed by the retry phase. Returns the
    /// process exit code per §6: 0 clean drain, 1 when the retry phase ends
    /// with a non-empty failure set.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<i32> {
        let mut checkpoint = BatchCheckpoint::load(&self.checkpoint_path)?;
        let mut retry_set = RetrySet::new();
        let mut empty_attempts = 0u32;

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("shutdown requested, stopping before next batch");
                break;
            }

            let rows = self
                .source_table
                .next_batch(checkpoint.cursor_id, self.config.batch_size)
                .await?;

            if rows.is_empty() {
                empty_attempts += 1;
                tracing::info!(attempt = empty_attempts, "empty batch");
                if empty_attempts >= self.config.empty_batch_retries {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(self.config.inter_batch_delay_secs)).await;
                continue;
            }
            empty_attempts = 0;

            let items: Vec<WorkItem> = rows.iter().map(|row| WorkItem::new(row.platform.clone(), row.code.clone())).collect();
            let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
            let max_id = *ids.iter().max().unwrap();

            tracing::info!(batch_start = checkpoint.cursor_id, count = rows.len(), "dispatching batch");
            let exit_code = self.run_driver_subprocess(&items).await?;

            if exit_code == 0 {
                self.source_table.mark_extracted(&ids).await?;

                let codes: Vec<String> = rows.iter().map(|row| row.code.clone()).collect();
                let verification = verify::verify_batch(self.vector_store.as_ref(), &self.config.vector_collection, &codes).await;
                verify::mark_embedded(self.source_table.as_ref(), &verification).await?;

                checkpoint = BatchCheckpoint { cursor_id: max_id };
                checkpoint.save(&self.checkpoint_path)?;
            } else {
                tracing::warn!(exit_code, "batch failed, not advancing checkpoint");
                for item in items {
                    retry_set.insert(item);
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.inter_batch_delay_secs)).await;
        }

        if retry_set.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = retry_set.len(), "entering retry phase");
        let max_retries = self.config.max_retries;
        let permanently_failed = retry::run_retry_phase(&mut retry_set, max_retries, |item| {
            let this_ids = self.source_table.clone();
            let this_vector = self.vector_store.clone();
            let collection = self.config.vector_collection.clone();
            let command = self.config.pipeline_entrypoint.clone();
            async move {
                let exit_code = run_single_item_driver(&command, &item).await.unwrap_or(1);
                if exit_code != 0 {
                    return false;
                }
                let Ok(Some(id)) = this_ids.id_for_code(&item.code).await else {
                    return false;
                };
                if this_ids.mark_extracted(&[id]).await.is_err() {
                    return false;
                }
                let verification = verify::verify_batch(this_vector.as_ref(), &collection, &[item.code.clone()]).await;
                verify::mark_embedded(this_ids.as_ref(), &verification).await.is_ok()
            }
        })
        .await;

        if !permanently_failed.is_empty() {
            tracing::error!(codes = ?permanently_failed, "codes permanently failed after retry phase");
            return Ok(1);
        }
        Ok(0)
    }

    async fn run_driver_subprocess(&self, items: &[WorkItem]) -> anyhow::Result<i32> {
        run_driver_subprocess_for(&self.config.pipeline_entrypoint, items, self.config.debug_pipeline).await
    }
}

async fn run_single_item_driver(command: &str, item: &WorkItem) -> anyhow::Result<i32> {
    run_driver_subprocess_for(command, std::slice::from_ref(item), false).await
}

async fn run_driver_subprocess_for(command: &str, items: &[WorkItem], debug_pipeline: bool) -> anyhow::Result<i32> {
    let job_input: Vec<JobInputItem<'_>> = items
        .iter()
        .map(|item| JobInputItem {
            platform: &item.platform,
            code: &item.code,
        })
        .collect();
    let job_input_json = serde_json::to_string(&job_input)?;

    // Invoked through a shell so `pipeline_entrypoint` can be either a bare
    // executable name or a full command line (tests exercise it with
    // inline `/bin/sh -c '...'` scripts).
    let mut child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .env("JOB_INPUT", job_input_json)
        .env("DEBUG_PIPELINE", if debug_pipeline { "1" } else { "0" })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .spawn()?;

    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(line = %line, "driver stdout");
    }

    let status = child.wait().await?;
    Ok(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use crate::collaborators::source_table::fake::FakeSourceTable;
    use crate::collaborators::source_table::SourceRow;
    use crate::collaborators::vector_store::fake::FakeVectorStore;

    use super::*;

    fn seed_rows(n: i64) -> Vec<SourceRow> {
        (1..=n)
            .map(|id| SourceRow {
                id,
                platform: "instagram".to_string(),
                code: format!("code{id}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn successful_batch_advances_checkpoint_to_max_id() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.txt");

        let mut config = AppConfig::default();
        config.batch_size = 3;
        config.checkpoint_file = checkpoint_path.clone();
        config.empty_batch_retries = 1;
        config.inter_batch_delay_secs = 0;
        config.pipeline_entrypoint = "/bin/sh -c 'printf \"%s\\n\" \"{\\\"item_done\\\": 1}\"; exit 0'".to_string();

        let source_table: Arc<dyn SourceTable> = Arc::new(FakeSourceTable::seed(seed_rows(3)));
        let vector_store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::with_present(["code1", "code2", "code3"]));

        let orchestrator = BatchOrchestrator::new(Arc::new(config), source_table, vector_store);
        let exit_code = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(exit_code, 0);
        let checkpoint = BatchCheckpoint::load(&checkpoint_path).unwrap();
        assert_eq!(checkpoint.cursor_id, 3);
    }

    #[tokio::test]
    async fn failing_batch_does_not_advance_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.txt");

        let mut config = AppConfig::default();
        config.batch_size = 3;
        config.checkpoint_file = checkpoint_path.clone();
        config.empty_batch_retries = 1;
        config.max_retries = 0;
        config.inter_batch_delay_secs = 0;
        config.pipeline_entrypoint = "/bin/sh -c 'exit 1'".to_string();

        let source_table: Arc<dyn SourceTable> = Arc::new(FakeSourceTable::seed(seed_rows(3)));
        let vector_store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::with_present(Vec::<String>::new()));

        let orchestrator = BatchOrchestrator::new(Arc::new(config), source_table, vector_store);
        orchestrator.run(CancellationToken::new()).await.unwrap();

        let checkpoint = BatchCheckpoint::load(&checkpoint_path).unwrap();
        assert_eq!(checkpoint.cursor_id, 0);
    }

    #[tokio::test]
    async fn resuming_from_a_persisted_checkpoint_only_processes_the_remaining_rows() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.txt");

        // Simulate a crash that happened right after a first batch covering
        // IDs 1..1000 committed: its checkpoint is on disk and those rows
        // are already marked extracted, but nothing beyond that ran yet.
        BatchCheckpoint { cursor_id: 1000 }.save(&checkpoint_path).unwrap();
        let rows = seed_rows(2500);
        let codes: Vec<String> = rows.iter().map(|row| row.code.clone()).collect();
        let source_table = Arc::new(FakeSourceTable::seed(rows));
        source_table.mark_extracted(&(1..=1000).collect::<Vec<_>>()).await.unwrap();

        let mut config = AppConfig::default();
        config.batch_size = 1000;
        config.checkpoint_file = checkpoint_path.clone();
        config.empty_batch_retries = 1;
        config.inter_batch_delay_secs = 0;
        config.pipeline_entrypoint = "/bin/sh -c 'printf \"%s\\n\" \"{\\\"item_done\\\": 1}\"; exit 0'".to_string();

        let vector_store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::with_present(codes.iter().map(String::as_str)));
        let orchestrator = BatchOrchestrator::new(
            Arc::new(config),
            source_table.clone() as Arc<dyn SourceTable>,
            vector_store,
        );
        let exit_code = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(exit_code, 0);
        let final_checkpoint = BatchCheckpoint::load(&checkpoint_path).unwrap();
        assert_eq!(final_checkpoint.cursor_id, 2500);
        for id in 1..=2500 {
            assert!(source_table.is_extracted(id), "row {id} was not marked extracted");
        }
    }

    #[tokio::test]
    async fn retry_phase_recovers_a_transient_single_item_failure() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint_path = dir.path().join("checkpoint.txt");
        let flag_path = dir.path().join("y_attempted_once");

        let mut config = AppConfig::default();
        config.batch_size = 3;
        config.checkpoint_file = checkpoint_path.clone();
        config.empty_batch_retries = 1;
        config.max_retries = 1;
        config.inter_batch_delay_secs = 0;
        // The whole batch fails once (Y's first attempt fails), so all three
        // items land in the retry set; the single-item retry path always
        // succeeds, modeling Y succeeding on its second attempt while X and Z
        // are retried redundantly but harmlessly.
        config.pipeline_entrypoint = format!(
            "/bin/sh -c 'test -f {0} && exit 0 || {{ touch {0}; exit 1; }}'",
            flag_path.display()
        );

        let rows = seed_rows(3);
        let codes: Vec<String> = rows.iter().map(|row| row.code.clone()).collect();
        let source_table: Arc<dyn SourceTable> = Arc::new(FakeSourceTable::seed(rows));
        let vector_store: Arc<dyn VectorStore> = Arc::new(FakeVectorStore::with_present(codes.iter().map(String::as_str)));

        let orchestrator = BatchOrchestrator::new(Arc::new(config), source_table, vector_store);
        let exit_code = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(exit_code, 0);
    }
}
