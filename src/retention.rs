//! Retention/cleanup job.
//!
//! # Responsibilities
//! - Enumerate partitions older than each table's retention cutoff
//! - Drop expired partitions whole (never row-by-row) or report them (dry run)
//! - Log an audit summary per run
//!
//! # Design Decisions
//! - Safe to re-run at any time: dropping an already-absent partition is a
//!   no-op, so a second run with the same cutoff removes zero rows
//! - A partition expires only when its entire window is older than the
//!   cutoff; deletion granularity is the window, never a single record
//! - Runs on its own connection, fully independent of the write path

use std::path::{Path, PathBuf};

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use rusqlite::Connection;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::schema::RetentionConfig;
use crate::store::partitions::{self, TableSpec, TABLES};
use crate::store::schema;

/// Whether a run reports or actually drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    DryRun,
    Execute,
}

/// Expired partitions found for one base table.
#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: &'static str,
    pub cutoff: NaiveDate,
    /// Partition table names, oldest first.
    pub partitions: Vec<String>,
    /// Rows contained in those partitions at scan time.
    pub rows: u64,
    /// Partitions actually dropped (zero in dry-run mode).
    pub dropped: usize,
}

/// Outcome of one cleanup run.
#[derive(Debug, Clone)]
pub struct RetentionReport {
    pub mode: RetentionMode,
    pub tables: Vec<TableReport>,
}

impl RetentionReport {
    pub fn total_partitions(&self) -> usize {
        self.tables.iter().map(|t| t.partitions.len()).sum()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn total_dropped(&self) -> usize {
        self.tables.iter().map(|t| t.dropped).sum()
    }
}

/// Periodic partition-expiry job over the store's database file.
pub struct RetentionJob {
    db_path: PathBuf,
    config: RetentionConfig,
}

impl RetentionJob {
    pub fn new(db_path: impl AsRef<Path>, config: RetentionConfig) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            config,
        }
    }

    /// Run the periodic loop until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("retention job disabled");
            return;
        }

        let mode = if self.config.dry_run {
            RetentionMode::DryRun
        } else {
            RetentionMode::Execute
        };
        tracing::info!(
            interval_secs = self.config.interval_secs,
            ?mode,
            "retention job starting"
        );

        let mut ticker = time::interval(std::time::Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(mode) {
                        Ok(report) => log_report(&report),
                        Err(e) => tracing::error!(error = %e, "retention run failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("retention job received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One full scan-and-drop (or scan-and-report) pass.
    pub fn run_once(&self, mode: RetentionMode) -> rusqlite::Result<RetentionReport> {
        let conn = match schema::open_connection(&self.db_path) {
            Ok(conn) => conn,
            Err(crate::provider::ProviderError::Storage(e)) => return Err(e),
            Err(_) => return Err(rusqlite::Error::InvalidPath(self.db_path.clone())),
        };
        self.run_with_conn(&conn, mode, Utc::now().date_naive())
    }

    /// Scan with an explicit "today", which pins cutoffs in tests.
    pub fn run_with_conn(
        &self,
        conn: &Connection,
        mode: RetentionMode,
        today: NaiveDate,
    ) -> rusqlite::Result<RetentionReport> {
        let mut tables = Vec::with_capacity(TABLES.len());
        for spec in &TABLES {
            tables.push(self.clean_table(conn, spec, mode, today)?);
        }
        Ok(RetentionReport { mode, tables })
    }

    fn clean_table(
        &self,
        conn: &Connection,
        spec: &TableSpec,
        mode: RetentionMode,
        today: NaiveDate,
    ) -> rusqlite::Result<TableReport> {
        let cutoff = today - ChronoDuration::days(self.retention_days(spec.base) as i64);

        let mut expired = Vec::new();
        let mut rows = 0u64;
        for partition in partitions::list_partitions(conn, spec)? {
            // expired only when the whole window is behind the cutoff
            if partition.window_end() <= cutoff {
                rows += partitions::count_rows(conn, &partition.table)?;
                expired.push(partition.table);
            }
        }

        let mut dropped = 0;
        if mode == RetentionMode::Execute {
            for table in &expired {
                if partitions::drop_partition(conn, table)? {
                    dropped += 1;
                }
            }
        }

        Ok(TableReport {
            table: spec.base,
            cutoff,
            partitions: expired,
            rows,
            dropped,
        })
    }

    fn retention_days(&self, base: &str) -> u32 {
        match base {
            "traces" => self.config.traces_days,
            "spans" => self.config.spans_days,
            "llm_calls" => self.config.llm_calls_days,
            "chat_messages" => self.config.chat_messages_days,
            "document_events" => self.config.document_events_days,
            _ => self.config.traces_days,
        }
    }
}

fn log_report(report: &RetentionReport) {
    for table in &report.tables {
        if !table.partitions.is_empty() {
            tracing::info!(
                table = table.table,
                cutoff = %table.cutoff,
                partitions = table.partitions.len(),
                rows = table.rows,
                dropped = table.dropped,
                "retention: expired partitions"
            );
        }
    }
    tracing::info!(
        mode = ?report.mode,
        partitions = report.total_partitions(),
        rows = report.total_rows(),
        dropped = report.total_dropped(),
        "retention run complete"
    );
}
