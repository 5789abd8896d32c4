//! Partition-window math and partition-table primitives.
//!
//! A partition is a physical table covering one fixed time window, named
//! `<base>_<YYYYMMDD>` after the window's start date. Daily windows cover
//! one day; weekly windows cover seven days aligned to Monday, so both
//! intervals share one naming scheme. Queries that carry a time range only
//! touch partitions whose window overlaps it; retention drops whole tables.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rusqlite::Connection;

use crate::store::schema;

/// Fixed partition interval for one base table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionInterval {
    Daily,
    Weekly,
}

impl PartitionInterval {
    /// Start date of the window containing `ts`.
    pub fn window_start(&self, ts: DateTime<Utc>) -> NaiveDate {
        let date = ts.date_naive();
        match self {
            PartitionInterval::Daily => date,
            PartitionInterval::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
        }
    }

    /// Window length in days.
    pub fn window_days(&self) -> i64 {
        match self {
            PartitionInterval::Daily => 1,
            PartitionInterval::Weekly => 7,
        }
    }
}

/// One partitioned base table: its name, interval, and DDL template.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub base: &'static str,
    pub interval: PartitionInterval,
    pub ddl: &'static str,
}

/// All partitioned tables, high-volume daily tables first.
pub const TABLES: [TableSpec; 5] = [
    TableSpec {
        base: "traces",
        interval: PartitionInterval::Daily,
        ddl: schema::TRACES_DDL,
    },
    TableSpec {
        base: "spans",
        interval: PartitionInterval::Daily,
        ddl: schema::SPANS_DDL,
    },
    TableSpec {
        base: "llm_calls",
        interval: PartitionInterval::Daily,
        ddl: schema::LLM_CALLS_DDL,
    },
    TableSpec {
        base: "chat_messages",
        interval: PartitionInterval::Weekly,
        ddl: schema::CHAT_MESSAGES_DDL,
    },
    TableSpec {
        base: "document_events",
        interval: PartitionInterval::Weekly,
        ddl: schema::DOCUMENT_EVENTS_DDL,
    },
];

pub fn spec_for(base: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.base == base)
}

/// Table name for the window starting at `window_start`.
pub fn partition_name(base: &str, window_start: NaiveDate) -> String {
    format!("{}_{}", base, window_start.format("%Y%m%d"))
}

/// Table name for the window containing `ts`.
pub fn partition_for(spec: &TableSpec, ts: DateTime<Utc>) -> String {
    partition_name(spec.base, spec.interval.window_start(ts))
}

/// Parse the window start date back out of a partition table name.
/// Returns None for names that are not partitions of `base`.
pub fn parse_partition_date(base: &str, table_name: &str) -> Option<NaiveDate> {
    let suffix = table_name.strip_prefix(base)?.strip_prefix('_')?;
    NaiveDate::parse_from_str(suffix, "%Y%m%d").ok()
}

/// A partition table that physically exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub table: String,
    pub window_start: NaiveDate,
    pub window_days: i64,
}

impl PartitionInfo {
    /// First date no longer covered by this partition's window.
    pub fn window_end(&self) -> NaiveDate {
        self.window_start + Duration::days(self.window_days)
    }
}

/// Create the partition covering `ts` if it does not exist yet, returning
/// its table name.
pub fn ensure_partition(
    conn: &Connection,
    spec: &TableSpec,
    ts: DateTime<Utc>,
) -> rusqlite::Result<String> {
    let table = partition_for(spec, ts);
    conn.execute_batch(&schema::render_ddl(spec.ddl, &table))?;
    Ok(table)
}

/// Enumerate existing partitions of a base table, oldest first.
pub fn list_partitions(conn: &Connection, spec: &TableSpec) -> rusqlite::Result<Vec<PartitionInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE ?1 ORDER BY name",
    )?;
    let pattern = format!("{}_%", spec.base);
    let names = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;

    let mut partitions = Vec::new();
    for name in names {
        let name = name?;
        if let Some(window_start) = parse_partition_date(spec.base, &name) {
            partitions.push(PartitionInfo {
                table: name,
                window_start,
                window_days: spec.interval.window_days(),
            });
        }
    }
    Ok(partitions)
}

/// Count rows in a partition table.
pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })?;
    Ok(count.max(0) as u64)
}

/// Drop a partition table. Returns whether it existed; re-dropping an
/// already-absent partition is a no-op, not an error.
pub fn drop_partition(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?;
    if exists {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", table))?;
    }
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_window_is_the_date_itself() {
        let start = PartitionInterval::Daily.window_start(ts(2026, 8, 25));
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 25).unwrap());
    }

    #[test]
    fn test_weekly_window_aligns_to_monday() {
        // 2026-08-25 is a Tuesday; its week starts Monday 2026-08-24
        let start = PartitionInterval::Weekly.window_start(ts(2026, 8, 25));
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());

        // a Monday maps to itself
        let start = PartitionInterval::Weekly.window_start(ts(2026, 8, 24));
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
    }

    #[test]
    fn test_partition_name_round_trip() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let name = partition_name("traces", date);
        assert_eq!(name, "traces_20260105");
        assert_eq!(parse_partition_date("traces", &name), Some(date));
        assert_eq!(parse_partition_date("spans", &name), None);
        assert_eq!(parse_partition_date("traces", "traces_not_a_date"), None);
    }

    #[test]
    fn test_ensure_list_drop_cycle() {
        let conn = Connection::open_in_memory().unwrap();
        let spec = spec_for("traces").unwrap();

        let t1 = ensure_partition(&conn, spec, ts(2026, 8, 24)).unwrap();
        let t2 = ensure_partition(&conn, spec, ts(2026, 8, 25)).unwrap();
        // idempotent create
        ensure_partition(&conn, spec, ts(2026, 8, 25)).unwrap();

        let listed = list_partitions(&conn, spec).unwrap();
        assert_eq!(
            listed.iter().map(|p| p.table.as_str()).collect::<Vec<_>>(),
            vec![t1.as_str(), t2.as_str()]
        );

        assert!(drop_partition(&conn, &t1).unwrap());
        assert!(!drop_partition(&conn, &t1).unwrap());
        assert_eq!(list_partitions(&conn, spec).unwrap().len(), 1);
    }
}
