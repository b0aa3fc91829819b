//! Buffers destination SQL statements and flushes them as a single
//! transaction once a threshold is crossed, so a merge of millions of rows
//! doesn't pay a commit's fsync cost per row.

use anyhow::Context;
use rusqlite::Connection;

/// Buffers pending inserts against a single destination connection.
///
/// Two kinds of statement go through here: progress-contributing inserts
/// (model-table rows and identity-map rows that stand in for a model-table
/// row that was skipped as a duplicate), and supporting inserts (identity-
/// map rows that accompany a model-table row already counted). Only the
/// former move the needle on the model's progress total.
pub struct InsertBatcher<'conn> {
    conn: &'conn Connection,
    threshold: usize,
    pending: Vec<String>,
    progress_since_flush: usize,
}

impl<'conn> InsertBatcher<'conn> {
    pub fn new(conn: &'conn Connection, threshold: usize) -> Self {
        Self {
            conn,
            threshold: threshold.max(1),
            pending: Vec::new(),
            progress_since_flush: 0,
        }
    }

    /// Queue a progress-contributing insert.
    pub fn insert(&mut self, stmt: String) -> anyhow::Result<usize> {
        self.pending.push(stmt);
        self.progress_since_flush += 1;
        self.maybe_flush()
    }

    /// Queue an insert that doesn't carry its own progress credit.
    pub fn insert_supporting(&mut self, stmt: String) -> anyhow::Result<usize> {
        self.pending.push(stmt);
        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> anyhow::Result<usize> {
        if self.pending.len() >= self.threshold {
            self.flush()
        } else {
            Ok(0)
        }
    }

    /// Commit everything buffered as one transaction. Returns the number
    /// of progress-contributing rows just committed, zeroing the running
    /// count; returns 0 without touching the database if nothing is
    /// pending.
    pub fn flush(&mut self) -> anyhow::Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mut batch = String::from("BEGIN TRANSACTION;\n");
        for stmt in &self.pending {
            batch.push_str(stmt);
            if !stmt.trim_end().ends_with(';') {
                batch.push(';');
            }
            batch.push('\n');
        }
        batch.push_str("COMMIT;");

        if let Err(e) = self.conn.execute_batch(&batch) {
            // Leave no half-applied transaction behind even though the
            // merge is about to abort fatally anyway.
            let _ = self.conn.execute_batch("ROLLBACK;");
            return Err(e).context("failed to commit batch of destination inserts");
        }

        self.pending.clear();
        let committed = self.progress_since_flush;
        self.progress_since_flush = 0;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_at_threshold_and_reports_progress() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        let mut batcher = InsertBatcher::new(&conn, 3);
        let mut flush_counts = Vec::new();
        for v in 0..10 {
            let count = batcher
                .insert(format!("INSERT INTO t (v) VALUES ({v})"))
                .unwrap();
            if count > 0 {
                flush_counts.push(count);
            }
        }
        let final_flush = batcher.flush().unwrap();
        if final_flush > 0 {
            flush_counts.push(final_flush);
        }

        assert_eq!(flush_counts, vec![3, 3, 3, 1]);
        assert_eq!(flush_counts.iter().sum::<usize>(), 10);

        let stored: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, 10);
    }

    #[test]
    fn supporting_inserts_do_not_count_toward_progress() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        let mut batcher = InsertBatcher::new(&conn, 100);
        batcher.insert_supporting("INSERT INTO t (v) VALUES (1)".into()).unwrap();
        batcher.insert_supporting("INSERT INTO t (v) VALUES (2)".into()).unwrap();
        let committed = batcher.flush().unwrap();

        assert_eq!(committed, 0);
        let stored: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, 2);
    }

    #[test]
    fn flush_on_empty_buffer_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        let mut batcher = InsertBatcher::new(&conn, 10);
        assert_eq!(batcher.flush().unwrap(), 0);
    }

    #[test]
    fn a_failing_statement_aborts_the_whole_batch() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();

        let mut batcher = InsertBatcher::new(&conn, 100);
        batcher.insert("INSERT INTO t (v) VALUES (1)".into()).unwrap();
        batcher.insert("INSERT INTO nonexistent (v) VALUES (2)".into()).unwrap();
        assert!(batcher.flush().is_err());

        // SQLite runs execute_batch's statements inside the explicit
        // BEGIN/COMMIT we wrote; the failed statement means COMMIT never
        // ran, so nothing was persisted.
        let stored: i64 = conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, 0);
    }
}
