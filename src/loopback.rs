//! In-process backend with session accounting and failure injection.
//!
//! `LoopbackBackend` hands out sessions that live entirely in memory.
//! Clones share one state, so a test can keep a clone to inspect how many
//! sessions are open, flip the backend "down", or make the next connects
//! fail. Sessions implement [`Executor`] over result sets registered with
//! [`LoopbackBackend::register_query`].

use crate::backend::{Backend, Session};
use crate::connection::Credentials;
use crate::error::{Error, Result};
use crate::executor::{Executor, Row, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    open_sessions: AtomicUsize,
    total_opened: AtomicU64,
    refuse_next: AtomicUsize,
    down: AtomicBool,
    fail_pings: AtomicBool,
    fail_close: AtomicBool,
    queries: Mutex<HashMap<String, ResultSet>>,
    last_binds: Mutex<Option<(Vec<Value>, Vec<(String, Value)>)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Backend whose sessions are plain in-memory objects.
#[derive(Debug, Clone, Default)]
pub struct LoopbackBackend {
    state: Arc<LoopbackState>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.state.open_sessions.load(Ordering::SeqCst)
    }

    /// Sessions opened since creation.
    pub fn total_opened(&self) -> u64 {
        self.state.total_opened.load(Ordering::SeqCst)
    }

    /// Refuse the next `n` connect attempts.
    pub fn refuse_next(&self, n: usize) {
        self.state.refuse_next.store(n, Ordering::SeqCst);
    }

    /// While down, connects are refused and pings fail.
    pub fn set_down(&self, down: bool) {
        self.state.down.store(down, Ordering::SeqCst);
    }

    /// Make pings fail while connects still succeed.
    pub fn fail_pings(&self, fail: bool) {
        self.state.fail_pings.store(fail, Ordering::SeqCst);
    }

    /// Make session release report an error (the session is still released).
    pub fn fail_close(&self, fail: bool) {
        self.state.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Answer `sql` (compared with whitespace collapsed) with these rows.
    pub fn register_query(&self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        lock(&self.state.queries).insert(normalize_sql(sql), ResultSet { columns, rows });
    }

    /// Binds passed to the most recent `execute`.
    pub fn last_binds(&self) -> Option<(Vec<Value>, Vec<(String, Value)>)> {
        lock(&self.state.last_binds).clone()
    }
}

impl Backend for LoopbackBackend {
    type Session = LoopbackSession;

    async fn open(&self, credentials: &Credentials) -> Result<LoopbackSession> {
        let refused = self
            .state
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused || self.state.down.load(Ordering::SeqCst) {
            return Err(Error::ConnectionRefused {
                message: format!("loopback refused {}", credentials.target),
            });
        }

        self.state.open_sessions.fetch_add(1, Ordering::SeqCst);
        self.state.total_opened.fetch_add(1, Ordering::SeqCst);
        Ok(LoopbackSession {
            state: Arc::clone(&self.state),
            current: None,
        })
    }
}

/// Session produced by [`LoopbackBackend`].
#[derive(Debug)]
pub struct LoopbackSession {
    state: Arc<LoopbackState>,
    current: Option<(Arc<[String]>, VecDeque<Vec<Value>>)>,
}

impl Session for LoopbackSession {
    async fn ping(&mut self) -> Result<()> {
        if self.state.down.load(Ordering::SeqCst)
            || self.state.fail_pings.load(Ordering::SeqCst)
        {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn close(self) -> Result<()> {
        // Drop does the accounting.
        if self.state.fail_close.load(Ordering::SeqCst) {
            return Err(Error::protocol("loopback release failed"));
        }
        Ok(())
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.state.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Executor for LoopbackSession {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        named: &[(&str, Value)],
    ) -> Result<()> {
        if self.state.down.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        *lock(&self.state.last_binds) = Some((
            params.to_vec(),
            named
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        ));

        let result_set = lock(&self.state.queries).get(&normalize_sql(sql)).cloned();
        match result_set {
            Some(ResultSet { columns, rows }) => {
                self.current = Some((columns, rows.into()));
                Ok(())
            }
            None => {
                self.current = None;
                Err(Error::query(format!("no result registered for: {sql}")))
            }
        }
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        let (columns, rows) = self
            .current
            .as_mut()
            .ok_or_else(|| Error::fetch("no statement executed"))?;
        Ok(rows
            .pop_front()
            .map(|values| Row::new(values, Arc::clone(columns))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_accounting() {
        let backend = LoopbackBackend::new();
        let creds = Credentials::new("u", "p", "loopback");

        let a = backend.open(&creds).await.unwrap();
        let b = backend.open(&creds).await.unwrap();
        assert_eq!(backend.open_sessions(), 2);

        a.close().await.unwrap();
        drop(b);
        assert_eq!(backend.open_sessions(), 0);
        assert_eq!(backend.total_opened(), 2);
    }

    #[tokio::test]
    async fn test_refuse_next_counts_down() {
        let backend = LoopbackBackend::new();
        let creds = Credentials::new("u", "p", "loopback");
        backend.refuse_next(2);

        assert!(backend.open(&creds).await.is_err());
        assert!(backend.open(&creds).await.is_err());
        assert!(backend.open(&creds).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_unregistered_query() {
        let backend = LoopbackBackend::new();
        let mut session = backend
            .open(&Credentials::new("u", "p", "loopback"))
            .await
            .unwrap();

        assert!(matches!(
            session.execute("SELECT 1 FROM DUAL", &[], &[]).await,
            Err(Error::Query { .. })
        ));
        assert!(matches!(session.fetch_one().await, Err(Error::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_execute_records_binds() {
        let backend = LoopbackBackend::new();
        backend.register_query(
            "SELECT :1 rn FROM DUAL",
            &["RN"],
            vec![vec![Value::from(2i64)]],
        );
        let mut session = backend
            .open(&Credentials::new("u", "p", "loopback"))
            .await
            .unwrap();

        session
            .execute(
                "SELECT :1 rn\n  FROM DUAL",
                &[Value::from(2i64)],
                &[("x", Value::Null)],
            )
            .await
            .unwrap();
        let row = session.fetch_one().await.unwrap().unwrap();
        assert_eq!(row.get_by_name("rn"), Some(&Value::Number("2".into())));

        let (params, named) = backend.last_binds().unwrap();
        assert_eq!(params, vec![Value::from(2i64)]);
        assert_eq!(named[0].0, "x");
    }

    #[tokio::test]
    async fn test_cursor_through_manager() {
        use crate::connection::ConnectionManager;

        let backend = LoopbackBackend::new();
        let sql = "SELECT level FROM DUAL CONNECT BY level <= 10";
        backend.register_query(
            sql,
            &["LEVEL"],
            (1..=10i64).map(|n| vec![Value::from(n)]).collect(),
        );
        let mut manager =
            ConnectionManager::new(backend.clone(), Credentials::new("u", "p", "loopback"));
        manager.connect().await.unwrap();

        let session = manager.session_mut().unwrap();
        session.execute(sql, &[], &[]).await.unwrap();
        let first = session.fetch_one().await.unwrap().unwrap();
        assert_eq!(first.get(0).and_then(Value::to_i64), Some(1));
        assert_eq!(session.fetch_many(3).await.unwrap().len(), 3);
        let rest = session.fetch_all().await.unwrap();
        assert_eq!(rest.len(), 6);
        assert_eq!(
            rest[5].get_by_name("level").and_then(Value::to_i64),
            Some(10)
        );
        assert!(session.fetch_one().await.unwrap().is_none());

        manager.disconnect().await.unwrap();
        assert_eq!(backend.open_sessions(), 0);
    }
}
