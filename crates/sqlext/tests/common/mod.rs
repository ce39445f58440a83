//! Shared mock connection for sqlext integration tests.
#![allow(dead_code)]
#![allow(clippy::manual_async_fn)] // Mock trait impls must match trait signatures

use sqlext::{
    ConnectionState, Cx, Dialect, Error, Outcome, QueryError, QueryErrorKind, ResultSet, Result,
    Statement, StoreExecutor, Value,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockState {
    pub open: bool,
    pub opens: usize,
    pub closes: usize,
    pub executed: Vec<Statement>,
    /// Scripted replies, one per round trip. An empty queue answers with
    /// one empty result set per expected set.
    pub replies: VecDeque<std::result::Result<Vec<ResultSet>, String>>,
}

#[derive(Debug, Clone)]
pub struct MockConnection {
    pub state: Arc<Mutex<MockState>>,
    dialect: Dialect,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::with_dialect(Dialect::Postgres)
    }

    pub fn with_dialect(dialect: Dialect) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            dialect,
        }
    }

    pub fn opened() -> Self {
        let conn = Self::new();
        conn.state.lock().expect("lock poisoned").open = true;
        conn
    }

    pub fn reply(&self, sets: Vec<ResultSet>) {
        self.state
            .lock()
            .expect("lock poisoned")
            .replies
            .push_back(Ok(sets));
    }

    pub fn fail(&self, message: &str) {
        self.state
            .lock()
            .expect("lock poisoned")
            .replies
            .push_back(Err(message.to_string()));
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.state.lock().expect("lock poisoned").executed.clone()
    }

    pub fn round_trips(&self) -> usize {
        self.state.lock().expect("lock poisoned").executed.len()
    }

    pub fn opens_and_closes(&self) -> (usize, usize) {
        let guard = self.state.lock().expect("lock poisoned");
        (guard.opens, guard.closes)
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().expect("lock poisoned").open
    }
}

impl StoreExecutor for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn state(&self) -> ConnectionState {
        if self.is_open() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn open(&self, _cx: &Cx) -> impl Future<Output = Outcome<(), Error>> + Send {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.open = true;
        guard.opens += 1;
        async { Outcome::Ok(()) }
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.open = false;
        guard.closes += 1;
        Ok(())
    }

    fn execute_multi_result(
        &self,
        _cx: &Cx,
        statement: &Statement,
        expected_sets: usize,
    ) -> impl Future<Output = Outcome<Vec<ResultSet>, Error>> + Send {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.executed.push(statement.clone());
        let outcome = match guard.replies.pop_front() {
            Some(Ok(sets)) => Outcome::Ok(sets),
            Some(Err(message)) => Outcome::Err(Error::Query(QueryError {
                kind: QueryErrorKind::Database,
                sql: Some(statement.sql().to_string()),
                sqlstate: Some("XX000".to_string()),
                message,
                source: None,
            })),
            None => Outcome::Ok(vec![ResultSet::default(); expected_sets]),
        };
        async move { outcome }
    }
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn scalar(column: &str, value: Value) -> ResultSet {
    ResultSet::from_values(vec![column.to_string()], vec![vec![value]])
}

pub fn rows(columns: &[&str], values: Vec<Vec<Value>>) -> ResultSet {
    ResultSet::from_values(columns.iter().map(|c| (*c).to_string()).collect(), values)
}
