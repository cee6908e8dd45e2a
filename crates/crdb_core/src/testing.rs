//! Scripted cursor for unit tests.
//!
//! Statements are matched by case-insensitive prefix. Each prefix holds a
//! queue of outcomes; the last one repeats. Unmatched statements get the
//! default outcome.

use crate::error::CrdbError;
use crate::models::{CellValue, ColumnInfo, QueryParams, QueryType, Row, RowShape};
use crate::services::cursor::{command_tag, Cursor};

use async_trait::async_trait;
use std::collections::VecDeque;

/// What a scripted statement does.
#[derive(Debug, Clone)]
pub(crate) enum Outcome {
    Rows { columns: Vec<String>, rows: Vec<Vec<CellValue>> },
    Command { tag: String, count: Option<u64> },
    ExecuteError(String),
    FetchError(String),
}

impl Outcome {
    pub(crate) fn rows(columns: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        Self::Rows { columns: columns.iter().map(|c| c.to_string()).collect(), rows }
    }

    pub(crate) fn command(tag: &str, count: Option<u64>) -> Self {
        Self::Command { tag: tag.to_string(), count }
    }
}

struct Current {
    columns: Vec<ColumnInfo>,
    status: String,
    count: Option<u64>,
    rows: Option<Vec<Row>>,
    fetch_error: Option<String>,
}

pub(crate) struct FakeCursor {
    shape: RowShape,
    default: Outcome,
    routes: Vec<(String, VecDeque<Outcome>)>,
    log: Vec<(String, QueryParams)>,
    current: Option<Current>,
}

impl FakeCursor {
    pub(crate) fn new(shape: RowShape) -> Self {
        Self {
            shape,
            default: Outcome::command("OK", None),
            routes: Vec::new(),
            log: Vec::new(),
            current: None,
        }
    }

    pub(crate) fn with_result(mut self, columns: &[&str], rows: Vec<Vec<CellValue>>) -> Self {
        self.default = Outcome::rows(columns, rows);
        self
    }

    pub(crate) fn with_command(mut self, tag: &str, count: Option<u64>) -> Self {
        self.default = Outcome::command(tag, count);
        self
    }

    pub(crate) fn with_execute_error(mut self, message: &str) -> Self {
        self.default = Outcome::ExecuteError(message.to_string());
        self
    }

    pub(crate) fn with_fetch_error(mut self, message: &str) -> Self {
        self.default = Outcome::FetchError(message.to_string());
        self
    }

    /// Script statements starting with `prefix`. Repeated calls queue outcomes.
    pub(crate) fn on(mut self, prefix: &str, outcome: Outcome) -> Self {
        let prefix = prefix.to_uppercase();
        match self.routes.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, queue)) => queue.push_back(outcome),
            None => self.routes.push((prefix, VecDeque::from([outcome]))),
        }
        self
    }

    /// Statements executed so far, in order.
    pub(crate) fn executed(&self) -> Vec<&str> {
        self.log.iter().map(|(sql, _)| sql.as_str()).collect()
    }

    /// Parameters passed with each executed statement.
    pub(crate) fn params(&self) -> Vec<QueryParams> {
        self.log.iter().map(|(_, params)| params.clone()).collect()
    }

    fn next_outcome(&mut self, sql: &str) -> Outcome {
        let upper = sql.trim_start().to_uppercase();
        let route = self
            .routes
            .iter_mut()
            .filter(|(prefix, _)| upper.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());
        match route {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| self.default.clone()),
            Some((_, queue)) => queue.front().cloned().unwrap_or_else(|| self.default.clone()),
            None => self.default.clone(),
        }
    }

    fn shape_row(&self, columns: &[String], values: Vec<CellValue>) -> Row {
        match self.shape {
            RowShape::Tuple => Row::Tuple(values),
            RowShape::Keyed => Row::Keyed(columns.iter().cloned().zip(values).collect()),
        }
    }
}

#[async_trait]
impl Cursor for FakeCursor {
    fn row_shape(&self) -> RowShape {
        self.shape
    }

    async fn execute(&mut self, sql: &str, params: &QueryParams) -> Result<(), CrdbError> {
        self.log.push((sql.to_string(), params.clone()));
        self.current = None;

        let current = match self.next_outcome(sql) {
            Outcome::ExecuteError(message) => {
                return Err(CrdbError::Database { message, detail: None, hint: None, code: None });
            }
            Outcome::FetchError(message) => Current {
                columns: vec![ColumnInfo::new("?column?", 25, "text")],
                status: command_tag(sql, QueryType::detect(sql), Some(0)),
                count: Some(0),
                rows: None,
                fetch_error: Some(message),
            },
            Outcome::Command { tag, count } => Current {
                columns: Vec::new(),
                status: tag,
                count,
                rows: None,
                fetch_error: None,
            },
            Outcome::Rows { columns, rows } => {
                let count = rows.len() as u64;
                let shaped = rows.into_iter().map(|values| self.shape_row(&columns, values)).collect();
                Current {
                    columns: columns.iter().map(|name| ColumnInfo::new(name.as_str(), 25, "text")).collect(),
                    status: command_tag(sql, QueryType::detect(sql), Some(count)),
                    count: Some(count),
                    rows: Some(shaped),
                    fetch_error: None,
                }
            }
        };
        self.current = Some(current);
        Ok(())
    }

    fn status_message(&self) -> Option<String> {
        self.current.as_ref().map(|c| c.status.clone())
    }

    fn row_count(&self) -> Option<u64> {
        self.current.as_ref().and_then(|c| c.count)
    }

    fn columns(&self) -> Vec<ColumnInfo> {
        self.current.as_ref().map(|c| c.columns.clone()).unwrap_or_default()
    }

    async fn fetch_all(&mut self) -> Result<Vec<Row>, CrdbError> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| CrdbError::internal("fetch before execute"))?;
        if let Some(message) = &current.fetch_error {
            return Err(CrdbError::connection(message.clone()));
        }
        match current.rows.as_mut() {
            Some(rows) => Ok(std::mem::take(rows)),
            None => Err(CrdbError::NoResultsToFetch),
        }
    }
}
