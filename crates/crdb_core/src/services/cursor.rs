//! Statement cursor over a live connection.
//!
//! `Cursor` is the seam the executor, aggregator and reconciler talk to;
//! `PgCursor` implements it on tokio-postgres. Rows are read off the wire
//! during `execute` (the command tag only arrives after the last row) and
//! decoded into `CellValue`s by `fetch_all`, which hands them out once.

use crate::error::CrdbError;
use crate::models::{statement_body, CellValue, ColumnInfo, PgInterval, QueryParams, QueryType, Row, RowShape};
use crate::services::placeholders;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::StreamExt;
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::pin::pin;
use tokio_postgres::types::{accepts, to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::Client;
use tokio_util::bytes::BytesMut;
use uuid::Uuid;

/// One statement at a time against one connection.
#[async_trait]
pub trait Cursor: Send {
    /// Shape of the rows returned by `fetch_all`.
    fn row_shape(&self) -> RowShape;

    /// Execute a statement. Replaces any previous statement's results.
    async fn execute(&mut self, sql: &str, params: &QueryParams) -> Result<(), CrdbError>;

    /// Command tag of the last executed statement.
    fn status_message(&self) -> Option<String>;

    /// Rows affected or returned by the last executed statement.
    fn row_count(&self) -> Option<u64>;

    /// Result columns of the last executed statement.
    fn columns(&self) -> Vec<ColumnInfo>;

    /// Take all rows of the last statement.
    ///
    /// Fails with `NoResultsToFetch` when the statement has no result set.
    /// Rows are handed out once; a second call returns an empty list.
    async fn fetch_all(&mut self) -> Result<Vec<Row>, CrdbError>;
}

/// What `execute` captured for the current statement.
struct Executed {
    columns: Vec<ColumnInfo>,
    rows: Vec<tokio_postgres::Row>,
    status_message: String,
    row_count: Option<u64>,
}

/// Cursor over a tokio-postgres client.
pub struct PgCursor<'c> {
    client: &'c Client,
    shape: RowShape,
    autocommit: bool,
    in_transaction: &'c mut bool,
    executed: Option<Executed>,
}

impl<'c> PgCursor<'c> {
    pub(crate) fn new(
        client: &'c Client,
        shape: RowShape,
        autocommit: bool,
        in_transaction: &'c mut bool,
    ) -> Self {
        Self { client, shape, autocommit, in_transaction, executed: None }
    }
}

#[async_trait]
impl Cursor for PgCursor<'_> {
    fn row_shape(&self) -> RowShape {
        self.shape
    }

    async fn execute(&mut self, sql: &str, params: &QueryParams) -> Result<(), CrdbError> {
        self.executed = None;

        let translated = placeholders::translate(sql, params).map_err(CrdbError::invalid_argument)?;

        if !self.autocommit && !*self.in_transaction {
            tracing::debug!("Opening implicit transaction");
            self.client.batch_execute("BEGIN").await?;
            *self.in_transaction = true;
        }

        let statement = self.client.prepare(&translated.sql).await?;
        let bound: Vec<SqlParam<'_>> = translated.values.iter().map(SqlParam).collect();

        let stream = self
            .client
            .query_raw(&statement, bound.iter().map(|p| p as &(dyn ToSql + Sync)))
            .await?;
        let mut stream = pin!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        let rows_affected = stream.rows_affected();

        let columns: Vec<ColumnInfo> = statement
            .columns()
            .iter()
            .map(|col| ColumnInfo::new(col.name(), col.type_().oid(), col.type_().name()))
            .collect();

        let query_type = QueryType::detect(sql);
        let count = rows_affected.or(if columns.is_empty() { None } else { Some(rows.len() as u64) });
        let status_message = command_tag(sql, query_type, count);

        tracing::debug!(
            query_type = ?query_type,
            row_count = ?count,
            status = %status_message,
            "Statement executed"
        );

        self.executed = Some(Executed { columns, rows, status_message, row_count: count });
        Ok(())
    }

    fn status_message(&self) -> Option<String> {
        self.executed.as_ref().map(|e| e.status_message.clone())
    }

    fn row_count(&self) -> Option<u64> {
        self.executed.as_ref().and_then(|e| e.row_count)
    }

    fn columns(&self) -> Vec<ColumnInfo> {
        self.executed.as_ref().map(|e| e.columns.clone()).unwrap_or_default()
    }

    async fn fetch_all(&mut self) -> Result<Vec<Row>, CrdbError> {
        let executed = self
            .executed
            .as_mut()
            .ok_or_else(|| CrdbError::internal("fetch before execute"))?;
        if executed.columns.is_empty() {
            return Err(CrdbError::NoResultsToFetch);
        }

        let rows = std::mem::take(&mut executed.rows);
        rows.iter().map(|row| decode_row(row, self.shape)).collect()
    }
}

/// Server-style command tag for a finished statement.
///
/// The tag is derived from the statement text; leading comments are skipped.
pub fn command_tag(sql: &str, query_type: QueryType, count: Option<u64>) -> String {
    let n = count.unwrap_or(0);
    match query_type {
        QueryType::Select => format!("SELECT {n}"),
        QueryType::Show => format!("SHOW {n}"),
        QueryType::Insert | QueryType::Upsert => format!("INSERT 0 {n}"),
        QueryType::Update => format!("UPDATE {n}"),
        QueryType::Delete => format!("DELETE {n}"),
        QueryType::Other => {
            let mut words = statement_body(sql)
                .split_whitespace()
                .map(|w| w.trim_end_matches(';').to_uppercase());
            let first = words.next().unwrap_or_default();
            match first.as_str() {
                "CREATE" | "DROP" | "ALTER" | "GRANT" | "REVOKE" | "TRUNCATE" | "COMMENT" => {
                    match words.next() {
                        Some(second) if first == "CREATE" || first == "DROP" || first == "ALTER" => {
                            format!("{first} {second}")
                        }
                        _ => first,
                    }
                }
                _ => first,
            }
        }
    }
}

// ========== Decoding ==========

type DecodeError = Box<dyn Error + Sync + Send>;

fn decode_row(row: &tokio_postgres::Row, shape: RowShape) -> Result<Row, CrdbError> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, col) in row.columns().iter().enumerate() {
        let Cell(value) = row.try_get::<_, Cell>(idx).map_err(|e| {
            let detail = e.source().map_or_else(|| e.to_string(), |source| format!("{e}: {source}"));
            tracing::warn!(column = col.name(), type_name = col.type_().name(), error = %detail, "Failed to decode column");
            CrdbError::internal(format!("column \"{}\": {detail}", col.name()))
        })?;
        values.push(value);
    }

    Ok(match shape {
        RowShape::Tuple => Row::Tuple(values),
        RowShape::Keyed => Row::Keyed(
            row.columns().iter().map(|c| c.name().to_string()).zip(values).collect(),
        ),
    })
}

/// One cell decoded from its binary wire form according to the column type.
///
/// Arrays of any element type decode element-wise. Types without a dedicated
/// arm are accepted only when their wire form is printable text.
struct Cell(CellValue);

impl<'a> FromSql<'a> for Cell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let value = match *ty {
            Type::BOOL => CellValue::Bool(bool::from_sql(ty, raw)?),
            Type::CHAR => CellValue::Text(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
            Type::INT2 => CellValue::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => CellValue::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => CellValue::Int(i64::from_sql(ty, raw)?),
            Type::OID => CellValue::Int(u32::from_sql(ty, raw)?.into()),
            Type::REGCLASS | Type::REGPROC | Type::REGPROCEDURE | Type::REGTYPE | Type::REGNAMESPACE => {
                CellValue::Int(reg_oid(raw)?.into())
            }
            Type::FLOAT4 => CellValue::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => CellValue::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => numeric_cell(&numeric_text(raw)?),
            Type::INTERVAL => CellValue::Interval(PgInterval::from_sql(ty, raw)?),
            Type::UUID => CellValue::Text(Uuid::from_sql(ty, raw)?.to_string()),
            Type::JSON | Type::JSONB => CellValue::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::TIMESTAMP => CellValue::Text(NaiveDateTime::from_sql(ty, raw)?.to_string()),
            Type::TIMESTAMPTZ => CellValue::Text(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
            Type::DATE => CellValue::Text(NaiveDate::from_sql(ty, raw)?.to_string()),
            Type::TIME => CellValue::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMETZ => CellValue::Text(timetz_text(raw)?),
            Type::INET | Type::CIDR => CellValue::Text(inet_text(raw, *ty == Type::CIDR)?),
            Type::BYTEA => CellValue::Text(hex_bytes(<&[u8] as FromSql>::from_sql(ty, raw)?)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                CellValue::Text(String::from_sql(ty, raw)?)
            }
            _ => match ty.kind() {
                Kind::Array(_) => CellValue::Array(
                    Vec::<Cell>::from_sql(ty, raw)?.into_iter().map(|Cell(v)| v).collect(),
                ),
                Kind::Enum(_) => CellValue::Text(String::from_sql(ty, raw)?),
                _ => CellValue::Text(printable_text(ty, raw)?),
            },
        };
        Ok(Cell(value))
    }

    fn from_sql_null(_: &Type) -> Result<Self, DecodeError> {
        Ok(Cell(CellValue::Null))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Decimal text of a binary NUMERIC: `NaN`, `Infinity`, `-Infinity` or `[-]digits[.digits]`.
///
/// Wire layout: ndigits, weight, sign, dscale (all u16/i16), then ndigits
/// base-10000 digits. Digit `i` has weight `weight - i`.
fn numeric_text(raw: &[u8]) -> Result<String, DecodeError> {
    let word = |at: usize| -> Result<u16, DecodeError> {
        raw.get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| format!("invalid numeric length {}", raw.len()).into())
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    let negative = match sign {
        0x0000 => false,
        0x4000 => true,
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    };
    if raw.len() != 8 + ndigits * 2 {
        return Err(format!("invalid numeric length {}", raw.len()).into());
    }
    let digits: Vec<u16> = raw[8..].chunks_exact(2).map(|b| u16::from_be_bytes([b[0], b[1]])).collect();
    let digit_at = |idx: i32| -> u16 {
        usize::try_from(idx).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut text = String::new();
    if negative {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        let _ = write!(text, "{}", digit_at(0));
        for idx in 1..=weight {
            let _ = write!(text, "{:04}", digit_at(idx));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit_at(idx));
            idx += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

/// A NUMERIC value: `Decimal` when it fits, otherwise a float.
///
/// Non-finite values stay textual since JSON has no spelling for them.
fn numeric_cell(text: &str) -> CellValue {
    match text {
        "NaN" | "Infinity" | "-Infinity" => CellValue::Text(text.to_string()),
        _ => match text.parse::<Decimal>() {
            Ok(decimal) => CellValue::Decimal(decimal),
            Err(_) => text
                .parse::<f64>()
                .map(CellValue::Float)
                .unwrap_or_else(|_| CellValue::Text(text.to_string())),
        },
    }
}

/// Binary TIMETZ: microseconds since midnight (i64), then the zone in seconds west of UTC (i32).
fn timetz_text(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() != 12 {
        return Err(format!("invalid timetz length {}", raw.len()).into());
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into()?);
    let zone = i32::from_be_bytes(raw[8..12].try_into()?);

    let seconds = u32::try_from(micros / 1_000_000)?;
    let nanos = u32::try_from(micros % 1_000_000)? * 1_000;
    let mut text = NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
        .map(|time| time.to_string())
        .unwrap_or_else(|| "24:00:00".to_string());

    let offset = -zone;
    let abs = offset.unsigned_abs();
    let _ = write!(text, "{}{:02}", if offset < 0 { '-' } else { '+' }, abs / 3600);
    if abs % 3600 != 0 {
        let _ = write!(text, ":{:02}", (abs % 3600) / 60);
    }
    if abs % 60 != 0 {
        let _ = write!(text, ":{:02}", abs % 60);
    }
    Ok(text)
}

/// Binary INET/CIDR: family, mask bits, is_cidr, address length, address bytes.
///
/// A host address with a full mask renders without the `/bits` suffix.
fn inet_text(raw: &[u8], cidr: bool) -> Result<String, DecodeError> {
    let [family, bits, _, len, addr @ ..] = raw else {
        return Err(format!("invalid inet length {}", raw.len()).into());
    };
    if addr.len() != usize::from(*len) {
        return Err(format!("invalid inet address length {len}").into());
    }
    let (ip, full) = match *family {
        2 => (IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(addr)?)), 32),
        3 => (IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(addr)?)), 128),
        other => return Err(format!("invalid inet family {other}").into()),
    };
    Ok(if cidr || *bits != full { format!("{ip}/{bits}") } else { ip.to_string() })
}

/// Binary reg* values are the referenced object's OID.
fn reg_oid(raw: &[u8]) -> Result<u32, DecodeError> {
    Ok(u32::from_be_bytes(raw.try_into().map_err(|_| format!("invalid oid length {}", raw.len()))?))
}

/// Wire bytes of a type without a dedicated decoder, when they read as text.
fn printable_text(ty: &Type, raw: &[u8]) -> Result<String, DecodeError> {
    match std::str::from_utf8(raw) {
        Ok(text) if !text.chars().any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r')) => {
            Ok(text.to_string())
        }
        _ => Err(format!("unsupported column type {}", ty.name()).into()),
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Binary INTERVAL: microseconds (i64), days (i32), months (i32), big-endian.
impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        if raw.len() != 16 {
            return Err(format!("invalid interval length {}", raw.len()).into());
        }
        let microseconds = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?);
        let months = i32::from_be_bytes(raw[12..16].try_into()?);
        Ok(PgInterval::new(months, days, microseconds))
    }

    accepts!(INTERVAL);
}

// ========== Parameter binding ==========

/// A JSON argument bound to whatever type the server inferred for its placeholder.
#[derive(Debug)]
struct SqlParam<'a>(&'a serde_json::Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        let value = self.0;
        if value.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => as_bool(value)?.to_sql(ty, out),
            Type::INT2 => i16::try_from(as_i64(value)?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(as_i64(value)?)?.to_sql(ty, out),
            Type::INT8 => as_i64(value)?.to_sql(ty, out),
            Type::FLOAT4 => (as_f64(value)? as f32).to_sql(ty, out),
            Type::FLOAT8 => as_f64(value)?.to_sql(ty, out),
            Type::NUMERIC => as_decimal(value)?.to_sql(ty, out),
            Type::JSON | Type::JSONB => value.to_sql(ty, out),
            Type::UUID => Uuid::parse_str(&as_text(value))?.to_sql(ty, out),
            Type::DATE => NaiveDate::parse_from_str(&as_text(value), "%Y-%m-%d")?.to_sql(ty, out),
            Type::TIMESTAMP => parse_timestamp(&as_text(value))?.to_sql(ty, out),
            Type::TIMESTAMPTZ => {
                DateTime::parse_from_rfc3339(&as_text(value))?.with_timezone(&Utc).to_sql(ty, out)
            }
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => match value {
                serde_json::Value::Array(items) => {
                    items.iter().map(as_text).collect::<Vec<_>>().to_sql(ty, out)
                }
                _ => Err(format!("expected a list for parameter of type {ty}").into()),
            },
            Type::INT8_ARRAY => match value {
                serde_json::Value::Array(items) => {
                    items.iter().map(as_i64).collect::<Result<Vec<_>, _>>()?.to_sql(ty, out)
                }
                _ => Err(format!("expected a list for parameter of type {ty}").into()),
            },
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
                as_text(value).to_sql(ty, out)
            }
            _ => Err(format!("cannot bind {value} to a parameter of type {ty}").into()),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

type BindError = DecodeError;

fn as_bool(value: &serde_json::Value) -> Result<bool, BindError> {
    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "on" | "1" => Ok(true),
            "false" | "f" | "no" | "off" | "0" => Ok(false),
            _ => Err(format!("invalid boolean: {s}").into()),
        },
        other => Err(format!("invalid boolean: {other}").into()),
    }
}

fn as_i64(value: &serde_json::Value) -> Result<i64, BindError> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or_else(|| format!("invalid integer: {n}").into()),
        serde_json::Value::String(s) => Ok(s.trim().parse::<i64>()?),
        other => Err(format!("invalid integer: {other}").into()),
    }
}

fn as_f64(value: &serde_json::Value) -> Result<f64, BindError> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| format!("invalid float: {n}").into()),
        serde_json::Value::String(s) => Ok(s.trim().parse::<f64>()?),
        other => Err(format!("invalid float: {other}").into()),
    }
}

fn as_decimal(value: &serde_json::Value) -> Result<Decimal, BindError> {
    match value {
        serde_json::Value::Number(n) => Ok(n.to_string().parse::<Decimal>()?),
        serde_json::Value::String(s) => Ok(s.trim().parse::<Decimal>()?),
        other => Err(format!("invalid decimal: {other}").into()),
    }
}

/// Text form of a scalar; strings are used verbatim.
fn as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
}
