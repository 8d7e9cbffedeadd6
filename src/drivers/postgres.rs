use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgRow};
use sqlx::{
    Column as _, Connection as _, Executor as _, PgConnection, Row as _, Statement as _,
    TypeInfo as _, ValueRef as _,
};
use uuid::Uuid;

use crate::{Connection, ConnectionConfig, Connector, QueryResult, SqlValue};

/// Connector that opens one PostgreSQL connection per unit of work.
///
/// There is no pool and no retry: a failed connect is reported as-is.
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    application_name: Option<String>,
}

impl PgConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `name` as `application_name` to the server.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    fn connect_options(&self, config: &ConnectionConfig) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(config.host())
            .port(config.port())
            .username(config.user())
            .password(config.password())
            .database(config.database());

        match &self.application_name {
            Some(name) => options.application_name(name),
            None => options,
        }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgSessionConnection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, sqlx::Error> {
        let mut conn = PgConnection::connect_with(&self.connect_options(config)).await?;

        if let Err(e) = conn.execute("BEGIN").await {
            // The session is unusable; don't leave the socket open.
            if let Err(close_error) = conn.close().await {
                tracing::warn!(error = %close_error, "close after failed BEGIN failed");
            }
            return Err(e);
        }

        Ok(PgSessionConnection {
            conn,
            aborted: false,
        })
    }
}

/// A PostgreSQL connection with an open transaction.
///
/// Once a statement fails on the server the transaction is aborted: the
/// server answers a later `COMMIT` with a rollback and no error, so
/// `aborted` makes [`Connection::commit`] report that instead.
pub struct PgSessionConnection {
    conn: PgConnection,
    aborted: bool,
}

impl std::fmt::Debug for PgSessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSessionConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for PgSessionConnection {
    async fn fetch_all(&mut self, query: &str) -> Result<QueryResult, sqlx::Error> {
        let result = fetch_rows(&mut self.conn, query).await;
        if let Err(sqlx::Error::Database(_)) = &result {
            self.aborted = true;
        }
        result
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if self.aborted {
            // End the failed transaction explicitly; it cannot be committed.
            self.conn.execute("ROLLBACK").await?;
            return Err(sqlx::Error::Protocol(
                "transaction aborted by a failed statement; rolled back instead of committed"
                    .to_string(),
            ));
        }
        self.conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.conn.execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        self.conn.close().await
    }
}

async fn fetch_rows(conn: &mut PgConnection, query: &str) -> Result<QueryResult, sqlx::Error> {
    // Preparing first gives column names even when no rows come back.
    let statement = (&mut *conn).prepare(query).await?;
    let columns: Vec<String> = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let rows = statement.query().fetch_all(&mut *conn).await?;
    let rows = rows
        .iter()
        .map(|row| {
            (0..columns.len())
                .map(|index| decode_value(row, index))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    QueryResult::new(columns, rows).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// How a column type is decoded, keyed by the sqlx type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    /// The single-byte internal `"char"` type.
    InternalChar,
    Uuid,
    Bytes,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Other,
}

impl CellKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOL" => CellKind::Bool,
            "INT2" => CellKind::Int2,
            "INT4" => CellKind::Int4,
            "INT8" => CellKind::Int8,
            "FLOAT4" => CellKind::Float4,
            "FLOAT8" => CellKind::Float8,
            "NUMERIC" => CellKind::Numeric,
            // sqlx reports bpchar as CHAR
            "TEXT" | "VARCHAR" | "CHAR" | "NAME" => CellKind::Text,
            "\"CHAR\"" => CellKind::InternalChar,
            "UUID" => CellKind::Uuid,
            "BYTEA" => CellKind::Bytes,
            "DATE" => CellKind::Date,
            "TIME" => CellKind::Time,
            "TIMESTAMP" => CellKind::Timestamp,
            "TIMESTAMPTZ" => CellKind::TimestampTz,
            "JSON" | "JSONB" => CellKind::Json,
            _ => CellKind::Other,
        }
    }
}

/// Decode one cell into a driver-agnostic value.
fn decode_value(row: &PgRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match CellKind::of(&type_name) {
        CellKind::Bool => SqlValue::Bool(row.try_get(index)?),
        CellKind::Int2 => SqlValue::Int(row.try_get::<i16, _>(index)?.into()),
        CellKind::Int4 => SqlValue::Int(row.try_get::<i32, _>(index)?.into()),
        CellKind::Int8 => SqlValue::Int(row.try_get(index)?),
        CellKind::Float4 => SqlValue::Float(row.try_get::<f32, _>(index)?.into()),
        CellKind::Float8 => SqlValue::Float(row.try_get(index)?),
        CellKind::Numeric => SqlValue::Decimal(row.try_get::<Decimal, _>(index)?),
        CellKind::Text => SqlValue::Text(row.try_get(index)?),
        CellKind::InternalChar => {
            let byte = row.try_get::<i8, _>(index)? as u8;
            SqlValue::Text(char::from(byte).to_string())
        }
        CellKind::Uuid => SqlValue::Text(row.try_get::<Uuid, _>(index)?.to_string()),
        CellKind::Bytes => SqlValue::Bytes(row.try_get(index)?),
        CellKind::Date => SqlValue::Date(row.try_get::<NaiveDate, _>(index)?),
        CellKind::Time => SqlValue::Time(row.try_get::<NaiveTime, _>(index)?),
        CellKind::Timestamp => SqlValue::Timestamp(row.try_get::<NaiveDateTime, _>(index)?),
        CellKind::TimestampTz => SqlValue::TimestampTz(row.try_get::<DateTime<Utc>, _>(index)?),
        CellKind::Json => SqlValue::Json(row.try_get::<serde_json::Value, _>(index)?),
        CellKind::Other => match row.try_get::<String, _>(index) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => SqlValue::Unsupported(type_name),
        },
    };

    Ok(value)
}
