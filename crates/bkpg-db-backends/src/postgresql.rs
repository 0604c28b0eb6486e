//! PostgreSQL executor using `tokio-postgres` and `deadpool-postgres`.
//!
//! [`PostgresExecutor`] implements the [`Executor`] trait. With
//! `use_pool` set it checks connections out of a `deadpool-postgres` pool,
//! otherwise it opens one connection per statement. Parameters are bound
//! through [`PgParam`], which converts a [`Value`] according to the type
//! the server inferred for its placeholder.

use std::error::Error as StdError;
use std::net::IpAddr;
use std::time::Duration;

use bkpg_core::settings::DatabaseSettings;
use bkpg_core::{BkError, ExecutorError};
use bkpg_db::query::JsonMode;
use bkpg_db::value::Value;
use bkpg_db::{Executor, Row};
use bytes::BytesMut;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};

type BoxError = Box<dyn StdError + Sync + Send>;

/// A PostgreSQL statement executor.
pub struct PostgresExecutor {
    connector: Connector,
    json_mode: JsonMode,
}

enum Connector {
    Pool(deadpool_postgres::Pool),
    Direct {
        config: tokio_postgres::Config,
        timeout: Duration,
    },
}

impl std::fmt::Debug for PostgresExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.connector {
            Connector::Pool(_) => "pool",
            Connector::Direct { .. } => "direct",
        };
        f.debug_struct("PostgresExecutor")
            .field("connector", &mode)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

impl PostgresExecutor {
    /// Creates an executor over an existing `deadpool-postgres` pool.
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self {
            connector: Connector::Pool(pool),
            json_mode: JsonMode::Native,
        }
    }

    /// Creates an executor from [`DatabaseSettings`].
    ///
    /// No connection is opened here; the first statement connects.
    ///
    /// # Errors
    ///
    /// Returns [`BkError::Configuration`] for inconsistent pool sizes or if
    /// the pool cannot be created.
    pub fn from_settings(settings: &DatabaseSettings) -> Result<Self, BkError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let json_mode = if settings.json_as_text {
            JsonMode::Text
        } else {
            JsonMode::Native
        };

        let connector = if settings.use_pool {
            if settings.max_size == 0 || settings.min_size > settings.max_size {
                return Err(BkError::Configuration(format!(
                    "Invalid pool size: min_size={} max_size={}",
                    settings.min_size, settings.max_size
                )));
            }
            let mut pg_config = deadpool_postgres::Config::new();
            pg_config.dbname = Some(settings.name.clone());
            pg_config.host = Some(settings.host.clone());
            pg_config.port = Some(settings.port);
            pg_config.user = Some(settings.user.clone());
            pg_config.password = Some(settings.password.clone());
            pg_config.connect_timeout = Some(timeout);

            let mut pool_config = deadpool_postgres::PoolConfig::new(settings.max_size);
            pool_config.timeouts.wait = Some(timeout);
            pool_config.timeouts.create = Some(timeout);
            pg_config.pool = Some(pool_config);

            let pool = pg_config
                .create_pool(
                    Some(deadpool_postgres::Runtime::Tokio1),
                    tokio_postgres::NoTls,
                )
                .map_err(|e| BkError::Configuration(format!("Failed to create pool: {e}")))?;
            tracing::info!(
                host = %settings.host,
                port = settings.port,
                database = %settings.name,
                max_size = settings.max_size,
                "Created PostgreSQL connection pool"
            );
            Connector::Pool(pool)
        } else {
            let mut config = tokio_postgres::Config::new();
            config
                .host(&settings.host)
                .port(settings.port)
                .dbname(&settings.name)
                .user(&settings.user)
                .password(&settings.password)
                .connect_timeout(timeout);
            Connector::Direct { config, timeout }
        };

        Ok(Self {
            connector,
            json_mode,
        })
    }

    /// Overrides how JSON parameters are bound.
    #[must_use]
    pub const fn with_json_mode(mut self, json_mode: JsonMode) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// Returns `true` if statements run on pooled connections.
    pub const fn is_pooled(&self) -> bool {
        matches!(self.connector, Connector::Pool(_))
    }

    async fn connect(&self) -> Result<Connection, ExecutorError> {
        match &self.connector {
            Connector::Pool(pool) => pool
                .get()
                .await
                .map(Connection::Pooled)
                .map_err(|e| ExecutorError::Operational(format!("Pool error: {e}"))),
            Connector::Direct { config, timeout } => {
                let (client, connection) =
                    tokio::time::timeout(*timeout, config.connect(tokio_postgres::NoTls))
                        .await
                        .map_err(|_| {
                            ExecutorError::Operational(format!(
                                "Timed out after {}s connecting to PostgreSQL",
                                timeout.as_secs()
                            ))
                        })?
                        .map_err(|e| ExecutorError::Operational(format!("Connection error: {e}")))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::warn!(error = %e, "PostgreSQL connection closed with error");
                    }
                });
                Ok(Connection::Direct(client))
            }
        }
    }

    /// Converts a `tokio_postgres::Row` to our generic `Row`.
    ///
    /// A column whose type has no [`Value`] mapping, or whose bytes fail to
    /// decode, is an error rather than a `NULL`.
    fn convert_row(pg_row: &tokio_postgres::Row) -> Result<Row, ExecutorError> {
        let mut columns = Vec::with_capacity(pg_row.len());
        let mut values = Vec::with_capacity(pg_row.len());
        for (i, col) in pg_row.columns().iter().enumerate() {
            let value = convert_value(pg_row, i, col.type_())
                .map_err(|e| decode_error(col.name(), col.type_(), &e))?;
            columns.push(col.name().to_string());
            values.push(value);
        }
        Ok(Row::new(columns, values))
    }
}

fn convert_value(
    pg_row: &tokio_postgres::Row,
    i: usize,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    match *ty {
        Type::BOOL => scalar(pg_row, i, Value::Bool),
        Type::INT2 => scalar(pg_row, i, |v: i16| Value::Int(i64::from(v))),
        Type::INT4 => scalar(pg_row, i, |v: i32| Value::Int(i64::from(v))),
        Type::INT8 => scalar(pg_row, i, Value::Int),
        Type::FLOAT4 => scalar(pg_row, i, |v: f32| Value::Float(f64::from(v))),
        Type::FLOAT8 => scalar(pg_row, i, Value::Float),
        Type::NUMERIC => scalar(pg_row, i, decimal_value),
        Type::BYTEA => scalar(pg_row, i, Value::Bytes),
        Type::UUID => scalar(pg_row, i, Value::Uuid),
        Type::DATE => scalar(pg_row, i, Value::Date),
        Type::TIMESTAMP => scalar(pg_row, i, Value::DateTime),
        Type::TIMESTAMPTZ => scalar(pg_row, i, |v: chrono::DateTime<chrono::Utc>| {
            Value::DateTime(v.naive_utc())
        }),
        Type::TIME => scalar(pg_row, i, Value::Time),
        Type::JSON | Type::JSONB => scalar(pg_row, i, Value::Json),
        Type::INET => scalar(pg_row, i, |v: IpAddr| Value::String(v.to_string())),
        Type::BOOL_ARRAY => list(pg_row, i, Value::Bool),
        Type::INT2_ARRAY => list(pg_row, i, |v: i16| Value::Int(i64::from(v))),
        Type::INT4_ARRAY => list(pg_row, i, |v: i32| Value::Int(i64::from(v))),
        Type::INT8_ARRAY => list(pg_row, i, Value::Int),
        Type::FLOAT4_ARRAY => list(pg_row, i, |v: f32| Value::Float(f64::from(v))),
        Type::FLOAT8_ARRAY => list(pg_row, i, Value::Float),
        Type::NUMERIC_ARRAY => list(pg_row, i, decimal_value),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => list(pg_row, i, Value::String),
        Type::UUID_ARRAY => list(pg_row, i, Value::Uuid),
        Type::DATE_ARRAY => list(pg_row, i, Value::Date),
        Type::TIMESTAMP_ARRAY => list(pg_row, i, Value::DateTime),
        Type::JSONB_ARRAY => list(pg_row, i, Value::Json),
        // Text-like types (text, varchar, bpchar, name, citext); anything
        // else fails to decode here
        _ => scalar(pg_row, i, Value::String),
    }
}

fn decimal_value(d: Decimal) -> Value {
    d.to_f64()
        .map_or_else(|| Value::String(d.to_string()), Value::Float)
}

fn decode_error(column: &str, ty: &Type, error: &dyn std::fmt::Display) -> ExecutorError {
    ExecutorError::Database(format!(
        "Cannot decode column '{column}' of type {ty}: {error}"
    ))
}

/// A checked-out client, pooled or owned.
enum Connection {
    Pooled(deadpool_postgres::Object),
    Direct(tokio_postgres::Client),
}

impl std::ops::Deref for Connection {
    type Target = tokio_postgres::Client;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Pooled(object) => object,
            Self::Direct(client) => client,
        }
    }
}

fn scalar<'a, T, F>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: F,
) -> Result<Value, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    Ok(row.try_get::<_, Option<T>>(idx)?.map_or(Value::Null, wrap))
}

fn list<'a, T, F>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: F,
) -> Result<Value, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    Ok(row
        .try_get::<_, Option<Vec<Option<T>>>>(idx)?
        .map_or(Value::Null, |items| {
            Value::List(
                items
                    .into_iter()
                    .map(|item| item.map_or(Value::Null, &wrap))
                    .collect(),
            )
        }))
}

fn map_error(error: &tokio_postgres::Error) -> ExecutorError {
    if let Some(db) = error.as_db_error() {
        ExecutorError::Database(format!("{} (SQLSTATE {})", db.message(), db.code().code()))
    } else if error.is_closed() {
        ExecutorError::Operational(format!("Connection closed: {error}"))
    } else {
        ExecutorError::Database(error.to_string())
    }
}

/// A [`Value`] bound as a PostgreSQL parameter.
///
/// Conversion follows the placeholder type the server inferred, so an
/// `Int` binds to any integer or float column and text binds to `uuid`,
/// `inet`, `json` and date/time columns by parsing.
#[derive(Debug)]
pub struct PgParam<'a>(pub &'a Value);

impl ToSql for PgParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT4 => (*i as f32).to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*i).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => i.to_string().to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*f)?.to_sql(ty, out),
                Type::TEXT | Type::VARCHAR => f.to_string().to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            Value::String(s) => match *ty {
                Type::UUID => s.trim().parse::<uuid::Uuid>()?.to_sql(ty, out),
                Type::INET => s.trim().parse::<IpAddr>()?.to_sql(ty, out),
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                }
                Type::DATE => s.parse::<chrono::NaiveDate>()?.to_sql(ty, out),
                Type::TIMESTAMP => s.parse::<chrono::NaiveDateTime>()?.to_sql(ty, out),
                Type::TIME => s.parse::<chrono::NaiveTime>()?.to_sql(ty, out),
                Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
                _ => s.as_str().to_sql(ty, out),
            },
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::DateTime(dt) => match *ty {
                Type::TIMESTAMPTZ => dt.and_utc().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            Value::Time(t) => t.to_sql(ty, out),
            Value::Uuid(u) => u.to_sql(ty, out),
            Value::Json(j) => match *ty {
                Type::TEXT | Type::VARCHAR => j.to_string().to_sql(ty, out),
                _ => j.to_sql(ty, out),
            },
            Value::List(items) => {
                if !matches!(ty.kind(), Kind::Array(_)) {
                    return Err(format!("cannot bind a list to a {ty} parameter").into());
                }
                items.iter().map(PgParam).collect::<Vec<_>>().to_sql(ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn bind(params: &[Value]) -> Vec<PgParam<'_>> {
    params.iter().map(PgParam).collect()
}

#[async_trait::async_trait]
impl Executor for PostgresExecutor {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        let client = self.connect().await?;
        let bound = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let rows = client
            .query(sql, &refs)
            .await
            .map_err(|e| map_error(&e))?;

        rows.iter().map(Self::convert_row).collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        let client = self.connect().await?;
        let bound = bind(params);
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        client.execute(sql, &refs).await.map_err(|e| map_error(&e))
    }

    fn json_mode(&self) -> JsonMode {
        self.json_mode
    }
}
