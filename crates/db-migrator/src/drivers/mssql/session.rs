//! SQL Server session over tiberius.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::stream::BoxStream;
use futures::StreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::core::session::{
    Cursor, CursorOptions, DatabaseInfo, DriverCapabilities, Field, IsolationLevel, Row, Session,
    StatementId,
};
use crate::core::types::JdbcTypeDesc;
use crate::core::value::{SqlNullType, SqlValue};
use crate::dialect::products;
use crate::error::{MigrateError, Result};

/// TDS packet size in bytes (32KB, the protocol maximum).
const TDS_MAX_PACKET_SIZE: u32 = 32767;

type TdsClient = Client<Compat<TcpStream>>;

fn build_config(config: &ConnectionConfig) -> Config {
    let mut tds = Config::new();
    tds.host(&config.host);
    tds.port(config.port());
    tds.database(&config.database);
    tds.authentication(AuthMethod::sql_server(&config.user, &config.password));
    tds.application_name("db-migrator");

    if config.ssl_mode.requires_tls() {
        if config.trust_server_cert || !config.ssl_mode.verifies_certificate() {
            tds.trust_cert();
        }
        tds.encryption(EncryptionLevel::Required);
    } else {
        tds.encryption(EncryptionLevel::NotSupported);
    }

    tds.packet_size(TDS_MAX_PACKET_SIZE);
    tds
}

/// One SQL Server connection.
pub struct MssqlSession {
    client: TdsClient,
    info: DatabaseInfo,
    capabilities: DriverCapabilities,
    statements: HashMap<StatementId, String>,
    next_statement: u64,
}

impl MssqlSession {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let context = format!("connecting to {}", config.display_url());
        let tds = build_config(config);
        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| MigrateError::database(e, context.as_str()))?;
        if let Err(e) = tcp.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY on SQL Server connection: {}", e);
        }
        let mut client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| MigrateError::database(e, context.as_str()))?;

        let version = client
            .simple_query("SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128))")
            .await
            .map_err(|e| MigrateError::database(e, "reading server version"))?
            .into_row()
            .await
            .map_err(|e| MigrateError::database(e, "reading server version"))?
            .and_then(|row| row.try_get::<&str, _>(0).ok().flatten().map(str::to_string))
            .unwrap_or_default();
        info!("Connected to SQL Server {} at {}", version, config.display_url());

        Ok(Self {
            client,
            info: DatabaseInfo::new(products::MSSQL, version),
            capabilities: DriverCapabilities {
                isolation_levels: vec![
                    IsolationLevel::ReadUncommitted,
                    IsolationLevel::ReadCommitted,
                    IsolationLevel::RepeatableRead,
                    IsolationLevel::Serializable,
                ],
                server_side_cursors: true,
                any_type_introspection: false,
            },
            statements: HashMap::new(),
            next_statement: 0,
        })
    }

    /// Run a batch outside `sp_executesql`, so `SET` and transaction
    /// statements keep their effect on the session.
    async fn batch(&mut self, sql: &str) -> Result<()> {
        self.client
            .simple_query(sql)
            .await
            .map_err(|e| MigrateError::database(e, sql))?
            .into_results()
            .await
            .map_err(|e| MigrateError::database(e, sql))?;
        Ok(())
    }

    async fn run(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        if params.is_empty() {
            self.batch(sql).await?;
            return Ok(0);
        }
        let mut query = Query::new(sql);
        for value in params {
            bind(&mut query, value);
        }
        let result = query
            .execute(&mut self.client)
            .await
            .map_err(|e| MigrateError::database(e, sql))?;
        Ok(result.total())
    }
}

async fn open<'a>(
    client: &'a mut TdsClient,
    sql: &'a str,
    params: &'a [SqlValue<'static>],
) -> Result<Box<dyn Cursor + 'a>> {
    let mut query = Query::new(sql);
    for value in params {
        bind(&mut query, value);
    }
    let mut stream = query
        .query(client)
        .await
        .map_err(|e| MigrateError::database(e, sql))?;
    let fields: Vec<Field> = match stream.columns().await.map_err(|e| MigrateError::database(e, sql))? {
        Some(columns) => columns
            .iter()
            .map(|c| Field::new(c.name(), JdbcTypeDesc::from_type_name(type_name(c.column_type()))))
            .collect(),
        None => Vec::new(),
    };
    Ok(Box::new(MssqlCursor {
        stream: stream.into_row_stream(),
        fields: fields.into(),
    }))
}

fn bind<'a>(query: &mut Query<'a>, value: &'a SqlValue<'static>) {
    match value {
        SqlValue::Null(t) => match t {
            SqlNullType::Bool => query.bind(Option::<bool>::None),
            SqlNullType::I16 => query.bind(Option::<i16>::None),
            SqlNullType::I32 => query.bind(Option::<i32>::None),
            SqlNullType::I64 => query.bind(Option::<i64>::None),
            SqlNullType::F32 => query.bind(Option::<f32>::None),
            SqlNullType::F64 => query.bind(Option::<f64>::None),
            SqlNullType::String => query.bind(Option::<String>::None),
            SqlNullType::Bytes => query.bind(Option::<Vec<u8>>::None),
            SqlNullType::Uuid => query.bind(Option::<Uuid>::None),
            SqlNullType::Decimal => query.bind(Option::<Decimal>::None),
            SqlNullType::DateTime => query.bind(Option::<NaiveDateTime>::None),
            SqlNullType::DateTimeOffset => query.bind(Option::<DateTime<FixedOffset>>::None),
            SqlNullType::Date => query.bind(Option::<NaiveDate>::None),
            SqlNullType::Time => query.bind(Option::<NaiveTime>::None),
        },
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I16(v) => query.bind(*v),
        SqlValue::I32(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(v) => {
            let text: &str = v;
            query.bind(text)
        }
        SqlValue::Bytes(v) => {
            let bytes: &[u8] = v;
            query.bind(bytes)
        }
        SqlValue::Uuid(v) => query.bind(*v),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
    }
}

/// SQL Server type name for a TDS column type.
fn type_name(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money | ColumnType::Money4 => "money",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::BigBinary => "binary",
        ColumnType::Image => "image",
        ColumnType::BigVarChar => "varchar",
        ColumnType::BigChar => "char",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::NChar => "nchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::Xml => "xml",
        _ => "sql_variant",
    }
}

fn decoded<T>(value: tiberius::Result<Option<T>>) -> Result<Option<T>> {
    value.map_err(|e| MigrateError::database(e, "decoding column"))
}

fn read_cell(data: &ColumnData<'static>) -> Result<SqlValue<'static>> {
    let (value, null) = match data {
        ColumnData::U8(v) => (v.map(|v| SqlValue::I16(v as i16)), SqlNullType::I16),
        ColumnData::I16(v) => (v.map(SqlValue::I16), SqlNullType::I16),
        ColumnData::I32(v) => (v.map(SqlValue::I32), SqlNullType::I32),
        ColumnData::I64(v) => (v.map(SqlValue::I64), SqlNullType::I64),
        ColumnData::F32(v) => (v.map(SqlValue::F32), SqlNullType::F32),
        ColumnData::F64(v) => (v.map(SqlValue::F64), SqlNullType::F64),
        ColumnData::Bit(v) => (v.map(SqlValue::Bool), SqlNullType::Bool),
        ColumnData::Guid(v) => (v.map(SqlValue::Uuid), SqlNullType::Uuid),
        ColumnData::String(v) => (
            v.as_deref().map(|s| SqlValue::Text(s.to_string().into())),
            SqlNullType::String,
        ),
        ColumnData::Binary(v) => (
            v.as_deref().map(|b| SqlValue::Bytes(b.to_vec().into())),
            SqlNullType::Bytes,
        ),
        ColumnData::Xml(v) => (
            v.as_ref().map(|x| SqlValue::Text(x.clone().into_owned().into_string().into())),
            SqlNullType::String,
        ),
        ColumnData::Numeric(_) => (decoded(Decimal::from_sql(data))?.map(SqlValue::Decimal), SqlNullType::Decimal),
        ColumnData::Date(_) => (decoded(NaiveDate::from_sql(data))?.map(SqlValue::Date), SqlNullType::Date),
        ColumnData::Time(_) => (decoded(NaiveTime::from_sql(data))?.map(SqlValue::Time), SqlNullType::Time),
        ColumnData::DateTimeOffset(_) => (
            decoded(DateTime::<FixedOffset>::from_sql(data))?.map(SqlValue::DateTimeOffset),
            SqlNullType::DateTimeOffset,
        ),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => (
            decoded(NaiveDateTime::from_sql(data))?.map(SqlValue::DateTime),
            SqlNullType::DateTime,
        ),
    };
    Ok(value.unwrap_or(SqlValue::Null(null)))
}

struct MssqlCursor<'c> {
    stream: BoxStream<'c, tiberius::Result<tiberius::Row>>,
    fields: Arc<[Field]>,
}

#[async_trait]
impl Cursor for MssqlCursor<'_> {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.stream.next().await else {
            return Ok(None);
        };
        let row = row.map_err(|e| MigrateError::database(e, "fetching row"))?;
        let values = row
            .into_iter()
            .map(|data| read_cell(&data))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(Row::new(Arc::clone(&self.fields), values)))
    }
}

#[async_trait]
impl Session for MssqlSession {
    fn database_info(&self) -> &DatabaseInfo {
        &self.info
    }

    fn capabilities(&self) -> &DriverCapabilities {
        &self.capabilities
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue<'static>]) -> Result<u64> {
        self.run(sql, params).await
    }

    async fn query<'a>(
        &'a mut self,
        sql: &'a str,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        open(&mut self.client, sql, params).await
    }

    // TDS has no separate prepare round trip for sp_executesql; the SQL is
    // kept and sent with each execution.
    async fn prepare(&mut self, sql: &str) -> Result<StatementId> {
        let id = StatementId(self.next_statement);
        self.next_statement += 1;
        self.statements.insert(id, sql.to_string());
        Ok(id)
    }

    async fn query_prepared<'a>(
        &'a mut self,
        id: StatementId,
        params: &'a [SqlValue<'static>],
        _options: CursorOptions,
    ) -> Result<Box<dyn Cursor + 'a>> {
        let Self { client, statements, .. } = self;
        let sql = statements
            .get(&id)
            .ok_or_else(|| MigrateError::database("unknown prepared statement", id.0.to_string()))?;
        open(client, sql, params).await
    }

    async fn execute_prepared(&mut self, id: StatementId, params: &[SqlValue<'static>]) -> Result<u64> {
        let sql = self
            .statements
            .get(&id)
            .cloned()
            .ok_or_else(|| MigrateError::database("unknown prepared statement", id.0.to_string()))?;
        self.run(&sql, params).await
    }

    async fn close_statement(&mut self, id: StatementId) -> Result<()> {
        if self.statements.remove(&id).is_none() {
            debug!("Statement {} was already closed", id.0);
        }
        Ok(())
    }

    async fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.batch(&format!("SET TRANSACTION ISOLATION LEVEL {}", level.sql())).await
    }

    async fn begin(&mut self, _read_only: bool) -> Result<()> {
        self.batch("BEGIN TRANSACTION").await
    }

    async fn commit(&mut self) -> Result<()> {
        self.batch("COMMIT TRANSACTION").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await
    }
}
