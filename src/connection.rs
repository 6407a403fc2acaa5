//! MySQL 데이터베이스 연결 관리

use crate::error::{CdcError, Result};
use crate::offset::BinlogPosition;
use crate::verify::{BinaryLog, BinlogSettings, ReplicationSource};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Row};
use std::time::Duration;
use tracing::{debug, warn};

/// MySQL 연결 설정
#[derive(Clone)]
pub struct ConnectionConfig {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: Option<String>,
    /// 복제 클라이언트로 접속할 때 쓰는 server_id (다른 replica와 겹치면 안 됨)
    pub server_id: u32,
    pub timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            hostname: "localhost".to_string(),
            port: 3306,
            username: "root".to_string(),
            password: String::new(),
            database: None,
            server_id: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("server_id", &self.server_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        ConnectionConfig {
            hostname: hostname.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    pub(crate) fn build_opts(&self) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(self.hostname.clone())
            .tcp_port(self.port)
            .user(Some(self.username.clone()))
            .pass(Some(self.password.clone()))
            .db_name(self.database.clone())
            .into()
    }

    /// 설정된 timeout 안에 새 연결 생성
    pub(crate) async fn open(&self) -> Result<Conn> {
        let addr = format!("{}:{}", self.hostname, self.port);
        match tokio::time::timeout(self.timeout, Conn::new(self.build_opts())).await {
            Ok(Ok(conn)) => {
                debug!("Connected to MySQL at {}", addr);
                Ok(conn)
            }
            Ok(Err(e)) => Err(CdcError::ConnectionError(format!(
                "Failed to connect to {}: {}",
                addr, e
            ))),
            Err(_) => Err(CdcError::ConnectionError(format!(
                "Timed out connecting to {} after {:?}",
                addr, self.timeout
            ))),
        }
    }
}

/// MySQL 연결 래퍼
pub struct MySqlConnection {
    conn: Conn,
}

impl MySqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn = config.open().await?;
        Ok(MySqlConnection { conn })
    }

    /// 현재 binlog 끝 위치 조회
    pub async fn get_binlog_status(&mut self) -> Result<BinlogPosition> {
        // MySQL 8.4부터 SHOW MASTER STATUS가 제거됨
        let row: Option<Row> = match self.conn.query_first("SHOW BINARY LOG STATUS").await {
            Ok(row) => row,
            Err(e) => {
                debug!("SHOW BINARY LOG STATUS failed ({}), falling back", e);
                self.conn
                    .query_first("SHOW MASTER STATUS")
                    .await
                    .map_err(|e| CdcError::QueryError(format!("Failed to query binlog status: {}", e)))?
            }
        };

        let row = row.ok_or_else(|| {
            CdcError::QueryError("No binlog status available (is log_bin enabled?)".to_string())
        })?;

        Ok(BinlogPosition::new(
            column::<String>(&row, 0, "File")?,
            column::<u64>(&row, 1, "Position")?,
        ))
    }

    /// MySQL 서버 ID 조회
    pub async fn get_server_id(&mut self) -> Result<u32> {
        let result: Option<u32> = self
            .conn
            .query_first("SELECT @@server_id")
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query server_id: {}", e)))?;

        result.ok_or_else(|| CdcError::QueryError("server_id not found".to_string()))
    }

    /// 테이블 컬럼명 조회 (ORDINAL_POSITION 순, binlog row의 컬럼 순서와 같음)
    pub async fn get_column_names(&mut self, database: &str, table: &str) -> Result<Vec<String>> {
        let names: Vec<String> = self
            .conn
            .exec(
                "SELECT COLUMN_NAME \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (database, table),
            )
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query table schema: {}", e)))?;

        if names.is_empty() {
            warn!("No columns found for {}.{}", database, table);
        }
        Ok(names)
    }

    pub async fn close(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(|e| CdcError::ConnectionError(format!("Failed to disconnect: {}", e)))
    }
}

impl ReplicationSource for MySqlConnection {
    async fn binlog_settings(&mut self) -> Result<BinlogSettings> {
        let result: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_first("SELECT @@binlog_format AS binlog_format, @@binlog_row_image AS binlog_row_image")
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query binlog settings: {}", e)))?;

        let (binlog_format, binlog_row_image) = result.unwrap_or((None, None));
        Ok(BinlogSettings {
            binlog_format: binlog_format.unwrap_or_default(),
            binlog_row_image: binlog_row_image.unwrap_or_default(),
        })
    }

    async fn binary_logs(&mut self) -> Result<Vec<BinaryLog>> {
        let rows: Vec<Row> = self
            .conn
            .query("SHOW BINARY LOGS")
            .await
            .map_err(|e| CdcError::QueryError(format!("Failed to query binary logs: {}", e)))?;

        rows.iter()
            .map(|row| {
                Ok(BinaryLog {
                    log_name: column::<String>(row, 0, "Log_name")?,
                    file_size: column::<u64>(row, 1, "File_size")?,
                })
            })
            .collect()
    }
}

/// 결과 행에서 컬럼 하나 꺼내기 (SHOW 계열은 버전마다 컬럼 수가 달라 인덱스로 읽음)
fn column<T: FromValue>(row: &Row, index: usize, name: &str) -> Result<T> {
    match row.get_opt::<T, usize>(index) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(CdcError::QueryError(format!("Invalid {} column: {:?}", name, e))),
        None => Err(CdcError::QueryError(format!("Missing {} column", name))),
    }
}
