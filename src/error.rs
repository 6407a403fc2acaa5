//! CDC 관련 에러 타입

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdcError {
    #[error("MySQL 연결 에러: {0}")]
    ConnectionError(String),

    #[error("복제 설정 에러: {0}")]
    Config(#[from] ConfigError),

    #[error("Binlog 스트림 에러: {0}")]
    Stream(String),

    #[error("쿼리 실행 에러: {0}")]
    QueryError(String),

    #[error("I/O 에러: {0}")]
    IoError(String),

    #[error("직렬화 에러: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("채널이 닫혔습니다")]
    ChannelClosed,
}

/// 스트리밍 시작 전에 발견되는 치명적 설정 에러
///
/// 운영자가 서버 설정을 바꾸거나 북마크를 지우기 전에는 해결되지 않으므로 재시도하지 않는다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unable to replicate stream({stream}) with binlog because binlog_format is not set to 'ROW': {observed}.")]
    BadBinlogFormat { stream: String, observed: String },

    #[error("Unable to replicate stream({stream}) with binlog because binlog_row_image is not set to 'FULL': {observed}.")]
    BadBinlogRowImage { stream: String, observed: String },

    #[error("Unable to replicate stream({stream}) with binlog because log file {log_file} does not exist.")]
    LogFileMissing { stream: String, log_file: String },

    #[error("Unable to replicate stream({stream}) with binlog because requested position ({requested}) for log file {log_file} is greater than current position ({current}).")]
    PositionAheadOfTail {
        stream: String,
        log_file: String,
        requested: u64,
        current: u64,
    },
}

impl From<io::Error> for CdcError {
    fn from(err: io::Error) -> Self {
        CdcError::IoError(err.to_string())
    }
}

impl From<mysql_async::Error> for CdcError {
    fn from(err: mysql_async::Error) -> Self {
        CdcError::QueryError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CdcError>;
