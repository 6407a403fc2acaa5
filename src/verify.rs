//! 복제 설정 검증
//!
//! 스트리밍 전에 한 번, 읽기 전용 쿼리로 확인한다.
//! - binlog_format = ROW, binlog_row_image = FULL
//! - 재시작할 로그 파일이 서버에 남아 있고, 위치가 파일 끝을 넘지 않음

use crate::error::{ConfigError, Result};
use crate::offset::BinlogPosition;
use tracing::{debug, error};

/// `SELECT @@binlog_format, @@binlog_row_image` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogSettings {
    pub binlog_format: String,
    pub binlog_row_image: String,
}

/// `SHOW BINARY LOGS`의 한 행
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLog {
    pub log_name: String,
    pub file_size: u64,
}

/// 검증에 필요한 조회 쿼리 실행기
#[allow(async_fn_in_trait)]
pub trait ReplicationSource {
    async fn binlog_settings(&mut self) -> Result<BinlogSettings>;

    async fn binary_logs(&mut self) -> Result<Vec<BinaryLog>>;
}

/// Row 기반, full image 로깅인지 확인
pub async fn verify_binlog_config<S: ReplicationSource>(source: &mut S, stream: &str) -> Result<()> {
    let settings = source.binlog_settings().await?;

    if !settings.binlog_format.eq_ignore_ascii_case("ROW") {
        let err = ConfigError::BadBinlogFormat {
            stream: stream.to_string(),
            observed: settings.binlog_format,
        };
        error!("{}", err);
        return Err(err.into());
    }

    if !settings.binlog_row_image.eq_ignore_ascii_case("FULL") {
        let err = ConfigError::BadBinlogRowImage {
            stream: stream.to_string(),
            observed: settings.binlog_row_image,
        };
        error!("{}", err);
        return Err(err.into());
    }

    debug!("Binlog config verified for stream {}", stream);
    Ok(())
}

/// 재시작 위치가 서버에 보존된 로그 안에 있는지 확인
pub async fn verify_log_file_exists<S: ReplicationSource>(
    source: &mut S,
    stream: &str,
    position: &BinlogPosition,
) -> Result<()> {
    let logs = source.binary_logs().await?;

    let log = logs
        .iter()
        .find(|log| log.log_name == position.filename)
        .ok_or_else(|| ConfigError::LogFileMissing {
            stream: stream.to_string(),
            log_file: position.filename.clone(),
        })?;

    if position.position > log.file_size {
        return Err(ConfigError::PositionAheadOfTail {
            stream: stream.to_string(),
            log_file: position.filename.clone(),
            requested: position.position,
            current: log.file_size,
        }
        .into());
    }

    debug!("Resume position {} verified for stream {}", position, stream);
    Ok(())
}
