//! Binlog 처리 위치 추적 (북마크 및 State)
//!
//! Binlog 파일명 + 위치로 정확한 재시작 지점을 추적합니다.
//! 예: "mysql-bin.000003" 파일의 4097 바이트 위치
//!
//! State는 스트림별 북마크 맵이며, 쓰기는 항상 새 State를 돌려주는 copy-on-write 방식입니다.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub const LOG_FILE_KEY: &str = "log_file";
pub const LOG_POS_KEY: &str = "log_pos";
pub const VERSION_KEY: &str = "version";

/// Binlog 파일 위치 정보
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BinlogPosition {
    /// 바이너리 로그 파일명 (e.g., "mysql-bin.000001")
    pub filename: String,
    /// 바이트 위치
    pub position: u64,
}

impl BinlogPosition {
    pub fn new(filename: impl Into<String>, position: u64) -> Self {
        BinlogPosition {
            filename: filename.into(),
            position,
        }
    }
}

impl fmt::Display for BinlogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filename, self.position)
    }
}

/// 스트림 하나의 북마크 (log_file, log_pos, version 외의 키도 보존)
pub type Bookmark = Map<String, Value>;

/// 전체 동기화 상태
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub bookmarks: BTreeMap<String, Bookmark>,
}

impl State {
    pub fn new() -> Self {
        State::default()
    }

    /// 상태 파일 읽기 (파일이 없으면 빈 상태)
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(State::default());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        if raw.trim().is_empty() {
            return Ok(State::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn get_bookmark(&self, stream_id: &str, key: &str) -> Option<&Value> {
        self.bookmarks.get(stream_id).and_then(|b| b.get(key))
    }

    /// 북마크 필드 쓰기. 마지막 쓰기가 이긴다.
    pub fn write_bookmark(mut self, stream_id: &str, key: &str, value: impl Into<Value>) -> Self {
        self.bookmarks
            .entry(stream_id.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// 저장된 재시작 위치. log_file과 log_pos가 모두 있어야 한다.
    pub fn binlog_position(&self, stream_id: &str) -> Option<BinlogPosition> {
        let filename = self.get_bookmark(stream_id, LOG_FILE_KEY)?.as_str()?;
        let position = self.get_bookmark(stream_id, LOG_POS_KEY)?.as_u64()?;
        Some(BinlogPosition::new(filename, position))
    }

    pub fn with_binlog_position(self, stream_id: &str, position: &BinlogPosition) -> Self {
        self.write_bookmark(stream_id, LOG_FILE_KEY, position.filename.clone())
            .write_bookmark(stream_id, LOG_POS_KEY, position.position)
    }

    pub fn version(&self, stream_id: &str) -> Option<i64> {
        self.get_bookmark(stream_id, VERSION_KEY)?.as_i64()
    }

    /// 이번 세션의 데이터 버전. 기존 버전이 있으면 재사용, 없으면 현재 시각(ms)
    pub fn stream_version(&self, stream_id: &str) -> i64 {
        self.version(stream_id)
            .unwrap_or_else(|| Utc::now().timestamp_millis())
    }
}

/// CDC 처리 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingState {
    /// 시작 전
    Idle,
    /// 스트리밍 처리 중
    Streaming,
    /// 중단됨
    Stopped,
}
