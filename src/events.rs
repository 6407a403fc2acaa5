//! MySQL Binlog 이벤트 타입 및 데이터 구조 정의

use crate::offset::BinlogPosition;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 어댑터가 내보내는 binlog 이벤트 타입 (rotation + row 변경 3종)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    /// 로테이션 이벤트 (새 binlog 파일)
    RotateEvent = 4,
    /// WRITE_ROWS 이벤트 (INSERT)
    WriteRowsEvent = 30,
    /// UPDATE_ROWS 이벤트 (UPDATE)
    UpdateRowsEvent = 31,
    /// DELETE_ROWS 이벤트 (DELETE)
    DeleteRowsEvent = 32,
}

/// 셀 값 (다양한 MySQL 타입 지원)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Date(String),
    Time(String),
    Json(serde_json::Value),
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int64(v)
    }
}

/// 컬럼명 → 값
pub type Row = BTreeMap<String, CellValue>;

/// 이벤트가 속한 테이블
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        TableRef {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// 회전 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateEventData {
    /// 새 바이너리 로그 파일명
    pub next_binlog_name: String,
    /// 새 파일의 시작 위치
    pub position: u64,
    pub timestamp: u32,
}

impl RotateEventData {
    pub fn target(&self) -> BinlogPosition {
        BinlogPosition::new(self.next_binlog_name.clone(), self.position)
    }
}

/// WRITE_ROWS / DELETE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsEventData {
    pub table: TableRef,
    /// 이벤트 타임스탬프 (epoch 초)
    pub timestamp: u32,
    pub rows: Vec<Row>,
}

/// UPDATE_ROWS 이벤트 데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRowsData {
    pub table: TableRef,
    pub timestamp: u32,
    /// 변경 전후 데이터 쌍들
    pub rows: Vec<(Row, Row)>,
}

/// 어댑터가 내보내는 이벤트. 새 이벤트 종류는 여기서 컴파일 타임에 드러난다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Rotation(RotateEventData),
    RowWrite(RowsEventData),
    RowUpdate(UpdateRowsData),
    RowDelete(RowsEventData),
}

impl ChangeEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ChangeEvent::Rotation(_) => EventType::RotateEvent,
            ChangeEvent::RowWrite(_) => EventType::WriteRowsEvent,
            ChangeEvent::RowUpdate(_) => EventType::UpdateRowsEvent,
            ChangeEvent::RowDelete(_) => EventType::DeleteRowsEvent,
        }
    }

    /// row 이벤트의 테이블 (rotation은 None)
    pub fn table(&self) -> Option<&TableRef> {
        match self {
            ChangeEvent::Rotation(_) => None,
            ChangeEvent::RowWrite(data) | ChangeEvent::RowDelete(data) => Some(&data.table),
            ChangeEvent::RowUpdate(data) => Some(&data.table),
        }
    }

    pub fn timestamp(&self) -> u32 {
        match self {
            ChangeEvent::Rotation(data) => data.timestamp,
            ChangeEvent::RowWrite(data) | ChangeEvent::RowDelete(data) => data.timestamp,
            ChangeEvent::RowUpdate(data) => data.timestamp,
        }
    }
}

/// binlog 헤더의 epoch 초를 UTC 시각으로
pub fn event_time(timestamp: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(timestamp), 0)
        .single()
        .unwrap_or_default()
}

/// 어댑터에서 꺼낸 이벤트 + 이벤트를 소비한 직후의 어댑터 위치
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedEvent {
    pub event: ChangeEvent,
    pub position: BinlogPosition,
}
