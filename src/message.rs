//! 다운스트림으로 내보내는 메시지

use crate::events::CellValue;
use crate::offset::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 삭제된 행에 붙는 soft-delete 컬럼
pub const SDC_DELETED_AT: &str = "_sdc_deleted_at";

/// 변경 레코드 하나
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub stream: String,
    pub version: i64,
    #[serde(rename = "record")]
    pub values: BTreeMap<String, CellValue>,
    #[serde(rename = "time_extracted")]
    pub extracted_at: DateTime<Utc>,
}

impl ChangeRecord {
    pub fn deleted_at(&self) -> Option<&CellValue> {
        self.values.get(SDC_DELETED_AT)
    }
}

/// 출력 스트림의 메시지. 순서는 이벤트 처리 순서와 같다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    ActivateVersion { stream: String, version: i64 },
    Record(ChangeRecord),
    /// 체크포인트: 방출 시점 State의 독립 복사본
    State { value: State },
}

impl SyncMessage {
    pub fn checkpoint(state: &State) -> Self {
        SyncMessage::State {
            value: state.clone(),
        }
    }

    pub fn as_record(&self) -> Option<&ChangeRecord> {
        match self {
            SyncMessage::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_checkpoint(&self) -> Option<&State> {
        match self {
            SyncMessage::State { value } => Some(value),
            _ => None,
        }
    }

    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
