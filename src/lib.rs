//! MySQL Binlog CDC (Change Data Capture) 핵심 구현
//!
//! 이 라이브러리는 MySQL 바이너리 로그를 읽어 테이블 하나의 데이터 변경 사항을 추적합니다.
//! 주요 기능:
//! - 복제 설정 및 재시작 위치 검증
//! - 북마크 기반 재시작 (이전 세션 마지막 이벤트 중복 제거)
//! - 추적 테이블 이벤트 필터링 및 레코드 변환 (삭제는 soft-delete 태그)
//! - 주기적 체크포인트 (at-least-once)

pub mod binlog;
pub mod binlog_client;
pub mod cdc_engine;
pub mod checkpoint;
pub mod connection;
pub mod error;
pub mod events;
pub mod message;
pub mod offset;
pub mod router;
pub mod verify;

pub use binlog::EventSource;
pub use binlog_client::BinlogClient;
pub use cdc_engine::{CdcConfig, CdcEngine, TrackedStream};
pub use connection::MySqlConnection;
pub use error::{CdcError, ConfigError, Result};
pub use events::{ChangeEvent, EventType, StreamedEvent};
pub use message::{ChangeRecord, SyncMessage};
pub use offset::{BinlogPosition, State};
pub use router::EventRouter;
