//! 이벤트 라우터 및 레코드 빌더
//!
//! 어댑터가 내보낸 이벤트를 순서대로 하나씩 처리합니다.
//! 1. 이전 세션에서 처리한 위치의 이벤트는 건너뜀
//! 2. Rotation 이벤트는 북마크를 새 파일로 옮김
//! 3. 추적 테이블의 row 이벤트만 레코드로 변환하고 북마크를 전진
//! 4. 처리한 이벤트마다 체크포인트(State)를 방출
//!
//! 다른 테이블의 row 이벤트는 북마크를 건드리지 않는다.

use crate::checkpoint::CheckpointScheduler;
use crate::events::{event_time, CellValue, ChangeEvent, Row, StreamedEvent, TableRef};
use crate::message::{ChangeRecord, SyncMessage, SDC_DELETED_AT};
use crate::offset::{BinlogPosition, State};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// 라우터 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPhase {
    /// 아직 아무 이벤트도 처리하지 않음 (재시작 지점 중복 제거 대기)
    AwaitingResumeSkip,
    Streaming,
}

/// 추적 대상 스트림 하나의 라우터
#[derive(Debug, Clone)]
pub struct EventRouter {
    stream_id: String,
    table: TableRef,
    version: i64,
    /// 세션 시작 북마크 = 이전 세션에서 마지막으로 처리한 위치
    start: BinlogPosition,
    columns: Option<Vec<String>>,
    extracted_at: DateTime<Utc>,
    scheduler: CheckpointScheduler,
    phase: RouterPhase,
}

impl EventRouter {
    pub fn new(
        stream_id: impl Into<String>,
        table: TableRef,
        version: i64,
        start: BinlogPosition,
        scheduler: CheckpointScheduler,
    ) -> Self {
        EventRouter {
            stream_id: stream_id.into(),
            table,
            version,
            start,
            columns: None,
            extracted_at: Utc::now(),
            scheduler,
            phase: RouterPhase::AwaitingResumeSkip,
        }
    }

    /// 레코드에 남길 컬럼 제한 (`_sdc_deleted_at`은 항상 유지)
    pub fn with_columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_extracted_at(mut self, extracted_at: DateTime<Utc>) -> Self {
        self.extracted_at = extracted_at;
        self
    }

    pub fn phase(&self) -> RouterPhase {
        self.phase
    }

    pub fn rows_saved(&self) -> u64 {
        self.scheduler.rows_saved()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// 이벤트 하나 처리. 다음 State와 방출할 메시지들을 돌려준다.
    pub fn route(&mut self, state: State, streamed: StreamedEvent) -> (State, Vec<SyncMessage>) {
        let mut messages = Vec::new();

        if streamed.position == self.start {
            info!(
                "Skipping event for log_file={} and log_pos={} as it was processed last sync",
                streamed.position.filename, streamed.position.position
            );
            return (state, messages);
        }
        self.phase = RouterPhase::Streaming;

        let state = match streamed.event {
            ChangeEvent::Rotation(rotate) => {
                let target = rotate.target();
                info!("Binlog rotated to {}", target);
                state.with_binlog_position(&self.stream_id, &target)
            }
            ChangeEvent::RowWrite(data) if data.table == self.table => {
                for row in data.rows {
                    self.emit_row(row, &state, &mut messages);
                }
                state.with_binlog_position(&self.stream_id, &streamed.position)
            }
            ChangeEvent::RowUpdate(data) if data.table == self.table => {
                for (_before, after) in data.rows {
                    self.emit_row(after, &state, &mut messages);
                }
                state.with_binlog_position(&self.stream_id, &streamed.position)
            }
            ChangeEvent::RowDelete(data) if data.table == self.table => {
                let deleted_at = event_time(data.timestamp);
                for mut row in data.rows {
                    row.insert(SDC_DELETED_AT.to_string(), CellValue::DateTime(deleted_at));
                    self.emit_row(row, &state, &mut messages);
                }
                state.with_binlog_position(&self.stream_id, &streamed.position)
            }
            other => {
                debug!(
                    "Ignoring {:?} for {} at {}",
                    other.event_type(),
                    other.table().map(ToString::to_string).unwrap_or_default(),
                    streamed.position
                );
                state
            }
        };

        messages.push(SyncMessage::checkpoint(&state));
        (state, messages)
    }

    fn emit_row(&mut self, values: Row, state: &State, messages: &mut Vec<SyncMessage>) {
        messages.push(SyncMessage::Record(self.build_record(values)));

        if self.scheduler.record_row() {
            debug!(
                "Checkpoint after {} rows for stream {}",
                self.scheduler.rows_saved(),
                self.stream_id
            );
            messages.push(SyncMessage::checkpoint(state));
        }
    }

    fn build_record(&self, mut values: Row) -> ChangeRecord {
        if let Some(columns) = &self.columns {
            values.retain(|name, _| name == SDC_DELETED_AT || columns.iter().any(|c| c == name));
        }

        ChangeRecord {
            stream: self.stream_id.clone(),
            version: self.version,
            values,
            extracted_at: self.extracted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RotateEventData, RowsEventData, UpdateRowsData};

    const STREAM: &str = "shop-users";
    const VERSION: i64 = 1_700_000_000_000;

    fn users() -> TableRef {
        TableRef::new("shop", "users")
    }

    fn row(id: i64, name: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".to_string(), CellValue::Int64(id));
        row.insert("name".to_string(), CellValue::from(name));
        row
    }

    fn at(file: &str, pos: u64, event: ChangeEvent) -> StreamedEvent {
        StreamedEvent {
            event,
            position: BinlogPosition::new(file, pos),
        }
    }

    fn write(table: TableRef, rows: Vec<Row>) -> ChangeEvent {
        ChangeEvent::RowWrite(RowsEventData {
            table,
            timestamp: 1_700_000_000,
            rows,
        })
    }

    fn start_state() -> State {
        State::new().with_binlog_position(STREAM, &BinlogPosition::new("bin.000005", 120))
    }

    fn router() -> EventRouter {
        EventRouter::new(
            STREAM,
            users(),
            VERSION,
            BinlogPosition::new("bin.000005", 120),
            CheckpointScheduler::default(),
        )
    }

    fn records(messages: &[SyncMessage]) -> Vec<&ChangeRecord> {
        messages.iter().filter_map(SyncMessage::as_record).collect()
    }

    fn checkpoints(messages: &[SyncMessage]) -> Vec<&State> {
        messages.iter().filter_map(SyncMessage::as_checkpoint).collect()
    }

    #[test]
    fn test_single_write_scenario() {
        let mut router = router();
        let (state, messages) = router.route(
            start_state(),
            at("bin.000005", 340, write(users(), vec![row(1, "a")])),
        );

        assert_eq!(messages.len(), 2);
        let record = messages[0].as_record().unwrap();
        assert_eq!(record.version, VERSION);
        assert_eq!(record.stream, STREAM);
        assert_eq!(record.values, row(1, "a"));

        let expected = BinlogPosition::new("bin.000005", 340);
        assert_eq!(state.binlog_position(STREAM), Some(expected.clone()));
        assert_eq!(messages[1].as_checkpoint().unwrap().binlog_position(STREAM), Some(expected));
        assert_eq!(router.phase(), RouterPhase::Streaming);
    }

    #[test]
    fn test_resume_position_is_skipped() {
        let mut router = router();
        let (state, messages) = router.route(
            start_state(),
            at("bin.000005", 120, write(users(), vec![row(1, "a")])),
        );

        assert!(messages.is_empty());
        assert_eq!(state, start_state());
        assert_eq!(router.phase(), RouterPhase::AwaitingResumeSkip);
    }

    #[test]
    fn test_skip_check_runs_on_every_event() {
        let mut router = router();
        let (state, _) = router.route(
            start_state(),
            at("bin.000005", 200, write(users(), vec![row(1, "a")])),
        );
        let (_, messages) = router.route(
            state,
            at("bin.000005", 120, write(users(), vec![row(2, "b")])),
        );
        assert!(messages.is_empty());
        assert_eq!(router.rows_saved(), 1);
    }

    #[test]
    fn test_other_table_does_not_move_bookmark() {
        let orders = TableRef::new("shop", "orders");
        let events = vec![
            write(orders.clone(), vec![row(1, "x")]),
            ChangeEvent::RowUpdate(UpdateRowsData {
                table: orders.clone(),
                timestamp: 0,
                rows: vec![(row(1, "x"), row(1, "y"))],
            }),
            ChangeEvent::RowDelete(RowsEventData {
                table: TableRef::new("other_db", "users"),
                timestamp: 0,
                rows: vec![row(1, "y")],
            }),
        ];

        let mut router = router();
        let mut state = start_state();
        for (i, event) in events.into_iter().enumerate() {
            let (next, messages) = router.route(state, at("bin.000005", 500 + i as u64, event));
            assert!(records(&messages).is_empty());
            assert_eq!(next, start_state());
            state = next;
        }
        assert_eq!(router.rows_saved(), 0);
    }

    #[test]
    fn test_rotation_moves_bookmark_without_records() {
        let mut router = router();
        let rotate = ChangeEvent::Rotation(RotateEventData {
            next_binlog_name: "bin.000006".to_string(),
            position: 4,
            timestamp: 0,
        });
        let (state, messages) = router.route(start_state(), at("bin.000006", 4, rotate));

        assert!(records(&messages).is_empty());
        assert_eq!(checkpoints(&messages).len(), 1);
        assert_eq!(state.binlog_position(STREAM), Some(BinlogPosition::new("bin.000006", 4)));
    }

    #[test]
    fn test_update_emits_after_image() {
        let mut router = router();
        let update = ChangeEvent::RowUpdate(UpdateRowsData {
            table: users(),
            timestamp: 0,
            rows: vec![(row(1, "old"), row(1, "new"))],
        });
        let (_, messages) = router.route(start_state(), at("bin.000005", 400, update));

        let records = records(&messages);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values, row(1, "new"));
    }

    #[test]
    fn test_delete_is_tagged_with_event_time() {
        let mut router = router();
        let delete = ChangeEvent::RowDelete(RowsEventData {
            table: users(),
            timestamp: 1_700_000_000,
            rows: vec![row(1, "a"), row(2, "b")],
        });
        let (_, messages) = router.route(start_state(), at("bin.000005", 400, delete));

        let expected = CellValue::DateTime(event_time(1_700_000_000));
        let records = records(&messages);
        assert_eq!(records.len(), 2);
        for record in records {
            assert_eq!(record.deleted_at(), Some(&expected));
        }
    }

    #[test]
    fn test_checkpoint_cadence() {
        let mut router = router();
        let mut state = start_state();
        let mut threshold_positions = Vec::new();
        let mut heartbeats = 0;

        for batch in 0..25u64 {
            let rows = (0..100).map(|i| row((batch * 100 + i) as i64, "r")).collect();
            let (next, messages) =
                router.route(state, at("bin.000005", 1000 + batch, write(users(), rows)));

            let mut seen = 0;
            for (idx, message) in messages.iter().enumerate() {
                match message {
                    SyncMessage::Record(_) => seen += 1,
                    SyncMessage::State { .. } if idx + 1 == messages.len() => heartbeats += 1,
                    SyncMessage::State { .. } => threshold_positions.push(batch * 100 + seen),
                    SyncMessage::ActivateVersion { .. } => unreachable!(),
                }
            }
            state = next;
        }

        assert_eq!(router.rows_saved(), 2500);
        assert_eq!(threshold_positions, vec![1000, 2000]);
        assert_eq!(heartbeats, 25);
    }

    #[test]
    fn test_threshold_checkpoint_mid_event() {
        let mut router = EventRouter::new(
            STREAM,
            users(),
            VERSION,
            BinlogPosition::new("bin.000005", 120),
            CheckpointScheduler::new(2),
        );
        let rows = vec![row(1, "a"), row(2, "b"), row(3, "c")];
        let (_, messages) = router.route(start_state(), at("bin.000005", 900, write(users(), rows)));

        // record, record, state(threshold), record, state(heartbeat)
        assert_eq!(messages.len(), 5);
        assert_eq!(
            messages[2].as_checkpoint().unwrap().binlog_position(STREAM),
            Some(BinlogPosition::new("bin.000005", 120))
        );
        assert_eq!(
            messages[4].as_checkpoint().unwrap().binlog_position(STREAM),
            Some(BinlogPosition::new("bin.000005", 900))
        );
    }

    #[test]
    fn test_checkpoint_is_independent_copy() {
        let mut router = router();
        let (state, first) = router.route(
            start_state(),
            at("bin.000005", 300, write(users(), vec![row(1, "a")])),
        );
        let (_, _) = router.route(state, at("bin.000005", 600, write(users(), vec![row(2, "b")])));

        let snapshot = first.last().unwrap().as_checkpoint().unwrap();
        assert_eq!(snapshot.binlog_position(STREAM), Some(BinlogPosition::new("bin.000005", 300)));
    }

    #[test]
    fn test_column_selection_keeps_deleted_at() {
        let mut router = router().with_columns(Some(vec!["id".to_string()]));
        let delete = ChangeEvent::RowDelete(RowsEventData {
            table: users(),
            timestamp: 10,
            rows: vec![row(1, "a")],
        });
        let (_, messages) = router.route(start_state(), at("bin.000005", 400, delete));

        let record = messages[0].as_record().unwrap();
        let keys: Vec<&str> = record.values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![SDC_DELETED_AT, "id"]);
    }
}
