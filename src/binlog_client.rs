//! MySQL Binlog 클라이언트
//!
//! mysql_async의 binlog 스트림(COM_BINLOG_DUMP)을 감싸 `ChangeEvent`를 하나씩 꺼내준다.
//! rotation과 row 변경 3종 외의 이벤트는 여기서 걸러지고, 위치는 모든 이벤트에 대해 갱신된다.

use crate::binlog::EventSource;
use crate::connection::ConnectionConfig;
use crate::error::{CdcError, Result};
use crate::events::{
    CellValue, ChangeEvent, RotateEventData, Row, RowsEventData, StreamedEvent, TableRef,
    UpdateRowsData,
};
use crate::offset::BinlogPosition;
use chrono::NaiveDate;
use futures::StreamExt;
use mysql_async::binlog::events::{Event, EventData, RowsEventData as RawRowsEvent, TableMapEvent};
use mysql_async::binlog::row::BinlogRow;
use mysql_async::binlog::value::BinlogValue;
use mysql_async::{BinlogStream, BinlogStreamRequest, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// 테이블별 컬럼명 (binlog row는 위치 기반이라 이름을 따로 알아야 함)
pub type ColumnCatalog = HashMap<TableRef, Vec<String>>;

/// 어댑터의 현재 binlog 위치. 모든 이벤트마다 갱신된다.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PositionTracker {
    log_file: String,
    log_pos: u64,
}

impl PositionTracker {
    fn new(start: &BinlogPosition) -> Self {
        PositionTracker {
            log_file: start.filename.clone(),
            log_pos: start.position,
        }
    }

    /// rotate는 파일과 위치를 모두 바꾼다
    fn rotate(&mut self, log_file: String, position: u64) {
        self.log_file = log_file;
        self.log_pos = position;
    }

    /// 헤더의 log_pos는 다음 이벤트의 시작 위치. 0이면 (artificial event) 유지
    fn advance(&mut self, header_log_pos: u32) {
        if header_log_pos > 0 {
            self.log_pos = u64::from(header_log_pos);
        }
    }

    fn position(&self) -> BinlogPosition {
        BinlogPosition::new(self.log_file.clone(), self.log_pos)
    }
}

/// row 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowsKind {
    Write,
    Update,
    Delete,
}

impl RowsKind {
    fn of(rows_event: &RawRowsEvent<'_>) -> Self {
        match rows_event {
            RawRowsEvent::WriteRowsEvent(_) | RawRowsEvent::WriteRowsEventV1(_) => RowsKind::Write,
            RawRowsEvent::UpdateRowsEvent(_)
            | RawRowsEvent::UpdateRowsEventV1(_)
            | RawRowsEvent::PartialUpdateRowsEvent(_) => RowsKind::Update,
            RawRowsEvent::DeleteRowsEvent(_) | RawRowsEvent::DeleteRowsEventV1(_) => RowsKind::Delete,
        }
    }
}

/// (before, after) 이미지에서 이벤트 종류에 맞는 쪽을 골라 `ChangeEvent` 생성
///
/// write는 after, delete는 before, update는 (before, after) 쌍.
fn build_change(
    kind: RowsKind,
    table: TableRef,
    timestamp: u32,
    images: Vec<(Option<Row>, Option<Row>)>,
) -> ChangeEvent {
    match kind {
        RowsKind::Write => ChangeEvent::RowWrite(RowsEventData {
            table,
            timestamp,
            rows: images.into_iter().filter_map(|(_, after)| after).collect(),
        }),
        RowsKind::Update => ChangeEvent::RowUpdate(UpdateRowsData {
            table,
            timestamp,
            rows: images
                .into_iter()
                .filter_map(|(before, after)| Some((before.unwrap_or_default(), after?)))
                .collect(),
        }),
        RowsKind::Delete => ChangeEvent::RowDelete(RowsEventData {
            table,
            timestamp,
            rows: images.into_iter().filter_map(|(before, _)| before).collect(),
        }),
    }
}

/// row 이벤트의 테이블. table map이 없으면 경고 후 `None`
///
/// 트랜잭션 중간 위치에서 재시작하면 서버는 이미 지나간 TABLE_MAP_EVENT를 다시 보내지 않는다.
fn resolve_table(
    mapped: Option<TableRef>,
    table_id: u64,
    position: &BinlogPosition,
) -> Option<TableRef> {
    match mapped {
        Some(table) => Some(table),
        None => {
            warn!(
                "Skipping rows event without table map (table_id={}) at {}",
                table_id, position
            );
            None
        }
    }
}

/// Binlog 클라이언트
pub struct BinlogClient {
    stream: BinlogStream,
    catalog: ColumnCatalog,
    tracker: PositionTracker,
    event_count: u64,
}

impl BinlogClient {
    /// 새 연결을 열고 `start` 위치부터 binlog 스트리밍 시작
    pub async fn connect(
        config: &ConnectionConfig,
        start: &BinlogPosition,
        catalog: ColumnCatalog,
    ) -> Result<Self> {
        let conn = config.open().await?;

        let request = BinlogStreamRequest::new(config.server_id)
            .with_filename(start.filename.as_bytes())
            .with_pos(start.position);

        let stream = conn
            .get_binlog_stream(request)
            .await
            .map_err(|e| CdcError::Stream(format!("Failed to start binlog stream at {}: {}", start, e)))?;

        info!(
            "Starting binlog streaming from {} (server_id={})",
            start, config.server_id
        );

        Ok(BinlogClient {
            stream,
            catalog,
            tracker: PositionTracker::new(start),
            event_count: 0,
        })
    }

    /// 이벤트 하나를 해석. 관심 없는 종류면 `None`
    fn decode(&mut self, event: &Event) -> Result<Option<ChangeEvent>> {
        let header = event.header();
        let timestamp = header.timestamp();

        let data = event
            .read_data()
            .map_err(|e| CdcError::Stream(format!("Failed to decode binlog event: {}", e)))?;

        if let Some(EventData::RotateEvent(rotate)) = &data {
            self.tracker.rotate(rotate.name().into_owned(), rotate.position());
            return Ok(Some(ChangeEvent::Rotation(RotateEventData {
                next_binlog_name: self.tracker.log_file.clone(),
                position: self.tracker.log_pos,
                timestamp,
            })));
        }

        self.tracker.advance(header.log_pos());

        let rows_event = match data {
            Some(EventData::RowsEvent(rows_event)) => rows_event,
            _ => return Ok(None),
        };

        let table_id = rows_event.table_id();
        let tme = self.stream.get_tme(table_id);
        let mapped = tme.map(|tme| TableRef::new(tme.database_name(), tme.table_name()));
        let table = match resolve_table(mapped, table_id, &self.tracker.position()) {
            Some(table) => table,
            None => return Ok(None),
        };

        // 카탈로그에 없는 테이블은 라우터가 버리므로 행을 풀지 않는다
        let images = match (self.catalog.get(&table), tme) {
            (Some(columns), Some(tme)) => decode_rows(&rows_event, tme, columns, &table)?,
            _ => Vec::new(),
        };

        Ok(Some(build_change(RowsKind::of(&rows_event), table, timestamp, images)))
    }
}

impl EventSource for BinlogClient {
    async fn next_event(&mut self) -> Result<Option<StreamedEvent>> {
        loop {
            let event = match self.stream.next().await {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    return Err(CdcError::Stream(format!(
                        "Failed to read binlog event after {}: {}",
                        self.tracker.position(),
                        e
                    )))
                }
                None => {
                    info!(
                        "Binlog streaming ended. Total events received: {}",
                        self.event_count
                    );
                    return Ok(None);
                }
            };
            self.event_count += 1;

            if let Some(change) = self.decode(&event)? {
                debug!(
                    "Event #{}: {:?} at {}",
                    self.event_count,
                    change.event_type(),
                    self.tracker.position()
                );
                return Ok(Some(StreamedEvent {
                    event: change,
                    position: self.current_position(),
                }));
            }
        }
    }

    fn current_position(&self) -> BinlogPosition {
        self.tracker.position()
    }
}

/// (before, after) 이미지 목록으로 변환
fn decode_rows(
    rows_event: &RawRowsEvent<'_>,
    tme: &TableMapEvent<'_>,
    names: &[String],
    table: &TableRef,
) -> Result<Vec<(Option<Row>, Option<Row>)>> {
    let mut images = Vec::new();
    for item in rows_event.rows(tme) {
        let (before, after) =
            item.map_err(|e| CdcError::Stream(format!("Failed to decode rows of {}: {}", table, e)))?;
        let before = before.map(|row| to_row(row, names, table)).transpose()?;
        let after = after.map(|row| to_row(row, names, table)).transpose()?;
        images.push((before, after));
    }
    Ok(images)
}

fn to_row(row: BinlogRow, names: &[String], table: &TableRef) -> Result<Row> {
    // BinlogRow -> Vec<BinlogValue> (Option::unwrap 아님)
    let values = row.unwrap();
    if values.len() != names.len() {
        return Err(CdcError::Stream(format!(
            "Column count mismatch for {}: binlog row has {} columns, catalog has {}",
            table,
            values.len(),
            names.len()
        )));
    }

    names
        .iter()
        .zip(values)
        .map(|(name, value)| Ok((name.clone(), to_cell_value(value)?)))
        .collect()
}

fn to_cell_value(value: BinlogValue<'_>) -> Result<CellValue> {
    match value {
        BinlogValue::Value(value) => Ok(from_mysql_value(value)),
        BinlogValue::Jsonb(json) => {
            let dom = serde_json::Value::try_from(json)
                .map_err(|e| CdcError::Stream(format!("Failed to decode JSON column: {:?}", e)))?;
            Ok(CellValue::Json(dom))
        }
        BinlogValue::JsonDiff(_) => Err(CdcError::Stream(
            "Partial JSON updates are not supported; set binlog_row_value_options=''".to_string(),
        )),
    }
}

pub(crate) fn from_mysql_value(value: Value) -> CellValue {
    match value {
        Value::NULL => CellValue::Null,
        Value::Int(i) => CellValue::Int64(i),
        Value::UInt(u) => CellValue::UInt64(u),
        Value::Float(f) => CellValue::Float(f),
        Value::Double(d) => CellValue::Double(d),
        Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => CellValue::String(s),
            Err(e) => CellValue::Bytes(e.into_bytes()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(|dt| CellValue::DateTime(dt.and_utc()))
                // 0000-00-00 같은 zero date
                .unwrap_or_else(|| {
                    CellValue::Date(format!(
                        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                        year, month, day, hour, minute, second
                    ))
                })
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if negative { "-" } else { "" };
            let hours = u64::from(days) * 24 + u64::from(hours);
            CellValue::Time(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, hours, minutes, seconds, micros
            ))
        }
    }
}
