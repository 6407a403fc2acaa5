//! MySQL CDC 엔진 - binlog 스트리밍 세션 처리
//!
//! 세션은 다음 단계로 진행됩니다:
//! 1. 복제 설정과 재시작 위치 검증 (실패하면 스트리밍 전에 중단)
//! 2. 스트림 버전 결정 및 ACTIVATE_VERSION 방출
//! 3. 재시작 위치부터 binlog 이벤트를 하나씩 꺼내 레코드/체크포인트로 변환
//!
//! 마지막으로 방출한 체크포인트가 다음 세션의 복구 지점이다 (at-least-once).

use crate::binlog::EventSource;
use crate::binlog_client::{BinlogClient, ColumnCatalog};
use crate::checkpoint::{CheckpointScheduler, UPDATE_BOOKMARK_PERIOD};
use crate::connection::{ConnectionConfig, MySqlConnection};
use crate::error::{CdcError, Result};
use crate::events::TableRef;
use crate::message::SyncMessage;
use crate::offset::{BinlogPosition, ProcessingState, State, VERSION_KEY};
use crate::router::EventRouter;
use crate::verify::{self, ReplicationSource};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// 추적할 테이블 하나
#[derive(Debug, Clone)]
pub struct TrackedStream {
    /// 북마크 키이자 레코드의 stream 이름
    pub stream_id: String,
    pub database: String,
    pub table: String,
    /// 레코드에 남길 컬럼 (None이면 전체)
    pub columns: Option<Vec<String>>,
}

impl TrackedStream {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        let database = database.into();
        let table = table.into();
        TrackedStream {
            stream_id: format!("{}-{}", database, table),
            database,
            table,
            columns: None,
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.database.clone(), self.table.clone())
    }
}

/// CDC 엔진 설정
#[derive(Debug, Clone)]
pub struct CdcConfig {
    pub connection: ConnectionConfig,
    pub stream: TrackedStream,
    /// 이 행 수마다 추가 체크포인트
    pub checkpoint_period: u64,
}

impl CdcConfig {
    pub fn new(connection: ConnectionConfig, stream: TrackedStream) -> Self {
        CdcConfig {
            connection,
            stream,
            checkpoint_period: UPDATE_BOOKMARK_PERIOD,
        }
    }
}

/// 출력 메시지 송신자 / 수신자
pub type CdcEventSender = mpsc::UnboundedSender<SyncMessage>;
pub type CdcEventReceiver = mpsc::UnboundedReceiver<SyncMessage>;

/// MySQL CDC 엔진
pub struct CdcEngine {
    config: CdcConfig,
    conn: Option<MySqlConnection>,
    state: ProcessingState,
}

impl CdcEngine {
    /// 새 CDC 엔진 생성
    pub fn new(config: CdcConfig) -> Self {
        CdcEngine {
            config,
            conn: None,
            state: ProcessingState::Idle,
        }
    }

    /// 엔진 초기화 및 연결
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting CDC Engine");

        let mut conn = MySqlConnection::connect(&self.config.connection).await?;

        let server_id = conn.get_server_id().await?;
        info!("Connected to MySQL server: {}", server_id);

        self.conn = Some(conn);
        Ok(())
    }

    /// binlog 동기화 세션 실행. 스트림이 끝나면 마지막 State를 돌려준다.
    pub async fn sync(&mut self, state: State, tx: &CdcEventSender) -> Result<State> {
        let stream = self.config.stream.clone();
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| CdcError::ConnectionError("CDC engine is not started".to_string()))?;

        let (state, start) = match state.binlog_position(&stream.stream_id) {
            Some(position) => (state, position),
            None => {
                let position = conn.get_binlog_status().await?;
                warn!(
                    "No binlog bookmark for stream {}, starting at current position {}",
                    stream.stream_id, position
                );
                (state.with_binlog_position(&stream.stream_id, &position), position)
            }
        };

        let (state, mut router) =
            begin_session(conn, &stream, state, &start, self.config.checkpoint_period, tx).await?;

        let columns = conn.get_column_names(&stream.database, &stream.table).await?;
        let mut catalog = ColumnCatalog::new();
        catalog.insert(stream.table_ref(), columns);

        let mut source = BinlogClient::connect(&self.config.connection, &start, catalog).await?;

        self.state = ProcessingState::Streaming;
        let result = stream_events(&mut source, &mut router, state, tx).await;
        self.state = ProcessingState::Stopped;

        info!(
            "Binlog sync for stream {} finished after {} rows",
            stream.stream_id,
            router.rows_saved()
        );
        result
    }

    /// 상태 조회
    pub fn get_state(&self) -> ProcessingState {
        self.state
    }

    /// 엔진 종료
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping CDC Engine");

        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }

        self.state = ProcessingState::Stopped;
        info!("CDC Engine stopped");
        Ok(())
    }
}

/// 세션 시작: 설정 검증, 버전 결정, ACTIVATE_VERSION 방출, 라우터 생성
pub async fn begin_session<R: ReplicationSource>(
    source: &mut R,
    stream: &TrackedStream,
    state: State,
    start: &BinlogPosition,
    checkpoint_period: u64,
    tx: &CdcEventSender,
) -> Result<(State, EventRouter)> {
    verify::verify_binlog_config(source, &stream.stream_id).await?;
    verify::verify_log_file_exists(source, &stream.stream_id, start).await?;

    let version = state.stream_version(&stream.stream_id);
    let state = state.write_bookmark(&stream.stream_id, VERSION_KEY, version);

    send(
        tx,
        SyncMessage::ActivateVersion {
            stream: stream.stream_id.clone(),
            version,
        },
    )?;

    info!(
        "Starting binlog replication with log_file={}, log_pos={}",
        start.filename, start.position
    );

    let router = EventRouter::new(
        stream.stream_id.clone(),
        stream.table_ref(),
        version,
        start.clone(),
        CheckpointScheduler::new(checkpoint_period),
    )
    .with_columns(stream.columns.clone())
    .with_extracted_at(Utc::now());

    Ok((state, router))
}

/// 이벤트를 순서대로 꺼내 라우터에 넘기고, 나온 메시지를 그대로 내보낸다.
///
/// 어댑터 에러는 즉시 세션을 끝낸다. 이미 보낸 체크포인트가 복구 지점이 된다.
pub async fn stream_events<S: EventSource>(
    source: &mut S,
    router: &mut EventRouter,
    mut state: State,
    tx: &CdcEventSender,
) -> Result<State> {
    while let Some(event) = source.next_event().await? {
        let (next, messages) = router.route(state, event);
        for message in messages {
            send(tx, message)?;
        }
        state = next;
    }
    Ok(state)
}

fn send(tx: &CdcEventSender, message: SyncMessage) -> Result<()> {
    tx.send(message).map_err(|_| CdcError::ChannelClosed)
}
