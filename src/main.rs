/// MySQL binlog CDC 실행 파일
///
/// 환경 변수로 설정을 읽고, 테이블 하나의 변경 사항을 JSON 한 줄씩 stdout으로 내보냅니다.
/// 로그는 stderr로 나갑니다.
use binlog_cdc::cdc_engine::{CdcConfig, CdcEngine, TrackedStream};
use binlog_cdc::connection::ConnectionConfig;
use binlog_cdc::message::SyncMessage;
use binlog_cdc::offset::State;
use std::env;
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 초기화 (stdout은 메시지 스트림 전용)
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = config_from_env()?;
    info!(
        "Connecting to {}:{}",
        config.connection.hostname, config.connection.port
    );

    let state = match env::var("CDC_STATE_FILE") {
        Ok(path) => State::load(&path).await?,
        Err(_) => State::default(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<SyncMessage>();
    let writer = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        while let Some(message) = rx.blocking_recv() {
            let line = message
                .to_json_line()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(out, "{}", line)?;
            out.flush()?;
        }
        Ok(())
    });

    let stream_id = config.stream.stream_id.clone();
    let mut engine = CdcEngine::new(config);
    engine.start().await?;

    let result = engine.sync(state, &tx).await;
    drop(tx);
    engine.stop().await?;
    writer.await??;

    match result {
        Ok(state) => {
            if let Some(position) = state.binlog_position(&stream_id) {
                info!("Binlog sync for {} finished at {}", stream_id, position);
            }
            Ok(())
        }
        Err(e) => {
            error!("Binlog sync failed: {}", e);
            Err(e.into())
        }
    }
}

fn config_from_env() -> Result<CdcConfig, Box<dyn std::error::Error>> {
    let database = env::var("DB_NAME").unwrap_or_else(|_| "testdb".to_string());
    let table = env::var("CDC_TABLE").map_err(|_| "CDC_TABLE must be set")?;

    let connection = ConnectionConfig {
        hostname: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("DB_PORT")
            .unwrap_or_else(|_| "3306".to_string())
            .parse()?,
        username: env::var("DB_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("DB_PASSWORD").unwrap_or_default(),
        database: Some(database.clone()),
        server_id: parse_server_id(env::var("SERVER_ID").ok())?,
        ..ConnectionConfig::default()
    };

    let mut stream = TrackedStream::new(database, table);
    if let Ok(stream_id) = env::var("CDC_STREAM_ID") {
        stream.stream_id = stream_id;
    }
    stream.columns = env::var("CDC_COLUMNS").ok().map(|columns| {
        columns
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    });

    Ok(CdcConfig::new(connection, stream))
}

/// 복제 클라이언트용 server_id. 소스 서버(기본값 1)와 겹치지 않게 반드시 지정해야 한다.
fn parse_server_id(raw: Option<String>) -> Result<u32, Box<dyn std::error::Error>> {
    let raw = raw.ok_or("SERVER_ID must be set to a replica id unique in the topology")?;
    let server_id: u32 = raw.trim().parse()?;
    if server_id == 0 {
        return Err("SERVER_ID must be non-zero".into());
    }
    Ok(server_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_is_required() {
        assert!(parse_server_id(None).is_err());
        assert!(parse_server_id(Some("0".to_string())).is_err());
        assert!(parse_server_id(Some("abc".to_string())).is_err());
        assert_eq!(parse_server_id(Some(" 4201 ".to_string())).ok(), Some(4201));
    }
}
