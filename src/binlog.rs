//! Binlog 이벤트 소스
//!
//! 어댑터는 pull 방식으로 이벤트를 하나씩 꺼내준다. `next_event`가 세션의 유일한 대기 지점이며,
//! 같은 인스턴스를 다시 시작할 수는 없고 새 재시작 위치로 새로 만들어야 한다.

use crate::error::Result;
use crate::events::StreamedEvent;
use crate::offset::BinlogPosition;
use std::collections::VecDeque;

#[allow(async_fn_in_trait)]
pub trait EventSource {
    /// 다음 이벤트. 스트림이 끝났으면 `None`
    async fn next_event(&mut self) -> Result<Option<StreamedEvent>>;

    /// 마지막으로 꺼낸 이벤트 직후의 어댑터 위치
    fn current_position(&self) -> BinlogPosition;
}

/// 미리 준비한 이벤트를 순서대로 내보내는 소스 (재생 및 테스트용)
#[derive(Debug, Clone)]
pub struct ReplaySource {
    events: VecDeque<StreamedEvent>,
    position: BinlogPosition,
}

impl ReplaySource {
    pub fn new(start: BinlogPosition, events: impl IntoIterator<Item = StreamedEvent>) -> Self {
        ReplaySource {
            events: events.into_iter().collect(),
            position: start,
        }
    }
}

impl EventSource for ReplaySource {
    async fn next_event(&mut self) -> Result<Option<StreamedEvent>> {
        let event = self.events.pop_front();
        if let Some(ref e) = event {
            self.position = e.position.clone();
        }
        Ok(event)
    }

    fn current_position(&self) -> BinlogPosition {
        self.position.clone()
    }
}
