//! 체크포인트 주기 결정

/// 기본 체크포인트 주기 (행 수)
pub const UPDATE_BOOKMARK_PERIOD: u64 = 1000;

/// 방출한 행 수를 세고 임계값 배수마다 체크포인트를 요청한다.
///
/// 이벤트 단위 heartbeat 체크포인트는 라우터가 직접 낸다.
#[derive(Debug, Clone)]
pub struct CheckpointScheduler {
    period: u64,
    rows_saved: u64,
}

impl CheckpointScheduler {
    pub fn new(period: u64) -> Self {
        CheckpointScheduler {
            period: period.max(1),
            rows_saved: 0,
        }
    }

    /// 행 하나 방출 후 호출. 누적 행 수가 주기의 배수면 true
    pub fn record_row(&mut self) -> bool {
        self.rows_saved += 1;
        self.rows_saved % self.period == 0
    }

    pub fn rows_saved(&self) -> u64 {
        self.rows_saved
    }
}

impl Default for CheckpointScheduler {
    fn default() -> Self {
        CheckpointScheduler::new(UPDATE_BOOKMARK_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_hits() {
        let mut scheduler = CheckpointScheduler::default();
        let mut hits = Vec::new();
        for _ in 0..2500 {
            if scheduler.record_row() {
                hits.push(scheduler.rows_saved());
            }
        }
        assert_eq!(hits, vec![1000, 2000]);
        assert_eq!(scheduler.rows_saved(), 2500);
    }

    #[test]
    fn test_zero_period_is_clamped() {
        let mut scheduler = CheckpointScheduler::new(0);
        assert!(scheduler.record_row());
        assert!(scheduler.record_row());
    }
}
