//! 전송 통계

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// 엔드포인트 외부에서 통계를 읽기 위한 공유 핸들
pub type SharedStats = Arc<RwLock<TransferStats>>;

/// 전체 전송 통계
///
/// 송신자와 수신자가 같은 구조를 쓰며, 각자 해당하는 필드만 갱신한다.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    // ── 송신 측 ──────────────────────────────
    /// 총 전송 프레임 수 (재전송 포함)
    pub transmissions: u64,

    /// 재전송 프레임 수
    pub retransmissions: u64,

    /// ACK 대기 타임아웃 수
    pub timeouts: u64,

    /// 디코딩 실패한 응답 수
    pub corrupt_responses: u64,

    /// 수신한 NAK 수
    pub naks_received: u64,

    /// 시퀀스가 맞지 않는 ACK 수 (수락 여부와 무관)
    pub stale_acks: u64,

    /// 확인된 DATA 청크 수
    pub acknowledged_chunks: u64,

    // ── 수신 측 ──────────────────────────────
    /// 수신한 패킷 수
    pub packets_received: u64,

    /// 출력으로 전달한 페이로드 수
    pub delivered_chunks: u64,

    /// 중복/순서 어긋난 패킷 수
    pub duplicates: u64,

    /// 손상/형식 오류 패킷 수
    pub corrupt_packets: u64,

    /// 전송한 ACK 수
    pub acks_sent: u64,

    /// 전송한 NAK 수
    pub naks_sent: u64,

    /// 페이로드 바이트 (송신: 확인된 바이트, 수신: 전달한 바이트)
    pub payload_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            transmissions: 0,
            retransmissions: 0,
            timeouts: 0,
            corrupt_responses: 0,
            naks_received: 0,
            stale_acks: 0,
            acknowledged_chunks: 0,
            packets_received: 0,
            delivered_chunks: 0,
            duplicates: 0,
            corrupt_packets: 0,
            acks_sent: 0,
            naks_sent: 0,
            payload_bytes: 0,
        }
    }

    /// 공유 핸들 생성
    pub fn shared() -> SharedStats {
        Arc::new(RwLock::new(Self::new()))
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 재전송 비율 (재전송 / 전체 전송)
    pub fn retransmission_ratio(&self) -> f64 {
        if self.transmissions == 0 {
            return 0.0;
        }
        self.retransmissions as f64 / self.transmissions as f64
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.payload_bytes as f64 / elapsed
    }

    /// 송신 측 요약 문자열
    pub fn sender_summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Chunks: {} | Sent: {} | Resent: {} ({:.1}%) | Timeouts: {} | NAKs: {} | Corrupt: {} | Stale ACKs: {}",
            self.elapsed().as_secs_f64(),
            self.acknowledged_chunks,
            self.transmissions,
            self.retransmissions,
            self.retransmission_ratio() * 100.0,
            self.timeouts,
            self.naks_received,
            self.corrupt_responses,
            self.stale_acks,
        )
    }

    /// 수신 측 요약 문자열
    pub fn receiver_summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Packets: {} | Delivered: {} ({} bytes) | Duplicates: {} | Corrupt: {} | ACKs: {} | NAKs: {}",
            self.elapsed().as_secs_f64(),
            self.packets_received,
            self.delivered_chunks,
            self.payload_bytes,
            self.duplicates,
            self.corrupt_packets,
            self.acks_sent,
            self.naks_sent,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retransmission_ratio() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.retransmission_ratio(), 0.0);

        stats.transmissions = 8;
        stats.retransmissions = 2;
        assert!((stats.retransmission_ratio() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shared_handle() {
        let shared = TransferStats::shared();
        shared.write().naks_sent += 1;
        assert_eq!(shared.read().naks_sent, 1);
        assert!(shared.read().receiver_summary().contains("NAKs: 1"));
    }
}
