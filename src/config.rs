//! 프로토콜 설정

use std::time::Duration;

/// 송신자의 ACK 수락 기준
///
/// 기본값은 opcode 와 체크섬만 확인한다. 이 경우 시퀀스 번호가 다른
/// (오래된) ACK 도 수락되므로, 타임아웃 재전송 뒤 늦게 도착한 ACK 로 인해
/// 송신자가 너무 일찍 다음 청크로 넘어갈 수 있다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckPolicy {
    /// opcode == ACK 이고 체크섬이 유효하면 수락
    #[default]
    OpcodeAndChecksum,

    /// 위 조건에 더해 ACK 시퀀스가 전송한 시퀀스와 같아야 수락
    RequireSequenceMatch,
}

/// SWT 프로토콜 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// ACK 대기 타임아웃 (밀리초)
    pub ack_timeout_ms: u64,

    /// END 전송 최대 시도 횟수
    /// DATA 는 재시도 제한 없음
    pub close_max_attempts: u32,

    /// ACK 수락 기준
    pub ack_policy: AckPolicy,

    /// 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ack_timeout_ms: 1000,               // 1초
            close_max_attempts: 20,
            ack_policy: AckPolicy::OpcodeAndChecksum,
            recv_buffer_size: 1024,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// ACK 대기 시간
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// 로컬/루프백 테스트용 설정
    pub fn loopback() -> Self {
        Self {
            ack_timeout_ms: 50,
            close_max_attempts: 5,
            ack_policy: AckPolicy::RequireSequenceMatch,
            recv_buffer_size: 1024,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            ack_timeout_ms: 2000,
            close_max_attempts: 40,
            ack_policy: AckPolicy::RequireSequenceMatch,
            recv_buffer_size: 1024,
        }
    }

    /// ACK 수락 기준 변경
    pub fn with_ack_policy(mut self, ack_policy: AckPolicy) -> Self {
        self.ack_policy = ack_policy;
        self
    }
}
