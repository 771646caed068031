//! # SWT (Stop-and-Wait Transport)
//!
//! 손실/손상/중복이 발생하는 UDP 릴레이 위에서 동작하는 stop-and-wait ARQ 프로토콜
//!
//! ## 핵심 특징
//! - **텍스트 프레임**: 사람이 읽을 수 있는 고정 78바이트 ASCII 프레임
//! - **가산 체크섬**: 앞 73바이트 문자 코드의 합
//! - **모듈로 100 시퀀스**: 손실/중복 감지용 0~99 순환 번호
//! - **윈도우 1**: 한 번에 하나의 미확인 패킷만 전송
//! - **이중 포트**: DATA/END 와 ACK/NAK 이 각각 별도 채널 사용

pub mod chunk;
pub mod config;
pub mod error;
pub mod message;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod transport;

pub use chunk::PayloadChunker;
pub use config::{AckPolicy, Config};
pub use error::{CodecError, Error, Result};
pub use message::{Message, OpCode};
pub use receiver::{Receipt, Receiver};
pub use sender::{AckOutcome, CloseOutcome, Delivery, Sender};
pub use stats::TransferStats;
pub use transport::{Channel, LossyChannel, MemoryChannel, Route, UdpChannel};

/// 시퀀스 번호 (0~99, 모듈로 100 순환)
pub type SequenceNumber = u8;

/// 페이로드 길이 (바이트, 공백 우측 패딩)
pub const PAYLOAD_LEN: usize = 30;

/// 헤더 길이 (주소/포트/opcode/시퀀스)
pub const HEADER_LEN: usize = 43;

/// 체크섬 계산 범위 (헤더 + 페이로드)
pub const CHECKSUM_SPAN: usize = HEADER_LEN + PAYLOAD_LEN;

/// 전체 프레임 길이
pub const FRAME_LEN: usize = 78;

/// 시퀀스 번호 모듈로
pub const SEQUENCE_MODULUS: u8 = 100;

/// 송신자 DATA 송신 포트
pub const DATA_TRANSMIT_PORT: u16 = 2015;

/// 송신자 ACK 수신 포트
pub const ACK_RECEIVE_PORT: u16 = 2016;

/// 수신자 DATA 수신 포트
pub const DATA_RECEIVE_PORT: u16 = 2017;

/// 수신자 ACK 송신 포트
pub const ACK_SEND_PORT: u16 = 2018;

/// 릴레이 포트
pub const RELAY_PORT: u16 = 2021;

/// 다음 시퀀스 번호 (99 다음은 0)
pub fn next_sequence(seq: SequenceNumber) -> SequenceNumber {
    (seq + 1) % SEQUENCE_MODULUS
}
