//! 에러 타입 정의

use thiserror::Error;

/// 프레임 인코딩/디코딩 에러
///
/// 디코딩은 완전히 성공하거나 이 중 하나로 실패한다. 부분적으로 해석된
/// 메시지는 절대 반환되지 않는다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// 필드가 고정 폭에 들어가지 않거나 10진수/ASCII 가 아님
    #[error("포맷 에러 ({field}): {detail}")]
    Format { field: &'static str, detail: String },

    /// 트레일러 체크섬과 재계산 값 불일치 (손상)
    #[error("체크섬 불일치: stored {stored}, computed {computed}")]
    Checksum { stored: u32, computed: u32 },

    /// 주소 문자열을 네트워크 주소로 해석할 수 없음
    #[error("유효하지 않은 주소 ({field}): {text:?}")]
    Address { field: &'static str, text: String },
}

impl CodecError {
    pub(crate) fn format(field: &'static str, detail: impl Into<String>) -> Self {
        CodecError::Format {
            field,
            detail: detail.into(),
        }
    }

    /// 전송 중 손상으로 볼 수 있는 에러인지 여부
    ///
    /// 수신 측에서는 모든 디코딩 실패가 NAK 대상이다.
    pub fn is_corruption(&self) -> bool {
        matches!(self, CodecError::Checksum { .. })
    }
}

/// SWT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("코덱 에러: {0}")]
    Codec(#[from] CodecError),

    #[error("응답 타임아웃")]
    Timeout,

    #[error("채널 닫힘")]
    ChannelClosed,

    #[error("유효하지 않은 페이로드: {0}")]
    InvalidPayload(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
