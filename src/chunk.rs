//! 페이로드 청크 분할
//!
//! 전송할 텍스트를 30바이트 이하 청크로 나눈다. 프레임 오프셋이
//! 바이트 단위로 고정되어 있으므로 ASCII 만 허용한다.

use crate::{Error, Result, PAYLOAD_LEN};

/// 페이로드 청크 생성기 (송신측)
#[derive(Debug, Clone)]
pub struct PayloadChunker {
    chunk_size: usize,
}

impl Default for PayloadChunker {
    fn default() -> Self {
        Self::new(PAYLOAD_LEN)
    }
}

impl PayloadChunker {
    /// `chunk_size` 는 1 ~ [`PAYLOAD_LEN`] 으로 제한된다
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, PAYLOAD_LEN),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 데이터를 청크들로 분할
    pub fn split<'a>(&self, data: &'a [u8]) -> Result<Vec<&'a str>> {
        if let Some(offset) = data.iter().position(|b| !b.is_ascii()) {
            return Err(Error::InvalidPayload(format!(
                "non-ASCII byte 0x{:02X} at offset {}",
                data[offset], offset
            )));
        }

        data.chunks(self.chunk_size)
            .map(|chunk| {
                std::str::from_utf8(chunk).map_err(|e| Error::InvalidPayload(e.to_string()))
            })
            .collect()
    }

    /// 청크 수 계산
    pub fn chunk_count(&self, len: usize) -> usize {
        (len + self.chunk_size - 1) / self.chunk_size
    }
}
