//! 수신자
//!
//! - 패킷마다 정확히 하나의 ACK 또는 NAK 응답
//! - 체크섬이 유효하고 기대한 시퀀스인 DATA 만 출력으로 전달
//! - 손상/순서 어긋난 패킷은 진단 싱크로 보고

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::error::CodecError;
use crate::message::{Message, OpCode};
use crate::stats::{SharedStats, TransferStats};
use crate::transport::{Channel, Route};
use crate::{next_sequence, Config, Result, SequenceNumber, CHECKSUM_SPAN, HEADER_LEN, SEQUENCE_MODULUS};

/// 패킷 하나 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// 수신한 opcode (디코딩 실패 시 `None`)
    pub op_code: Option<OpCode>,

    /// 수신한 시퀀스 (디코딩 실패 시 `None`)
    pub sequence: Option<SequenceNumber>,

    /// 보낸 응답 (ACK 또는 NAK)
    pub reply: OpCode,

    /// 페이로드가 출력으로 전달되었는지
    pub delivered: bool,
}

impl Receipt {
    /// END 수신 여부
    pub fn is_end(&self) -> bool {
        self.op_code == Some(OpCode::End)
    }
}

/// 수신자
///
/// DATA/END 는 `data_channel` 에서 받고 ACK/NAK 는 `ack_channel` 로 보낸다.
/// 검증된 순서대로의 페이로드만 `output` 에 기록되며, 손상된 패킷은
/// `diagnostics` 로 간다.
pub struct Receiver<C, O, D> {
    /// 설정
    config: Config,

    /// DATA/END 수신 채널
    data_channel: C,

    /// ACK/NAK 송신 채널
    ack_channel: C,

    /// 헤더 주소와 다음 홉
    route: Route,

    /// 마지막으로 수락한 시퀀스 (`None` = 아직 없음)
    last_good: Option<SequenceNumber>,

    /// 출력 싱크
    output: O,

    /// 진단 싱크
    diagnostics: D,

    /// 수신 통계
    stats: SharedStats,
}

impl<C, O, D> Receiver<C, O, D>
where
    C: Channel,
    O: AsyncWrite + Unpin + Send,
    D: AsyncWrite + Unpin + Send,
{
    pub fn new(
        config: Config,
        data_channel: C,
        ack_channel: C,
        route: Route,
        output: O,
        diagnostics: D,
    ) -> Self {
        Self {
            config,
            data_channel,
            ack_channel,
            route,
            last_good: None,
            output,
            diagnostics,
            stats: TransferStats::shared(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 마지막으로 수락한 시퀀스
    pub fn last_good_sequence(&self) -> Option<SequenceNumber> {
        self.last_good
    }

    /// 다음에 기대하는 시퀀스
    pub fn expected_sequence(&self) -> SequenceNumber {
        self.last_good.map_or(0, next_sequence)
    }

    /// ACK/NAK 에 싣는 시퀀스
    ///
    /// 아직 수락한 것이 없으면(-1) 와이어에는 99 로 기록된다.
    pub fn acknowledged_sequence(&self) -> SequenceNumber {
        self.last_good.unwrap_or(SEQUENCE_MODULUS - 1)
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 통계 공유 핸들
    pub fn stats_handle(&self) -> SharedStats {
        self.stats.clone()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    /// END 를 받을 때까지 수신 반복
    ///
    /// 출력으로 전달한 페이로드 수를 반환한다.
    pub async fn run(&mut self) -> Result<u64> {
        let mut delivered = 0u64;

        loop {
            let receipt = self.receive().await?;
            if receipt.delivered {
                delivered += 1;
            }
            if receipt.is_end() {
                info!("END 수신: {}개 청크 전달", delivered);
                self.output.flush().await?;
                self.diagnostics.flush().await?;
                return Ok(delivered);
            }
        }
    }

    /// 패킷 하나 수신, 검증, 응답
    pub async fn receive(&mut self) -> Result<Receipt> {
        let bytes = self.data_channel.recv(None).await?;
        self.stats.write().packets_received += 1;

        let message = match Message::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                self.reject(&e, &bytes).await?;
                return Ok(Receipt {
                    op_code: None,
                    sequence: None,
                    reply: OpCode::Nak,
                    delivered: false,
                });
            }
        };

        let message_ok = message.checksum_valid();
        let expected = self.expected_sequence();
        let sequence_ok = message.sequence() == expected;

        debug!(
            "패킷 수신: {} (sum_ok={}, seq_ok={}, expected={})",
            message, message_ok, sequence_ok, expected
        );

        if !message_ok {
            let stored = message.stored_checksum().unwrap_or_default();
            let error = CodecError::Checksum {
                stored,
                computed: message.computed_checksum(),
            };
            self.reject(&error, &bytes).await?;
            return Ok(Receipt {
                op_code: Some(message.op_code()),
                sequence: Some(message.sequence()),
                reply: OpCode::Nak,
                delivered: false,
            });
        }

        let advances = sequence_ok && matches!(message.op_code(), OpCode::Data | OpCode::End);
        if advances {
            self.last_good = Some(expected);
        }

        let delivered = advances && message.op_code() == OpCode::Data;
        if delivered {
            self.output.write_all(message.payload().as_bytes()).await?;
            self.output.flush().await?;

            let mut stats = self.stats.write();
            stats.delivered_chunks += 1;
            stats.payload_bytes += message.payload().len() as u64;
        } else if !sequence_ok {
            self.stats.write().duplicates += 1;
            debug!(
                "중복/순서 어긋남: got {}, expected {}, last good {:?}",
                message.sequence(),
                expected,
                self.last_good
            );
            let line = format!(
                "out of order: {} (last ok sequence no = {})\n",
                message,
                self.acknowledged_sequence()
            );
            self.diagnostics.write_all(line.as_bytes()).await?;
        }

        self.send_reply(OpCode::Ack).await?;

        Ok(Receipt {
            op_code: Some(message.op_code()),
            sequence: Some(message.sequence()),
            reply: OpCode::Ack,
            delivered,
        })
    }

    /// 손상 패킷 보고 후 NAK 전송
    async fn reject(&mut self, error: &CodecError, bytes: &[u8]) -> Result<()> {
        warn!("손상된 패킷 ({} bytes): {}", bytes.len(), error);
        self.stats.write().corrupt_packets += 1;

        let payload = bytes.get(HEADER_LEN..CHECKSUM_SPAN).unwrap_or(bytes);
        let kind = if error.is_corruption() { "corrupt" } else { "malformed" };
        let line = format!("{}: {}: {}\n", kind, error, String::from_utf8_lossy(payload));
        self.diagnostics.write_all(line.as_bytes()).await?;

        self.send_reply(OpCode::Nak).await
    }

    /// 현재 상태를 실은 ACK/NAK 전송
    async fn send_reply(&mut self, op_code: OpCode) -> Result<()> {
        let reply = Message::between(
            self.route.local,
            self.route.remote,
            op_code,
            self.acknowledged_sequence(),
            "",
        )?;
        self.ack_channel
            .send(reply.frame(), self.route.next_hop)
            .await?;

        let mut stats = self.stats.write();
        match op_code {
            OpCode::Nak => stats.naks_sent += 1,
            _ => stats.acks_sent += 1,
        }
        Ok(())
    }
}
