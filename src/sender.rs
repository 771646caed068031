//! 송신자
//!
//! - stop-and-wait: 미확인 패킷은 항상 하나
//! - 타임아웃/NAK/손상 응답 시 동일한 프레임을 그대로 재전송
//! - DATA 는 무제한 재시도, END 는 시도 횟수 제한

use tracing::{debug, info, warn};

use crate::config::AckPolicy;
use crate::message::{Message, OpCode};
use crate::stats::{SharedStats, TransferStats};
use crate::transport::{Channel, Route};
use crate::{next_sequence, CodecError, Config, Error, Result, SequenceNumber, PAYLOAD_LEN};

/// ACK 대기 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// 수락 가능한 ACK
    Accepted {
        /// ACK 에 실린 시퀀스 (수신자의 마지막 정상 시퀀스)
        sequence: SequenceNumber,
        /// 전송한 시퀀스와 일치 여부
        sequence_matched: bool,
    },

    /// 제한 시간 내 응답 없음
    Timeout,

    /// 응답 프레임 디코딩 실패
    Corrupt(CodecError),

    /// NAK, ACK 가 아닌 opcode, 또는 기준에 맞지 않는 ACK
    Rejected {
        op_code: OpCode,
        sequence: SequenceNumber,
    },
}

impl AckOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AckOutcome::Accepted { .. })
    }
}

/// DATA 청크 전송 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// 사용한 시퀀스 번호
    pub sequence: SequenceNumber,

    /// 총 전송 횟수 (1 = 재전송 없음)
    pub transmissions: u32,
}

/// END 전송 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// END 가 확인됨
    Acknowledged { transmissions: u32 },

    /// 최대 시도 횟수 초과로 포기
    GaveUp { transmissions: u32 },
}

/// 송신자
///
/// DATA/END 는 `data_channel` 로 보내고 ACK/NAK 는 `ack_channel` 에서 받는다.
pub struct Sender<C> {
    /// 설정
    config: Config,

    /// DATA/END 송신 채널
    data_channel: C,

    /// ACK/NAK 수신 채널
    ack_channel: C,

    /// 헤더 주소와 다음 홉
    route: Route,

    /// 다음 DATA 에 사용할 시퀀스 번호
    sequence: SequenceNumber,

    /// 전송 통계
    stats: SharedStats,
}

impl<C: Channel> Sender<C> {
    /// 새 송신자 생성 (시퀀스 0 부터 시작)
    pub fn new(config: Config, data_channel: C, ack_channel: C, route: Route) -> Self {
        Self {
            config,
            data_channel,
            ack_channel,
            route,
            sequence: 0,
            stats: TransferStats::shared(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 다음 DATA 시퀀스 번호
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// 통계 반환
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 통계 공유 핸들
    pub fn stats_handle(&self) -> SharedStats {
        self.stats.clone()
    }

    /// 세션 시퀀스로 청크 전송 후 시퀀스 증가 (99 다음 0)
    pub async fn send_chunk(&mut self, payload: &str) -> Result<Delivery> {
        let delivery = self.send_chunk_as(payload, self.sequence).await?;
        self.sequence = next_sequence(self.sequence);
        Ok(delivery)
    }

    /// 지정한 시퀀스로 청크 하나 전송
    ///
    /// 수락 가능한 ACK 를 받을 때까지 같은 프레임을 무기한 재전송한다.
    /// 세션 시퀀스는 바꾸지 않는다.
    pub async fn send_chunk_as(&mut self, payload: &str, sequence: SequenceNumber) -> Result<Delivery> {
        let message = Message::between(
            self.route.local,
            self.route.remote,
            OpCode::Data,
            sequence,
            payload,
        )?;

        let (acknowledged, transmissions) = self.transmit(&message, None).await?;
        debug_assert!(acknowledged);

        {
            let mut stats = self.stats.write();
            stats.acknowledged_chunks += 1;
            stats.payload_bytes += payload.len().min(PAYLOAD_LEN) as u64;
        }

        debug!("청크 {} 확인: {}회 전송", sequence, transmissions);

        Ok(Delivery {
            sequence,
            transmissions,
        })
    }

    /// END 전송
    ///
    /// 다음 미사용 시퀀스를 실어 보내며, `close_max_attempts` 회 안에
    /// 확인되지 않으면 포기하고 반환한다.
    pub async fn close(&mut self) -> Result<CloseOutcome> {
        info!("END 전송: sequence={}", self.sequence);

        let message = Message::between(
            self.route.local,
            self.route.remote,
            OpCode::End,
            self.sequence,
            "",
        )?;

        let max_attempts = self.config.close_max_attempts.max(1);
        let (acknowledged, transmissions) = self.transmit(&message, Some(max_attempts)).await?;

        if acknowledged {
            info!("END 확인: {}회 전송", transmissions);
            Ok(CloseOutcome::Acknowledged { transmissions })
        } else {
            warn!("END 확인 실패: {}회 시도 후 종료", transmissions);
            Ok(CloseOutcome::GaveUp { transmissions })
        }
    }

    /// ACK 하나 대기 및 분류
    ///
    /// 타임아웃과 디코딩 실패는 에러가 아니라 재전송 사유로 반환된다.
    /// 채널 자체의 실패만 `Err` 로 전파된다.
    pub async fn await_ack(&mut self, expected: SequenceNumber) -> Result<AckOutcome> {
        let bytes = match self.ack_channel.recv(Some(self.config.ack_timeout())).await {
            Ok(bytes) => bytes,
            Err(Error::Timeout) => {
                self.stats.write().timeouts += 1;
                debug!("ACK 타임아웃: sequence={}", expected);
                return Ok(AckOutcome::Timeout);
            }
            Err(e) => return Err(e),
        };

        let response = match Message::decode(&bytes) {
            Ok(response) => response,
            Err(e) => {
                self.stats.write().corrupt_responses += 1;
                warn!("응답 디코딩 실패: {}", e);
                return Ok(AckOutcome::Corrupt(e));
            }
        };

        let is_ack = response.op_code() == OpCode::Ack;
        let sum_ok = response.checksum_valid();
        let seq_ok = response.sequence() == expected;

        debug!(
            "응답 수신: {} (ack={}, sum_ok={}, seq_ok={})",
            response, is_ack, sum_ok, seq_ok
        );

        {
            let mut stats = self.stats.write();
            if response.op_code() == OpCode::Nak {
                stats.naks_received += 1;
            }
            if is_ack && !seq_ok {
                stats.stale_acks += 1;
            }
        }

        let accepted = is_ack
            && sum_ok
            && match self.config.ack_policy {
                AckPolicy::OpcodeAndChecksum => true,
                AckPolicy::RequireSequenceMatch => seq_ok,
            };

        if accepted {
            if !seq_ok {
                warn!(
                    "시퀀스 불일치 ACK 수락: expected {}, got {}",
                    expected,
                    response.sequence()
                );
            }
            Ok(AckOutcome::Accepted {
                sequence: response.sequence(),
                sequence_matched: seq_ok,
            })
        } else {
            Ok(AckOutcome::Rejected {
                op_code: response.op_code(),
                sequence: response.sequence(),
            })
        }
    }

    /// 수락 가능한 ACK 가 올 때까지 같은 프레임 반복 전송
    ///
    /// 반환값: (확인 여부, 전송 횟수)
    async fn transmit(&mut self, message: &Message, max_attempts: Option<u32>) -> Result<(bool, u32)> {
        let mut attempts = 0u32;

        loop {
            self.data_channel
                .send(message.frame(), self.route.next_hop)
                .await?;
            attempts += 1;

            {
                let mut stats = self.stats.write();
                stats.transmissions += 1;
                if attempts > 1 {
                    stats.retransmissions += 1;
                }
            }

            let outcome = self.await_ack(message.sequence()).await?;
            if outcome.is_accepted() {
                return Ok((true, attempts));
            }

            if let Some(max) = max_attempts {
                if attempts >= max {
                    return Ok((false, attempts));
                }
            }

            warn!("재전송 #{}: {} ({:?})", attempts, message, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// 응답 스크립트
    enum Step {
        Timeout,
        Frame(Bytes),
    }

    /// 전송 기록 + 스크립트 응답 채널
    struct ScriptedChannel {
        sent: Arc<Mutex<Vec<(Bytes, SocketAddr)>>>,
        script: VecDeque<Step>,
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        async fn send(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()> {
            self.sent.lock().push((Bytes::copy_from_slice(frame), dest));
            Ok(())
        }

        async fn recv(&mut self, _timeout: Option<Duration>) -> Result<Bytes> {
            match self.script.pop_front() {
                Some(Step::Timeout) => Err(Error::Timeout),
                Some(Step::Frame(bytes)) => Ok(bytes),
                None => Err(Error::ChannelClosed),
            }
        }

        fn local_addr(&self) -> Result<SocketAddr> {
            Ok(addr(0))
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn route() -> Route {
        Route::via(addr(2015), addr(2017), addr(2021))
    }

    fn reply(op_code: OpCode, sequence: SequenceNumber) -> Step {
        let msg = Message::between(addr(2018), addr(2016), op_code, sequence, "").unwrap();
        Step::Frame(msg.frame().clone())
    }

    fn sender_with(
        config: Config,
        script: Vec<Step>,
    ) -> (Sender<ScriptedChannel>, Arc<Mutex<Vec<(Bytes, SocketAddr)>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let data = ScriptedChannel {
            sent: sent.clone(),
            script: VecDeque::new(),
        };
        let ack = ScriptedChannel {
            sent: Arc::new(Mutex::new(Vec::new())),
            script: script.into(),
        };
        (Sender::new(config, data, ack, route()), sent)
    }

    #[tokio::test]
    async fn test_resends_identical_frame_until_ack() {
        let script = vec![Step::Timeout, Step::Timeout, Step::Timeout, reply(OpCode::Ack, 0)];
        let (mut sender, sent) = sender_with(Config::default(), script);

        let delivery = sender.send_chunk("hello world").await.unwrap();

        assert_eq!(delivery, Delivery { sequence: 0, transmissions: 4 });
        assert_eq!(sender.sequence(), 1);

        let sent = sent.lock();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|(frame, dest)| frame == &sent[0].0 && *dest == addr(2021)));

        let decoded = Message::decode(&sent[0].0).unwrap();
        assert_eq!(decoded.op_code(), OpCode::Data);
        assert_eq!(decoded.sequence(), 0);
        assert_eq!(decoded.source_port(), 2015);
        assert_eq!(decoded.dest_port(), 2017);
        assert_eq!(decoded.payload().trim_end(), "hello world");

        let stats = sender.stats();
        assert_eq!(stats.transmissions, 4);
        assert_eq!(stats.retransmissions, 3);
        assert_eq!(stats.timeouts, 3);
        assert_eq!(stats.acknowledged_chunks, 1);
    }

    #[tokio::test]
    async fn test_nak_and_corrupt_response_trigger_resend() {
        let mut corrupt = Message::between(addr(2018), addr(2016), OpCode::Ack, 0, "")
            .unwrap()
            .frame()
            .to_vec();
        corrupt[40] = b'N' ^ 0x02;

        let script = vec![
            reply(OpCode::Nak, 0),
            Step::Frame(Bytes::from(corrupt)),
            reply(OpCode::Ack, 0),
        ];
        let (mut sender, _sent) = sender_with(Config::default(), script);

        let delivery = sender.send_chunk("payload").await.unwrap();

        assert_eq!(delivery.transmissions, 3);
        let stats = sender.stats();
        assert_eq!(stats.naks_received, 1);
        assert_eq!(stats.corrupt_responses, 1);
    }

    #[tokio::test]
    async fn test_stale_ack_accepted_by_default_policy() {
        let (mut sender, _sent) = sender_with(Config::default(), vec![reply(OpCode::Ack, 7)]);

        let delivery = sender.send_chunk("chunk").await.unwrap();

        assert_eq!(delivery.transmissions, 1);
        assert_eq!(sender.stats().stale_acks, 1);
    }

    #[tokio::test]
    async fn test_stale_ack_rejected_when_sequence_required() {
        let config = Config::default().with_ack_policy(AckPolicy::RequireSequenceMatch);
        let script = vec![reply(OpCode::Ack, 7), reply(OpCode::Ack, 0)];
        let (mut sender, _sent) = sender_with(config, script);

        let delivery = sender.send_chunk("chunk").await.unwrap();

        assert_eq!(delivery.transmissions, 2);
    }

    #[tokio::test]
    async fn test_await_ack_classification() {
        let script = vec![
            Step::Timeout,
            Step::Frame(Bytes::from_static(b"garbage")),
            reply(OpCode::Nak, 3),
            reply(OpCode::Ack, 3),
        ];
        let (mut sender, _sent) = sender_with(Config::default(), script);

        assert_eq!(sender.await_ack(3).await.unwrap(), AckOutcome::Timeout);
        assert!(matches!(
            sender.await_ack(3).await.unwrap(),
            AckOutcome::Corrupt(CodecError::Format { field: "frame", .. })
        ));
        assert_eq!(
            sender.await_ack(3).await.unwrap(),
            AckOutcome::Rejected { op_code: OpCode::Nak, sequence: 3 }
        );
        assert_eq!(
            sender.await_ack(3).await.unwrap(),
            AckOutcome::Accepted { sequence: 3, sequence_matched: true }
        );
        assert!(matches!(sender.await_ack(3).await, Err(Error::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_sequence_wraps_after_99() {
        let script = (0..101).map(|i| reply(OpCode::Ack, (i % 100) as u8)).collect();
        let config = Config::default().with_ack_policy(AckPolicy::RequireSequenceMatch);
        let (mut sender, _sent) = sender_with(config, script);

        let mut deliveries = Vec::new();
        for i in 0..101 {
            deliveries.push(sender.send_chunk(&format!("chunk {}", i)).await.unwrap());
        }

        assert_eq!(deliveries[0].sequence, 0);
        assert_eq!(deliveries[99].sequence, 99);
        assert_eq!(deliveries[100].sequence, 0);
        assert!(deliveries.iter().all(|d| d.transmissions == 1));
    }

    #[tokio::test]
    async fn test_close_gives_up_after_max_attempts() {
        let config = Config {
            close_max_attempts: 3,
            ..Config::default()
        };
        let script = vec![Step::Timeout, Step::Timeout, Step::Timeout, reply(OpCode::Ack, 0)];
        let (mut sender, sent) = sender_with(config, script);

        let outcome = sender.close().await.unwrap();

        assert_eq!(outcome, CloseOutcome::GaveUp { transmissions: 3 });
        let sent = sent.lock();
        assert_eq!(sent.len(), 3);
        assert_eq!(Message::decode(&sent[0].0).unwrap().op_code(), OpCode::End);
    }

    #[tokio::test]
    async fn test_close_carries_next_sequence() {
        let script = vec![reply(OpCode::Ack, 0), Step::Timeout, reply(OpCode::Ack, 1)];
        let (mut sender, sent) = sender_with(Config::default(), script);

        sender.send_chunk("only chunk").await.unwrap();
        let outcome = sender.close().await.unwrap();

        assert_eq!(outcome, CloseOutcome::Acknowledged { transmissions: 2 });
        let end = Message::decode(&sent.lock()[1].0).unwrap();
        assert_eq!(end.op_code(), OpCode::End);
        assert_eq!(end.sequence(), 1);
    }

    #[tokio::test]
    async fn test_oversized_field_fails_before_sending() {
        let (mut sender, sent) = sender_with(Config::default(), vec![]);

        let result = sender.send_chunk_as("x", 150).await;

        assert!(matches!(result, Err(Error::Codec(CodecError::Format { .. }))));
        assert!(sent.lock().is_empty());
    }
}
