//! 데이터그램 채널 추상화
//!
//! - [`Channel`]: 신뢰할 수 없는 데이터그램 송수신 인터페이스
//! - [`UdpChannel`]: tokio UDP 소켓 구현
//! - [`MemoryChannel`]: 프로세스 내부 연결 (테스트/데모용)
//! - [`LossyChannel`]: 손실/손상/중복을 주입하는 래퍼 (릴레이 흉내)
//!
//! 각 엔드포인트는 DATA/END 용과 ACK/NAK 용 채널을 하나씩 독점한다.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{Error, Result};

/// 신뢰할 수 없는 데이터그램 채널
///
/// 패킷을 잃거나 손상시키거나 중복시킬 수 있지만, 한 방향 안에서 순서를
/// 바꾸지는 않는다.
#[async_trait]
pub trait Channel: Send {
    /// 데이터그램 하나를 `dest` 로 전송
    async fn send(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()>;

    /// 데이터그램 하나 수신
    ///
    /// `timeout` 이 `None` 이면 무기한 대기한다. 시간 초과 시 [`Error::Timeout`].
    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Bytes>;

    /// 로컬 주소
    fn local_addr(&self) -> Result<SocketAddr>;
}

/// 패킷 주소 지정
///
/// `local`/`remote` 는 프레임 헤더에 기록되는 엔드포인트이고, `next_hop` 은
/// 데이터그램을 실제로 보내는 주소(상대방 또는 릴레이)다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub local: SocketAddr,
    pub remote: SocketAddr,
    pub next_hop: SocketAddr,
}

impl Route {
    /// 상대방에게 직접 전송
    pub fn direct(local: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            local,
            remote,
            next_hop: remote,
        }
    }

    /// 릴레이를 거쳐 전송
    pub fn via(local: SocketAddr, remote: SocketAddr, relay: SocketAddr) -> Self {
        Self {
            local,
            remote,
            next_hop: relay,
        }
    }
}

/// UDP 소켓 채널
pub struct UdpChannel {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpChannel {
    /// 소켓 바인딩
    pub async fn bind(addr: SocketAddr, recv_buffer_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            buf: vec![0u8; recv_buffer_size],
        })
    }
}

#[async_trait]
impl Channel for UdpChannel {
    async fn send(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()> {
        self.socket.send_to(frame, dest).await?;
        Ok(())
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        let recv = self.socket.recv_from(&mut self.buf);
        let (len, _from) = match timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| Error::Timeout)??,
            None => recv.await?,
        };
        Ok(Bytes::copy_from_slice(&self.buf[..len]))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// 프로세스 내부 채널
///
/// [`MemoryChannel::pair`] 로 만든 두 끝은 서로에게 순서대로, 손실 없이
/// 전달한다. `dest` 는 무시된다.
pub struct MemoryChannel {
    local: SocketAddr,
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MemoryChannel {
    /// 연결된 채널 쌍 생성
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self {
                local: a,
                tx: a_tx,
                rx: a_rx,
            },
            Self {
                local: b,
                tx: b_tx,
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, frame: &[u8], _dest: SocketAddr) -> Result<()> {
        self.tx
            .send(Bytes::copy_from_slice(frame))
            .map_err(|_| Error::ChannelClosed)
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.rx.recv())
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.rx.recv().await,
        };
        received.ok_or(Error::ChannelClosed)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local)
    }
}

/// 장애 주입 모델
///
/// 모든 확률은 `[0.0, 1.0]` 범위다.
#[derive(Debug, Clone)]
pub struct FaultModel {
    /// 패킷 손실 확률
    pub loss_rate: f64,

    /// 1비트 손상 확률
    pub corrupt_rate: f64,

    /// 패킷 중복 확률
    pub duplicate_rate: f64,

    /// 난수 시드 (재현 가능한 실행용)
    pub seed: u64,
}

impl Default for FaultModel {
    fn default() -> Self {
        // 기본값은 장애 없음
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

impl FaultModel {
    pub fn is_transparent(&self) -> bool {
        self.loss_rate <= 0.0 && self.corrupt_rate <= 0.0 && self.duplicate_rate <= 0.0
    }
}

/// 송신 시 장애를 주입하는 채널 래퍼
pub struct LossyChannel<C> {
    inner: C,
    faults: FaultModel,
    rng: StdRng,
}

impl<C: Channel> LossyChannel<C> {
    pub fn new(inner: C, mut faults: FaultModel) -> Self {
        faults.loss_rate = faults.loss_rate.clamp(0.0, 1.0);
        faults.corrupt_rate = faults.corrupt_rate.clamp(0.0, 1.0);
        faults.duplicate_rate = faults.duplicate_rate.clamp(0.0, 1.0);

        Self {
            rng: StdRng::seed_from_u64(faults.seed),
            inner,
            faults,
        }
    }
}

#[async_trait]
impl<C: Channel> Channel for LossyChannel<C> {
    async fn send(&mut self, frame: &[u8], dest: SocketAddr) -> Result<()> {
        if self.rng.gen_bool(self.faults.loss_rate) {
            debug!("패킷 손실 주입: {} bytes -> {}", frame.len(), dest);
            return Ok(());
        }

        let mut bytes = frame.to_vec();
        if !bytes.is_empty() && self.rng.gen_bool(self.faults.corrupt_rate) {
            // 하위 7비트 중 하나만 뒤집어 ASCII 범위 유지
            let index = self.rng.gen_range(0..bytes.len());
            let bit = self.rng.gen_range(0..7);
            bytes[index] ^= 1 << bit;
            debug!("패킷 손상 주입: offset={}", index);
        }

        let duplicate = self.rng.gen_bool(self.faults.duplicate_rate);

        self.inner.send(&bytes, dest).await?;
        if duplicate {
            debug!("패킷 중복 주입 -> {}", dest);
            self.inner.send(&bytes, dest).await?;
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Option<Duration>) -> Result<Bytes> {
        self.inner.recv(timeout).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr()
    }
}
