//! SWT 송신자 - Stop-and-Wait Transport
//!
//! 텍스트 파일을 30바이트 청크로 나눠 하나씩 전송하고 ACK 를 기다린다.
//!
//! 사용법:
//!   cargo run --release --bin swt-sender -- --file <PATH> [OPTIONS]
//!
//! 예시:
//!   # 로컬 수신자에게 직접 전송
//!   cargo run --release --bin swt-sender -- -f message.txt
//!
//!   # 릴레이 경유
//!   cargo run --release --bin swt-sender -- -f message.txt --peer 10.0.0.2 --relay 10.0.0.9:2021
//!
//!   # 장애 주입 (10% 손실, 5% 손상)
//!   cargo run --release --bin swt-sender -- -f message.txt --loss 0.1 --corrupt 0.05 --seed 42

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swt::transport::FaultModel;
use swt::{
    AckPolicy, CloseOutcome, Config, LossyChannel, PayloadChunker, Route, Sender, UdpChannel,
    ACK_RECEIVE_PORT, DATA_RECEIVE_PORT, DATA_TRANSMIT_PORT, PAYLOAD_LEN,
};

/// Stop-and-wait 송신자
#[derive(Parser, Debug)]
#[command(name = "swt-sender", version, about)]
struct Args {
    /// 전송할 텍스트 파일 (ASCII)
    #[arg(short, long)]
    file: PathBuf,

    /// 로컬 IP 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// 수신자 IP 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    peer: IpAddr,

    /// DATA/END 송신 포트
    #[arg(long, default_value_t = DATA_TRANSMIT_PORT)]
    data_port: u16,

    /// ACK/NAK 수신 포트
    #[arg(long, default_value_t = ACK_RECEIVE_PORT)]
    ack_port: u16,

    /// 수신자의 DATA 수신 포트
    #[arg(long, default_value_t = DATA_RECEIVE_PORT)]
    peer_data_port: u16,

    /// 릴레이 주소 (지정 시 모든 DATA/END 를 릴레이로 전송)
    #[arg(long)]
    relay: Option<SocketAddr>,

    /// 청크 크기 (1~30)
    #[arg(long, default_value_t = PAYLOAD_LEN)]
    chunk_size: usize,

    /// ACK 대기 타임아웃 (밀리초)
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// END 최대 전송 횟수
    #[arg(long, default_value_t = 20)]
    close_attempts: u32,

    /// ACK 시퀀스가 일치해야 수락
    #[arg(long)]
    strict_ack: bool,

    /// 송신 패킷 손실 확률
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// 송신 패킷 손상 확률
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// 송신 패킷 중복 확률
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,

    /// 장애 주입 난수 시드
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn config(&self) -> Config {
        let ack_policy = if self.strict_ack {
            AckPolicy::RequireSequenceMatch
        } else {
            AckPolicy::OpcodeAndChecksum
        };

        Config {
            ack_timeout_ms: self.timeout_ms,
            close_max_attempts: self.close_attempts,
            ..Config::default()
        }
        .with_ack_policy(ack_policy)
    }

    fn faults(&self) -> FaultModel {
        FaultModel {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            duplicate_rate: self.duplicate,
            seed: self.seed,
        }
    }

    fn route(&self) -> Route {
        let local = SocketAddr::new(self.bind, self.data_port);
        let remote = SocketAddr::new(self.peer, self.peer_data_port);
        match self.relay {
            Some(relay) => Route::via(local, remote, relay),
            None => Route::direct(local, remote),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정 (RUST_LOG 로 조정)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = args.config();
    let route = args.route();

    info!("SWT Sender starting...");
    info!("Route: {} -> {} (next hop {})", route.local, route.remote, route.next_hop);
    info!("ACK timeout: {}ms, policy: {:?}", config.ack_timeout_ms, config.ack_policy);

    let data = tokio::fs::read(&args.file).await?;
    let chunker = PayloadChunker::new(args.chunk_size);
    let chunks = chunker.split(&data)?;
    info!(
        "Loaded {:?}: {} bytes, {} chunks of {} bytes",
        args.file,
        data.len(),
        chunks.len(),
        chunker.chunk_size()
    );

    let faults = args.faults();
    if !faults.is_transparent() {
        info!(
            "Fault injection: loss {:.1}%, corrupt {:.1}%, duplicate {:.1}% (seed {})",
            faults.loss_rate * 100.0,
            faults.corrupt_rate * 100.0,
            faults.duplicate_rate * 100.0,
            faults.seed
        );
    }

    let data_channel = UdpChannel::bind(route.local, config.recv_buffer_size).await?;
    let ack_channel =
        UdpChannel::bind(SocketAddr::new(args.bind, args.ack_port), config.recv_buffer_size).await?;

    let mut sender = Sender::new(
        config,
        LossyChannel::new(data_channel, faults.clone()),
        LossyChannel::new(
            ack_channel,
            FaultModel {
                seed: faults.seed.wrapping_add(1),
                ..faults
            },
        ),
        route,
    );

    for (index, chunk) in chunks.iter().enumerate() {
        let delivery = sender.send_chunk(chunk).await?;
        if delivery.transmissions > 1 {
            info!(
                "Chunk {}/{} (seq {}) needed {} transmissions",
                index + 1,
                chunks.len(),
                delivery.sequence,
                delivery.transmissions
            );
        }
    }

    match sender.close().await? {
        CloseOutcome::Acknowledged { transmissions } => {
            info!("Stream closed after {} END transmissions", transmissions);
        }
        CloseOutcome::GaveUp { transmissions } => {
            warn!("END unacknowledged after {} transmissions, exiting", transmissions);
        }
    }

    info!("{}", sender.stats().sender_summary());
    Ok(())
}
