//! SWT 수신자 - Stop-and-Wait Transport
//!
//! 검증된 순서대로의 페이로드만 출력에 기록하고, 모든 패킷에 ACK/NAK 로 응답한다.
//! 손상/순서 어긋난 패킷은 에러 로그 파일에 한 줄씩 남는다.
//!
//! 사용법:
//!   cargo run --release --bin swt-receiver -- [OPTIONS]
//!
//! 예시:
//!   # 표준 출력으로 수신
//!   cargo run --release --bin swt-receiver
//!
//!   # 파일로 수신, 릴레이 경유 응답
//!   cargo run --release --bin swt-receiver -- -o received.txt --relay 10.0.0.9:2021

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use swt::transport::FaultModel;
use swt::{
    Config, LossyChannel, Receiver, Route, UdpChannel, ACK_RECEIVE_PORT, ACK_SEND_PORT,
    DATA_RECEIVE_PORT,
};

/// Stop-and-wait 수신자
#[derive(Parser, Debug)]
#[command(name = "swt-receiver", version, about)]
struct Args {
    /// 로컬 IP 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    bind: IpAddr,

    /// 송신자 IP 주소
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    peer: IpAddr,

    /// DATA/END 수신 포트
    #[arg(long, default_value_t = DATA_RECEIVE_PORT)]
    data_port: u16,

    /// ACK/NAK 송신 포트
    #[arg(long, default_value_t = ACK_SEND_PORT)]
    ack_port: u16,

    /// 송신자의 ACK 수신 포트
    #[arg(long, default_value_t = ACK_RECEIVE_PORT)]
    peer_ack_port: u16,

    /// 릴레이 주소 (지정 시 모든 ACK/NAK 를 릴레이로 전송)
    #[arg(long)]
    relay: Option<SocketAddr>,

    /// 출력 파일 (생략 시 표준 출력)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 손상/순서 어긋난 패킷 로그 파일
    #[arg(long, default_value = "receiver_errors.log")]
    error_log: PathBuf,

    /// 응답 패킷 손실 확률
    #[arg(long, default_value_t = 0.0)]
    loss: f64,

    /// 응답 패킷 손상 확률
    #[arg(long, default_value_t = 0.0)]
    corrupt: f64,

    /// 응답 패킷 중복 확률
    #[arg(long, default_value_t = 0.0)]
    duplicate: f64,

    /// 장애 주입 난수 시드
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Args {
    fn route(&self) -> Route {
        let local = SocketAddr::new(self.bind, self.ack_port);
        let remote = SocketAddr::new(self.peer, self.peer_ack_port);
        match self.relay {
            Some(relay) => Route::via(local, remote, relay),
            None => Route::direct(local, remote),
        }
    }

    fn faults(&self) -> FaultModel {
        FaultModel {
            loss_rate: self.loss,
            corrupt_rate: self.corrupt,
            duplicate_rate: self.duplicate,
            seed: self.seed,
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
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = Config::default();
    let route = args.route();

    info!("SWT Receiver starting...");
    info!("Listening on {}:{}", args.bind, args.data_port);
    info!("Replies: {} -> {} (next hop {})", route.local, route.remote, route.next_hop);

    let output: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => {
            info!("Output file: {:?}", path);
            Box::new(tokio::fs::File::create(path).await?)
        }
        None => Box::new(tokio::io::stdout()),
    };
    let diagnostics = tokio::fs::File::create(&args.error_log).await?;
    info!("Error log: {:?}", args.error_log);

    let data_channel = UdpChannel::bind(
        SocketAddr::new(args.bind, args.data_port),
        config.recv_buffer_size,
    )
    .await?;
    let ack_channel = UdpChannel::bind(route.local, config.recv_buffer_size).await?;

    let faults = args.faults();
    let mut receiver = Receiver::new(
        config,
        LossyChannel::new(data_channel, faults.clone()),
        LossyChannel::new(ack_channel, faults),
        route,
        output,
        diagnostics,
    );

    let delivered = receiver.run().await?;

    info!("Transfer complete: {} chunks delivered", delivered);
    info!("{}", receiver.stats().receiver_summary());
    Ok(())
}
