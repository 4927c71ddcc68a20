//! UDP 리스너 -- 데이터그램을 수신하여 핸들러로 전달합니다.
//!
//! 소켓은 `socket2`로 SO_REUSEADDR을 설정한 뒤 `tokio::net::UdpSocket`으로 변환합니다.
//! 수신 루프는 다음 중 하나가 일어날 때까지 실행됩니다.
//!
//! - 예약된 종료 페이로드 [`EXIT_SENTINEL`] 수신 ([`ListenerHandle::close`]가 전송)
//! - 핸들러의 `handle`이 `false` 반환
//!
//! 루프를 빠져나오면 `pre_shutdown` 훅이 실행됩니다.
//! 데이터그램 단위의 I/O 에러는 로그만 남기고 계속 수신합니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use metrics::counter;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use telemon_core::metrics as m;
use telemon_core::types::MetricSample;

use crate::error::CollectdError;
use crate::handler::CollectdHandler;

/// 리스너 종료를 요청하는 예약 페이로드
pub const EXIT_SENTINEL: &[u8] = b"EXIT";

/// 데이터그램 처리기
pub trait DatagramHandler: Send {
    /// 데이터그램 하나를 처리합니다. `false`를 반환하면 수신 루프가 종료됩니다.
    fn handle(&mut self, data: &[u8], addr: SocketAddr) -> bool;

    /// 수신 루프 종료 직후 호출됩니다.
    fn pre_shutdown(&mut self) {}
}

/// 바인드된 UDP 리스너
pub struct UdpListener {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_datagram_size: usize,
}

impl UdpListener {
    /// 주소를 해석하여 소켓을 바인드합니다.
    ///
    /// 해석 결과의 첫 주소가 소켓 패밀리를 결정합니다.
    /// 실패는 모두 `Connect` 에러입니다.
    pub async fn bind(addr: &str, max_datagram_size: usize) -> Result<Self, CollectdError> {
        let connect_error = |reason: String| CollectdError::Connect {
            addr: addr.to_owned(),
            reason,
        };

        let target = tokio::net::lookup_host(addr)
            .await
            .map_err(|e| connect_error(e.to_string()))?
            .next()
            .ok_or_else(|| connect_error("address resolved to nothing".to_owned()))?;

        let socket = bind_reuse(target).map_err(|e| connect_error(e.to_string()))?;
        let local_addr = socket
            .local_addr()
            .map_err(|e| connect_error(e.to_string()))?;

        info!(addr, local = %local_addr, "collectd listener bound");

        Ok(Self {
            socket,
            local_addr,
            max_datagram_size,
        })
    }

    /// 실제 바인드된 주소를 반환합니다.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 종료 핸들을 반환합니다.
    pub fn close_handle(&self) -> ListenerHandle {
        ListenerHandle {
            target: self.local_addr,
        }
    }

    /// 수신 루프를 실행하고, 종료 후 핸들러를 돌려줍니다.
    pub async fn run<H: DatagramHandler>(self, mut handler: H) -> H {
        let mut buf = vec![0u8; self.max_datagram_size];
        info!(local = %self.local_addr, "collectd listener started");

        loop {
            let (len, addr) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "failed to receive datagram, retrying");
                    continue;
                }
            };

            let data = &buf[..len];
            if data == EXIT_SENTINEL {
                debug!(from = %addr, "received exit sentinel");
                break;
            }

            counter!(m::COLLECTD_DATAGRAMS_RECEIVED_TOTAL).increment(1);
            if !handler.handle(data, addr) {
                debug!("handler requested listener shutdown");
                break;
            }
        }

        handler.pre_shutdown();
        info!(local = %self.local_addr, "collectd listener stopped");
        handler
    }
}

fn bind_reuse(target: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&target.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

/// 리스너 종료 핸들
///
/// 리스너 자신에게 [`EXIT_SENTINEL`]을 보내 블로킹된 수신을 깨웁니다.
#[derive(Debug, Clone, Copy)]
pub struct ListenerHandle {
    target: SocketAddr,
}

impl ListenerHandle {
    /// 종료 페이로드를 보낼 주소를 반환합니다.
    ///
    /// 미지정 주소(`0.0.0.0`, `::`)로 바인드된 경우 같은 패밀리의 루프백으로 보냅니다.
    pub fn target(&self) -> SocketAddr {
        let ip = match self.target.ip() {
            IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        SocketAddr::new(ip, self.target.port())
    }

    /// 리스너에 종료 페이로드를 보냅니다.
    pub async fn close(&self) -> Result<(), CollectdError> {
        let target = self.target();
        let local: SocketAddr = match target {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.send_to(EXIT_SENTINEL, target).await?;
        debug!(target = %target, "sent exit sentinel to listener");
        Ok(())
    }
}

/// collectd 서버 -- 핸들러 결과를 라우터 큐로 보냅니다.
pub struct CollectdServer {
    handler: CollectdHandler,
    tx: mpsc::Sender<MetricSample>,
}

impl CollectdServer {
    /// 핸들러와 큐 송신측으로 서버를 생성합니다.
    pub fn new(handler: CollectdHandler, tx: mpsc::Sender<MetricSample>) -> Self {
        Self { handler, tx }
    }

    /// 내부 핸들러를 반환합니다.
    pub fn handler(&self) -> &CollectdHandler {
        &self.handler
    }
}

impl DatagramHandler for CollectdServer {
    fn handle(&mut self, data: &[u8], addr: SocketAddr) -> bool {
        if self.tx.is_closed() {
            warn!("router queue closed, stopping listener");
            return false;
        }
        for sample in self.handler.handle_packet(data) {
            match self.tx.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(sample)) => {
                    counter!(
                        m::COLLECTD_SAMPLES_DROPPED_TOTAL,
                        m::LABEL_REASON => m::REASON_QUEUE_FULL
                    )
                    .increment(1);
                    warn!(from = %addr, name = sample.name.as_str(), "router queue full, dropping sample");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("router queue closed, stopping listener");
                    return false;
                }
            }
        }
        true
    }

    fn pre_shutdown(&mut self) {
        info!("shutting down collectd server");
    }
}
