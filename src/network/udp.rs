use super::{SocketProbe, SocketState};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// How long to wait for an ICMP port-unreachable to surface on the socket.
const UDP_REPLY_WINDOW: Duration = Duration::from_millis(100);

impl SocketProbe {
    /// UDP has no handshake: a port counts as open unless the peer answers
    /// the datagram with a port-unreachable.
    pub(crate) async fn probe_udp(&self, addr: SocketAddr) -> SocketState {
        let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };

        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => return SocketState::Unreachable(e.to_string()),
        };
        if let Err(e) = socket.connect(addr).await {
            return SocketState::Unreachable(e.to_string());
        }

        if let Err(e) = socket.send(b"sleuth").await {
            return SocketState::Unreachable(e.to_string());
        }

        let mut buf = [0; 512];
        match timeout(UDP_REPLY_WINDOW, socket.recv(&mut buf)).await {
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => SocketState::Refused,
            Ok(Err(e)) => SocketState::Unreachable(e.to_string()),
            Ok(Ok(_)) | Err(_) => SocketState::Open,
        }
    }
}
