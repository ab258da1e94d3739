use super::{SocketProbe, SocketState};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::TcpStream;

impl SocketProbe {
    /// Bounded by the caller's deadline in [`SocketProbe::check_state`].
    pub(crate) async fn probe_tcp(&self, addr: SocketAddr) -> SocketState {
        match TcpStream::connect(addr).await {
            Ok(_stream) => SocketState::Open,
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => SocketState::Refused,
            Err(e) => SocketState::Unreachable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::network::{PortSpec, SocketProbe, SocketState};
    use crate::utils::ProbeResult;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_is_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = SocketProbe::new("127.0.0.1", PortSpec::tcp(port)).run().await;
        assert_eq!(result, ProbeResult::success("open"));
    }

    #[tokio::test]
    async fn test_closed_port_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = SocketProbe::new("127.0.0.1", PortSpec::tcp(port));
        assert_eq!(probe.check_state().await.unwrap(), SocketState::Refused);
        assert_eq!(probe.run().await, ProbeResult::success("unreachable"));
    }
}
