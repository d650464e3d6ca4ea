//! Setup entry points: pick TCP or UDP from the configured protocol family
//! and bind or connect the matching socket.
//!
//! Configuration is validated before any socket is touched, so an
//! unsupported family never leaves anything listening or connected.

use crate::config::{AdapterConfig, Family};
use crate::error::Result;
use crate::output::RiemannOutput;
use crate::server::{ConnectionAccepter, RiemannInput, TcpServer, UdpServer};
use crate::traits::SharedSink;
use async_std::{
    net::{TcpListener, UdpSocket},
    sync::Arc,
};
use tracing::{info, instrument};

/// Connects an output to the configured collector.
#[instrument(skip(config), fields(protocol = %config.protocol))]
pub async fn output_setup(config: &AdapterConfig) -> Result<RiemannOutput> {
    let endpoint = config.endpoint()?;
    let handler_config = Arc::new(config.handler_config());
    info!("Setting up output to {}", endpoint);
    RiemannOutput::connect(&endpoint, handler_config, config.max_frame_len).await
}

/// Binds an input on the configured address.
///
/// # Arguments
///
/// * `config` - The adapter options. `protocol`, `host` and `port` choose
///   the socket; `max_frame_len` bounds TCP frames.
/// * `sink` - Where decoded events go. TCP connections each push into their
///   own clone, so the sink must be shared across clones.
///
/// # Returns
///
/// The bound, not yet serving input. An unsupported protocol family fails
/// with `Error::Config` before any socket is bound.
#[instrument(skip(config, sink), fields(protocol = %config.protocol))]
pub async fn input_setup<S>(config: &AdapterConfig, sink: S) -> Result<RiemannInput<S>>
where
    S: SharedSink,
{
    let endpoint = config.endpoint()?;
    let addr = (endpoint.host.as_str(), endpoint.port);

    let input = match endpoint.family {
        Family::Tcp => {
            let listener = TcpListener::bind(addr).await?;
            RiemannInput::Tcp(TcpServer::new(
                listener,
                ConnectionAccepter::new(sink, config.max_frame_len),
            ))
        }
        Family::Udp => {
            let socket = UdpSocket::bind(addr).await?;
            RiemannInput::Udp(UdpServer::new(socket, sink))
        }
    };

    info!("Listening on {}", endpoint);
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use crate::event::GenericEvent;
    use std::sync::Mutex;

    fn sink() -> Arc<Mutex<Vec<GenericEvent>>> {
        Arc::default()
    }

    fn config(protocol: &str) -> AdapterConfig {
        AdapterConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
            protocol: protocol.to_owned(),
            ..Default::default()
        }
    }

    #[async_std::test]
    async fn unsupported_family_fails_before_connecting() {
        let err = output_setup(&config("sctp")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnsupportedFamily(ref family)) if family == "sctp"
        ));

        let err = input_setup(&config("sctp"), sink())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[async_std::test]
    async fn selects_by_family() {
        let tcp = input_setup(&config("tcp"), sink())
            .await
            .unwrap();
        assert!(matches!(tcp, RiemannInput::Tcp(_)));
        assert_ne!(tcp.local_addr().unwrap().port(), 0);

        let udp = input_setup(&config("udp"), sink())
            .await
            .unwrap();
        assert!(matches!(udp, RiemannInput::Udp(_)));
    }

    #[async_std::test]
    async fn udp_output_needs_no_listener() {
        let output = output_setup(&config("udp:127.0.0.1:5555")).await.unwrap();
        assert!(matches!(output, RiemannOutput::Udp(_)));
    }
}
