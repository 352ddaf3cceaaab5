//! # TCP Server
//!
//! Accepts connections and hands every inbound frame to a [`Dispatcher`].
//!
//! For each accepted connection a task is spawned that:
//! 1. Reads `\n`-terminated frames in a loop
//! 2. Passes each parsed message to the dispatcher
//! 3. Writes the dispatcher's reply (if any) back on the same connection
//! 4. Tears the connection down on EOF, socket error or malformed frame
//!
//! A failing connection never affects the listener or other connections.

use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::Dispatcher;
use crate::common::connection::Connection;
use crate::common::error::TransportError;

/// Pause after a failed `accept()` before polling again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Handle to a running listener. Dropping it stops the server.
pub struct TcpServer {
    local_addr: SocketAddr,
    stop: watch::Sender<bool>,
}

impl TcpServer {
    /// Bind `ip:port` and start accepting in the background.
    ///
    /// Port `0` lets the OS choose; see [`TcpServer::local_addr`].
    pub async fn bind(ip: &str, port: u16, dispatcher: Dispatcher) -> Result<Self, TransportError> {
        let listener = TcpListener::bind((ip, port)).await?;
        let local_addr = listener.local_addr()?;
        let (stop, stop_rx) = watch::channel(false);

        info!("📡 Listening on {}", local_addr);

        tokio::spawn(accept_loop(listener, dispatcher, stop_rx));

        Ok(Self { local_addr, stop })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        !*self.stop.borrow()
    }

    /// Stop accepting and close every open connection.
    pub fn stop(&self) {
        if !self.stop.send_replace(true) {
            info!("🛑 Server on {} stopped", self.local_addr);
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(listener: TcpListener, dispatcher: Dispatcher, mut stop: watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = stop.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    debug!("🔗 Accepted connection from {}", addr);
                    tokio::spawn(handle_connection(socket, dispatcher.clone(), stop.clone()));
                }
                Err(e) => {
                    error!("❌ Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    debug!("Accept loop exited");
}

async fn handle_connection(socket: TcpStream, dispatcher: Dispatcher, mut stop: watch::Receiver<bool>) {
    let mut conn = Connection::new(socket);
    let peer = conn.peer_addr();

    loop {
        let next = tokio::select! {
            _ = stop.changed() => break,
            next = conn.read_message() => next,
        };

        match next {
            Ok(Some(message)) => {
                let msg_type = message.msg_type().to_string();

                if let Some(response) = dispatcher(message, peer).await {
                    debug!("📤 Replying {} to {:?}", response.msg_type(), peer);

                    if let Err(e) = conn.write_message(&response).await {
                        warn!("❌ Failed to reply to {} from {:?}: {}", msg_type, peer, e);
                        break;
                    }
                }
            }
            Ok(None) => {
                debug!("🔌 Connection from {:?} closed", peer);
                break;
            }
            Err(e) => {
                warn!("❌ Dropping connection from {:?}: {}", peer, e);
                break;
            }
        }
    }
}
