//! One-shot request/response client.
//!
//! Every call opens a fresh connection, sends one frame and, if asked, waits
//! for exactly one reply frame. The connection is dropped (closed) on every
//! exit path.

use log::debug;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::common::connection::Connection;
use crate::common::error::TransportError;
use crate::common::messages::Message;

/// Send `message` to `ip:port`.
///
/// With `await_response`, waits up to `timeout` for one reply frame. Any
/// connect, send, parse or timeout failure yields `None`; callers treat it as
/// "peer not available".
pub async fn send_message(
    ip: &str,
    port: u16,
    message: &Message,
    await_response: bool,
    timeout: Duration,
) -> Option<Message> {
    debug!(
        "Sending {} to {}:{} (src={} dst={:?})",
        message.msg_type(),
        ip,
        port,
        message.src(),
        message.dst()
    );

    match exchange(ip, port, message, await_response, timeout).await {
        Ok(response) => response,
        Err(e) => {
            debug!("No response from {}:{} for {}: {}", ip, port, message.msg_type(), e);
            None
        }
    }
}

async fn exchange(
    ip: &str,
    port: u16,
    message: &Message,
    await_response: bool,
    timeout: Duration,
) -> Result<Option<Message>, TransportError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect((ip, port)))
        .await
        .map_err(|_| TransportError::Timeout)??;

    let mut conn = Connection::new(stream);
    conn.write_message(message).await?;

    if !await_response {
        return Ok(None);
    }

    let response = tokio::time::timeout(timeout, conn.read_message())
        .await
        .map_err(|_| TransportError::Timeout)??;

    if let Some(reply) = &response {
        debug!("Response {} received from {}", reply.msg_type(), reply.src());
    }

    Ok(response)
}
