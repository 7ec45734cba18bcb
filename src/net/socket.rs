//! The persistent websocket connection.
//!
//! One spawned task owns the socket: it forwards inbound text frames to the
//! main thread as [`NetEvent::Frame`]s and drains an unbounded channel of
//! outbound payloads into the sink. TLS is negotiated from the URL scheme.
//! There is no reconnect: when the socket drops, the task ends after posting
//! [`NetEvent::SocketClosed`].

use std::sync::mpsc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::unbounded_channel;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::net::NetEvent;

pub fn spawn_socket(url: String, tx: mpsc::Sender<NetEvent>) {
    tokio::spawn(async move {
        let (socket, _response) = match connect_async(url.as_str()).await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("websocket connect to {url} failed: {e}");
                return;
            }
        };
        log::info!("websocket open: {url}");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = unbounded_channel::<String>();
        if tx.send(NetEvent::SocketOpen { outbound: outbound_tx }).is_err() {
            return;
        }

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if tx.send(NetEvent::Frame(text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    // Pings are answered by the protocol layer on flush.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::warn!("websocket read error: {e}");
                        break;
                    }
                },
                outbound = outbound_rx.recv() => match outbound {
                    Some(payload) => {
                        if let Err(e) = sink.send(WsMessage::Text(payload)).await {
                            log::warn!("websocket send error: {e}");
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        let _ = tx.send(NetEvent::SocketClosed);
    });
}
