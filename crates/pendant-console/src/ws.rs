use futures_util::{SinkExt, StreamExt};
use pendant_core::{Generation, Transport, TransportError, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

struct Channel {
    generation: Generation,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// WebSocket transport. Each `open` spawns one task that owns the socket and
/// reports back tagged with the generation it was opened for.
pub struct WsTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    channel: Option<Channel>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            channel: None,
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &Url, generation: Generation) {
        self.close();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(channel_loop(
            url.clone(),
            generation,
            outbound_rx,
            self.events.clone(),
        ));
        self.channel = Some(Channel {
            generation,
            outbound,
            task,
        });
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let channel = self.channel.as_ref().ok_or(TransportError::NotOpen)?;
        if channel.task.is_finished() {
            return Err(TransportError::ChannelClosed);
        }
        channel
            .outbound
            .send(text)
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            debug!(event = "ws_close", generation = %channel.generation);
            // Dropping the sender lets a connected task close the socket.
            drop(channel.outbound);
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.task.abort();
        }
    }
}

async fn channel_loop(
    url: Url,
    generation: Generation,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let (mut ws, _) = match connect_async(url.clone()).await {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "ws_connect_error", %generation, %url, "{err}");
            let _ = events.send(TransportEvent::errored(generation, err.to_string()));
            return;
        }
    };
    if events.send(TransportEvent::opened(generation)).is_err() {
        let _ = ws.close(None).await;
        return;
    }

    loop {
        tokio::select! {
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if events.send(TransportEvent::message(generation, text)).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = events.send(TransportEvent::closed(generation));
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(event = "ws_read_error", %generation, "{err}");
                        let _ = events.send(TransportEvent::errored(generation, err.to_string()));
                        return;
                    }
                }
            }
            out = outbound.recv() => {
                let Some(text) = out else {
                    break;
                };
                if let Err(err) = ws.send(Message::Text(text)).await {
                    warn!(event = "ws_write_error", %generation, "{err}");
                    let _ = events.send(TransportEvent::errored(generation, err.to_string()));
                    return;
                }
            }
        }
    }
    let _ = ws.close(None).await;
}
