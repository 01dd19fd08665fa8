use std::{sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{
    ChannelInner,
    protocol::{EVENT_CONNECT, EVENT_DISCONNECT, EventFrame},
};

/// Starting delay of the redial ladder.
const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// The backoff ladder is capped here.
const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Random extra delay keeps reconnecting clients from stampeding.
const RECONNECT_JITTER_MS: u64 = 500;

/// Connection actor: dial, pump frames, redial with backoff. Runs until
/// aborted by `EventChannel::disconnect`.
pub(super) async fn run(inner: Arc<ChannelInner>) {
    let mut delay = RECONNECT_BASE_DELAY;

    loop {
        let wait = match tokio_tungstenite::connect_async(inner.dial_url.as_str()).await {
            Ok((stream, _response)) => {
                info!("Event bus connected to {}", inner.dial_url);
                // A successful dial rewinds the ladder; only failed
                // dials escalate it.
                delay = RECONNECT_BASE_DELAY;
                match serve_connection(&inner, stream).await {
                    Ok(()) => info!("Event bus connection closed"),
                    Err(err) => warn!("Event bus connection lost: {err:#}"),
                }
                delay
            }
            Err(err) => {
                warn!("Event bus connection failed: {err:#}");
                let wait = delay;
                delay = (delay * 2).min(RECONNECT_MAX_DELAY);
                wait
            }
        };

        let jitter = Duration::from_millis(rand::rng().random_range(0..RECONNECT_JITTER_MS));
        debug!("Reconnecting in {:?}", wait + jitter);
        tokio::time::sleep(wait + jitter).await;
    }
}

/// One established connection: expose the outbound queue, pump until the
/// transport drops, withdraw the queue. The synthetic connect and
/// disconnect events bracket the live span, so handlers can (re)issue
/// room joins at exactly the right moment.
async fn serve_connection(
    inner: &Arc<ChannelInner>,
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
) -> Result<(), anyhow::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EventFrame>();
    *inner.outbound.lock().unwrap() = Some(tx);
    inner.dispatch(EVENT_CONNECT, Value::Null);

    let result = pump_frames(inner, &mut stream, &mut rx).await;

    // Withdraw the queue first so joins issued from now on are rejected,
    // then tell listeners the transport is gone.
    inner.outbound.lock().unwrap().take();
    inner.dispatch(EVENT_DISCONNECT, Value::Null);

    result
}

async fn pump_frames(
    inner: &Arc<ChannelInner>,
    stream: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut mpsc::UnboundedReceiver<EventFrame>,
) -> Result<(), anyhow::Error> {
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                stream.send(Message::text(frame.to_json())).await?;
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match EventFrame::parse(text.as_str()) {
                        Ok(frame) => inner.dispatch(&frame.event, frame.data),
                        Err(err) => debug!("Discarding unparseable bus frame: {err}"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Event bus closed the connection: {frame:?}");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => return Ok(()),
                }
            }
        }
    }
}
