//! HTTP and WebSocket surface.
//!
//! Each connection gets one hub subscription and two tasks: a write loop that
//! drains the subscriber queue onto the socket, and a read loop that answers
//! requests through the same queue. Either loop ending cancels the other.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::AppContext;
use crate::hub::{ReplySender, Subscriber, SubscriberId};
use crate::protocol;

/// How long a dropped subscriber gets to take the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Routes: `GET /ws` and `GET /health`.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(ctx)
}

/// Serve on an already bound listener until the server fails.
pub async fn serve(listener: TcpListener, ctx: Arc<AppContext>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{addr}");
    }
    axum::serve(listener, router(ctx)).await
}

async fn ws_handler(State(ctx): State<Arc<AppContext>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(ctx, socket))
}

async fn handle_socket(ctx: Arc<AppContext>, socket: WebSocket) {
    let subscriber = ctx.hub.register();
    let id = subscriber.id();
    let replies = subscriber.reply_sender();
    let cancel = subscriber.cancellation_token();
    info!(subscriber = %id, "Subscriber connected");

    let (sink, stream) = socket.split();
    let write_task = tokio::spawn(write_loop(subscriber, sink));
    let read_task = tokio::spawn(read_loop(ctx.clone(), id, stream, replies, cancel));

    let (written, read) = tokio::join!(write_task, read_task);
    for (side, joined) in [("write", written), ("read", read)] {
        if let Err(e) = joined {
            error!(subscriber = %id, "Connection {side} loop failed: {e}");
        }
    }
    ctx.hub.unregister(id);
    info!(subscriber = %id, "Subscriber disconnected");
}

async fn write_loop(mut subscriber: Subscriber, mut sink: SplitSink<WebSocket, Message>) {
    let id = subscriber.id();
    let cancel = subscriber.cancellation_token();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = subscriber.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        // A client that stopped reading can stall the send itself.
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(Message::Text(message.as_ref().into())) => sent,
        };
        if let Err(e) = sent {
            debug!(subscriber = %id, "Write failed: {e}");
            break;
        }
    }

    cancel.cancel();
    if tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        debug!(subscriber = %id, "Close handshake timed out");
    }
}

async fn read_loop(
    ctx: Arc<AppContext>,
    id: SubscriberId,
    mut stream: SplitStream<WebSocket>,
    replies: ReplySender,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(subscriber = %id, "Read failed: {e}");
                break;
            }
        };

        let reply = match protocol::handle_message(&ctx, text.as_str()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(subscriber = %id, "Rejected request: {e}");
                match protocol::encode_error(&e) {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!(subscriber = %id, "Failed to encode error reply: {e}");
                        continue;
                    }
                }
            }
        };

        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = replies.send(reply) => sent,
        };
        if sent.is_err() {
            break;
        }
    }

    cancel.cancel();
}
