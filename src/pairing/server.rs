//! Pairing Web Page
//!
//! `GET /{account}` shows the current QR code (or the pairing outcome) and
//! `GET /{account}/ws` pushes every status change so the page can refresh.

use super::{PairingPublisher, PairingStatus, qr};
use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct PairingServerState {
    pub account: String,
    pub publisher: Arc<PairingPublisher>,
}

pub fn router(state: PairingServerState) -> Router {
    Router::new()
        .route("/{account}", get(page_handler))
        .route("/{account}/ws", get(ws_handler))
        .with_state(state)
}

/// Bind `port` on all interfaces and serve in a background task.
pub async fn spawn(
    port: u16,
    state: PairingServerState,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    let addr = listener.local_addr()?;
    tracing::info!("Pairing: page at http://localhost:{}/{}", addr.port(), state.account);

    let app = router(state);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Pairing: server stopped: {}", e);
        }
    });
    Ok((addr, handle))
}

async fn page_handler(
    State(state): State<PairingServerState>,
    Path(account): Path<String>,
) -> Response {
    if account != state.account {
        return StatusCode::NOT_FOUND.into_response();
    }
    let status = state.publisher.current().await;
    Html(render_page(&state.account, &status)).into_response()
}

async fn ws_handler(
    State(state): State<PairingServerState>,
    Path(account): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if account != state.account {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| stream_status(socket, state.publisher))
}

async fn stream_status(mut socket: WebSocket, publisher: Arc<PairingPublisher>) {
    let (id, mut rx) = publisher.subscribe().await;
    loop {
        tokio::select! {
            status = rx.recv() => {
                // None: dropped by the publisher for falling behind
                let Some(status) = status else { break };
                let json = match serde_json::to_string(&status) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!("Pairing: cannot encode status: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    publisher.unsubscribe(id).await;
}

/// Page body for a status. The script reloads on every push after the first.
pub fn render_page(account: &str, status: &PairingStatus) -> String {
    let body = match status {
        PairingStatus::Waiting => "<p>Waiting for a pairing code&hellip;</p>".to_string(),
        PairingStatus::Code(code) => match qr::svg(code) {
            Some(svg) => format!("<p>Scan with WhatsApp &rarr; Linked devices</p>{svg}"),
            None => format!("<p>Pairing code:</p><pre>{}</pre>", escape(code)),
        },
        PairingStatus::Connected => "<h2>Connected</h2>".to_string(),
        PairingStatus::Mismatch => format!(
            "<h2>Wrong account</h2><p>The scanned phone is not {}. Restart and scan with the right phone.</p>",
            escape(account)
        ),
        PairingStatus::LoggedOut => "<h2>Logged out</h2><p>Restart to pair again.</p>".to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>invitabot · {account}</title>
<style>body{{font-family:sans-serif;text-align:center;margin-top:3em}}svg{{width:320px;height:320px}}</style>
</head>
<body>
<h1>{account}</h1>
{body}
<script>
(function() {{
  var first = true;
  var proto = location.protocol === "https:" ? "wss://" : "ws://";
  var ws = new WebSocket(proto + location.host + location.pathname.replace(/\/$/, "") + "/ws");
  ws.onmessage = function() {{
    if (first) {{ first = false; return; }}
    location.reload();
  }};
}})();
</script>
</body>
</html>
"#,
        account = escape(account),
        body = body,
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_render_page_states() {
        let page = render_page("555", &PairingStatus::Code("2@abc".into()));
        assert!(page.contains("<svg"));
        assert!(page.contains("/ws"));

        let page = render_page("555", &PairingStatus::Mismatch);
        assert!(page.contains("Wrong account"));
        assert!(!page.contains("<svg"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("<a href=\"x\">&"), "&lt;a href=&quot;x&quot;&gt;&amp;");
    }

    #[tokio::test]
    async fn test_serves_page_for_account_only() {
        let publisher = Arc::new(PairingPublisher::new());
        publisher.publish(PairingStatus::Connected).await;
        let (addr, handle) = spawn(
            0,
            PairingServerState {
                account: "5215512345678".into(),
                publisher,
            },
        )
        .await
        .unwrap();
        let addr = SocketAddr::from(([127, 0, 0, 1], addr.port()));

        let ok = get(addr, "/5215512345678").await;
        assert!(ok.starts_with("HTTP/1.1 200"));
        assert!(ok.contains("Connected"));

        let missing = get(addr, "/999").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        handle.abort();
    }
}
