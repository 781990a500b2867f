//! Loopback HTTP listener that receives the sign-in redirect.
//!
//! Binds `127.0.0.1`, waits for the browser to be redirected to
//! `http://localhost:{port}/?code=...&state=...`, answers it with a short
//! page and hands the authorization code back.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::auth::AuthError;

/// A connection that sends no request line within this window is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = "<html><body><h3>Signed in.</h3><p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h3>Sign-in failed.</h3><p>Check the terminal for details.</p></body></html>";

/// What a single request to the listener carried.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Redirect {
    Code { code: String, state: String },
    Error(String),
    Unrelated,
}

/// A bound loopback listener waiting for one sign-in redirect.
#[derive(Debug)]
pub struct LoopbackRedirect {
    listener: TcpListener,
    port: u16,
}

impl LoopbackRedirect {
    /// Bind `127.0.0.1:{port}`; port 0 picks a free one.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound.
    pub async fn bind(port: u16) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AuthError::Callback(format!("binding 127.0.0.1:{port}: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Callback(format!("reading bound address: {e}")))?
            .port();
        log::debug!("sign-in redirect listener on 127.0.0.1:{port}");
        Ok(Self { listener, port })
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register with the authorize request.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Wait for the redirect and return its authorization code.
    ///
    /// Requests without `code` or `error` (favicon probes and the like) are
    /// answered with 404 and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout, an `error` redirect, or a `state` mismatch.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        timeout: Duration,
    ) -> Result<String, AuthError> {
        tokio::time::timeout(timeout, self.accept_until_redirect(expected_state))
            .await
            .map_err(|_| {
                AuthError::Callback(format!(
                    "no sign-in completed within {}s",
                    timeout.as_secs()
                ))
            })?
    }

    async fn accept_until_redirect(&self, expected_state: &str) -> Result<String, AuthError> {
        loop {
            let (mut stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| AuthError::Callback(format!("accepting connection: {e}")))?;
            log::trace!("redirect connection from {peer}");

            let target = match tokio::time::timeout(
                REQUEST_READ_TIMEOUT,
                read_request_target(&mut stream),
            )
            .await
            {
                Ok(Some(target)) => target,
                Ok(None) => {
                    respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                    continue;
                }
                Err(_) => {
                    log::debug!("dropping idle redirect connection from {peer}");
                    continue;
                }
            };

            match parse_redirect(&target) {
                Redirect::Unrelated => {
                    respond(&mut stream, "404 Not Found", "").await;
                }
                Redirect::Error(reason) => {
                    respond(&mut stream, "200 OK", FAILURE_PAGE).await;
                    return Err(AuthError::Callback(reason));
                }
                Redirect::Code { code, state } => {
                    if state != expected_state {
                        respond(&mut stream, "400 Bad Request", FAILURE_PAGE).await;
                        return Err(AuthError::Callback(
                            "state mismatch in sign-in redirect".to_string(),
                        ));
                    }
                    respond(&mut stream, "200 OK", SUCCESS_PAGE).await;
                    return Ok(code);
                }
            }
        }
    }
}

/// Read the request head and return the request target (path + query).
async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = vec![0_u8; 8192];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = stream.read(&mut buffer[filled..]).await.ok()?;
        if n == 0 {
            break;
        }
        filled += n;
        if buffer[..filled].windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buffer[..filled]);
    let request_line = head.lines().next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    (method == "GET").then(|| target.to_string())
}

fn parse_redirect(target: &str) -> Redirect {
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return Redirect::Unrelated;
    };
    let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map_or_else(|| error.clone(), |d| format!("{error}: {d}"));
        return Redirect::Error(description);
    }

    match (params.get("code"), params.get("state")) {
        (Some(code), Some(state)) => Redirect::Code {
            code: code.clone(),
            state: state.clone(),
        },
        (Some(code), None) => Redirect::Code {
            code: code.clone(),
            state: String::new(),
        },
        _ => Redirect::Unrelated,
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        log::debug!("writing redirect response: {e}");
    }
    let _ = stream.shutdown().await;
}
