//! Swarm commander — form-encoded POSTs to the generator's control
//! endpoint.

use std::future::Future;
use std::time::Duration;

use http_body_util::BodyExt;
use tracing::debug;

use surge_core::CommandError;

const SWARM_PATH: &str = "/swarm";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between the controller and the load generator.
///
/// Production uses `SwarmCommander`; tests substitute recording fakes.
pub trait LoadCommand {
    /// Command the generator to ramp toward `user_count` at
    /// `spawn_rate` users per second.
    fn set_target(
        &self,
        user_count: u32,
        spawn_rate: u32,
    ) -> impl Future<Output = Result<(), CommandError>> + Send;
}

/// HTTP client for the Locust-style `/swarm` control endpoint.
pub struct SwarmCommander {
    /// Generator authority ("host:port").
    authority: String,
    timeout: Duration,
}

impl SwarmCommander {
    pub fn new(authority: &str) -> Self {
        Self {
            authority: authority.to_string(),
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Override the command timeout (for tests).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl LoadCommand for SwarmCommander {
    async fn set_target(&self, user_count: u32, spawn_rate: u32) -> Result<(), CommandError> {
        let body = form_body(user_count, spawn_rate);
        debug!(authority = %self.authority, user_count, spawn_rate, "commanding swarm target");

        let request = async {
            let stream = tokio::net::TcpStream::connect(&self.authority)
                .await
                .map_err(|e| {
                    CommandError::Transport(format!("connect {}: {e}", self.authority))
                })?;

            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| CommandError::Transport(format!("handshake: {e}")))?;

            // Drive the connection in the background.
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let req = http::Request::builder()
                .method("POST")
                .uri(SWARM_PATH)
                .header("host", &self.authority)
                .header("user-agent", "surge-loadgen/0.1")
                .header(
                    "content-type",
                    "application/x-www-form-urlencoded; charset=UTF-8",
                )
                .body(http_body_util::Full::new(bytes::Bytes::from(body)))
                .map_err(|e| CommandError::Transport(format!("build request: {e}")))?;

            let resp = sender
                .send_request(req)
                .await
                .map_err(|e| CommandError::Transport(format!("request: {e}")))?;

            let status = resp.status();
            // Fire-and-forget: the body is ignored, only the status counts.
            let _ = resp.into_body().collect().await;

            if status.is_success() {
                Ok(())
            } else {
                Err(CommandError::Status(status.as_u16()))
            }
        };

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(CommandError::Transport(format!(
                "command timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Encode the swarm form body. The two fields are plain integers, so no
/// escaping is needed.
fn form_body(user_count: u32, spawn_rate: u32) -> String {
    format!("user_count={user_count}&spawn_rate={spawn_rate}")
}
