use std::fmt;
use std::time::Duration;

use crate::err::TransportResult;

/// Basic-auth credentials for the CIMOM.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// Keeps the password out of debug logs and error chains.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One CIM-XML POST, fully assembled by the dispatcher.
#[derive(Debug)]
pub struct TransportRequest<'a> {
    pub url: &'a str,
    /// Value for the `CIMMethod` header.
    pub method_name: &'a str,
    /// Value for the `CIMObject` header (namespace or object path).
    pub cim_object: &'a str,
    pub body: &'a [u8],
    pub credentials: Option<&'a Credentials>,
    pub timeout: Option<Duration>,
}

/// The server's reply plus the measured round-trip time.
#[derive(Debug)]
pub struct TransportReply {
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

/// The seam between the protocol core and HTTP(S).
///
/// Implementations must map failures onto the three
/// [`TransportError`](crate::err::TransportError) variants (connection,
/// authentication, timeout) and must not return a body on failure.
pub trait WbemTransport {
    fn send(&mut self, request: &TransportRequest<'_>) -> TransportResult<TransportReply>;
}

#[cfg(feature = "http")]
pub use self::http::UreqTransport;

#[cfg(feature = "http")]
mod http {
    use std::io::Read;
    use std::time::{Duration, Instant};

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use log::{debug, trace};

    use super::{TransportReply, TransportRequest, WbemTransport};
    use crate::err::{TransportError, TransportResult};

    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Blocking HTTP transport over a persistent ureq agent.
    pub struct UreqTransport {
        agent: ureq::Agent,
    }

    impl UreqTransport {
        pub fn new() -> Self {
            UreqTransport {
                agent: ureq::AgentBuilder::new().build(),
            }
        }
    }

    impl Default for UreqTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WbemTransport for UreqTransport {
        fn send(&mut self, request: &TransportRequest<'_>) -> TransportResult<TransportReply> {
            let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
            let mut call = self
                .agent
                .post(request.url)
                .timeout(timeout)
                .set("Content-Type", "application/xml; charset=\"utf-8\"")
                .set("CIMOperation", "MethodCall")
                .set("CIMMethod", request.method_name)
                .set("CIMObject", request.cim_object);
            if let Some(creds) = request.credentials {
                let token =
                    BASE64.encode(format!("{}:{}", creds.username, creds.password()));
                call = call.set("Authorization", &format!("Basic {token}"));
            }

            trace!(
                "POST {} ({} bytes, CIMMethod={})",
                request.url,
                request.body.len(),
                request.method_name
            );
            let started = Instant::now();
            let response = call.send_bytes(request.body);
            let elapsed = started.elapsed();

            match response {
                Ok(resp) => {
                    let mut body = Vec::new();
                    resp.into_reader()
                        .read_to_end(&mut body)
                        .map_err(|e| TransportError::Connect {
                            url: request.url.to_owned(),
                            reason: format!("failed to read response body: {e}"),
                        })?;
                    debug!(
                        "reply from {}: {} bytes in {:?}",
                        request.url,
                        body.len(),
                        elapsed
                    );
                    Ok(TransportReply { body, elapsed })
                }
                Err(ureq::Error::Status(code @ (401 | 407), _)) => Err(TransportError::Auth {
                    url: request.url.to_owned(),
                    reason: format!("HTTP status {code}"),
                }),
                Err(ureq::Error::Status(code, _)) => Err(TransportError::Connect {
                    url: request.url.to_owned(),
                    reason: format!("HTTP status {code}"),
                }),
                Err(ureq::Error::Transport(transport)) => {
                    let message = transport.to_string();
                    if message.contains("timed out") || message.contains("timeout") {
                        Err(TransportError::Timeout {
                            url: request.url.to_owned(),
                            timeout,
                        })
                    } else {
                        Err(TransportError::Connect {
                            url: request.url.to_owned(),
                            reason: message,
                        })
                    }
                }
            }
        }
    }
}
