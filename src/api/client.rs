//! Purpose: Single request/response exchange with the host plugin's API port.
//! Exports: `HostClient`, `ApiResult`, `connect`.
//! Role: Stable transport for the build/deploy flow (`get_data_folder`, `load_plugin`).
//! Invariants: Exactly one frame out and at most one frame in per call.
//! Invariants: The socket is owned by one call and dropped on every exit path.
//! Invariants: `call` never fails; transport errors become `{error, data: ""}`.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::message::{PluginKind, Request, Response};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{FrameReader, write_frame};
use crate::targets::{DEFAULT_HOST, DEFAULT_TIMEOUT};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct HostClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl HostClient {
    pub fn new(port: u16) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Perform one exchange, folding any failure into the reply's `error`.
    pub fn call(&self, route: &str, data: Value) -> Response {
        self.send(&Request::new(route, data))
    }

    pub fn send(&self, request: &Request) -> Response {
        match self.try_send(request) {
            Ok(response) => response,
            Err(err) => {
                debug!(
                    route = %request.route,
                    kind = ?err.kind(),
                    "host call failed: {}",
                    err.describe()
                );
                Response::failure(err.describe())
            }
        }
    }

    pub fn try_call(&self, route: &str, data: Value) -> ApiResult<Response> {
        self.try_send(&Request::new(route, data))
    }

    pub fn try_send(&self, request: &Request) -> ApiResult<Response> {
        let mut stream = connect(&self.host, self.port, self.timeout)?;
        debug!(route = %request.route, port = self.port, "sending host request");
        write_frame(&mut stream, request)?;

        let mut frames = FrameReader::new(stream);
        let response = frames.decode_next_as::<Response>()?.ok_or_else(|| {
            Error::new(ErrorKind::Connection)
                .with_message(format!("{} closed the connection without replying", self.endpoint()))
        })?;
        debug!(route = %request.route, ok = response.is_ok(), "host replied");
        Ok(response)
    }

    pub fn data_folder(&self) -> Response {
        self.send(&Request::get_data_folder())
    }

    pub fn load_plugin(&self, id: &str, kind: PluginKind) -> Response {
        self.send(&Request::load_plugin(id, kind))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Open a blocking connection with `timeout` applied to connect, send and
/// every receive.
pub fn connect(host: &str, port: u16, timeout: Duration) -> ApiResult<TcpStream> {
    let endpoint = format!("{host}:{port}");
    let addrs = (host, port).to_socket_addrs().map_err(|err| {
        Error::new(ErrorKind::Connection)
            .with_message(format!("failed to resolve {endpoint}"))
            .with_source(err)
    })?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                configure(&stream, timeout).map_err(|err| {
                    Error::new(ErrorKind::Connection)
                        .with_message(format!("failed to configure socket for {endpoint}"))
                        .with_source(err)
                })?;
                debug!(%addr, "connected to host");
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    let err = Error::new(ErrorKind::Connection)
        .with_message(format!("failed to connect to {endpoint}"))
        .with_hint("Is the game running with the Openplanet plugin listening on this port?");
    Err(match last_err {
        Some(source) => err.with_source(source),
        None => err,
    })
}

fn configure(stream: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)
}
