//! HTTP transport for the detection alerting engine.
//!
//! A deliberately small HTTP/1.1 server over `std::net::TcpListener`: one
//! accept loop with an atomic shutdown flag, one thread per connection.
//! Connections are persistent and serve requests until the client sends
//! `Connection: close`, goes idle, or hits the per-connection cap. Frames
//! are processed concurrently; the engine serializes only its cooldown map
//! and frame counter, and inference holds the backend mutex without
//! touching any engine lock.
//!
//! `/detect` degrades gracefully: a frame that fails before the engine
//! runs (undecodable image, inference error) answers HTTP 200 with an
//! empty-shaped result and an `error` field, so mobile clients keep their
//! persistent connection instead of tearing it down on a transient fault.
//! A request with no body at all is a client error and gets HTTP 400.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::DetectorBackend;
use crate::engine::{now_rfc3339, round_ms, Engine, FrameResult};

/// Image uploads cap the request size.
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_IDLE_SLEEP: Duration = Duration::from_millis(50);
/// Requests served on one connection before it is closed.
const KEEP_ALIVE_MAX_REQUESTS: usize = 1000;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Shared server state: the engine plus the optional model runner.
pub struct ServerState {
    pub engine: Engine,
    backend: Option<Arc<Mutex<dyn DetectorBackend>>>,
    rotate_portrait: bool,
    started: Instant,
}

impl ServerState {
    pub fn new(
        engine: Engine,
        backend: Option<Arc<Mutex<dyn DetectorBackend>>>,
        rotate_portrait: bool,
    ) -> Self {
        Self {
            engine,
            backend,
            rotate_portrait,
            started: Instant::now(),
        }
    }

    fn backend_name(&self) -> Option<String> {
        let backend = self.backend.as_ref()?;
        let guard = backend.lock().ok()?;
        Some(guard.name().to_string())
    }

    fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    state: Arc<ServerState>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, state: Arc<ServerState>) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let state = self.state;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, state, shutdown_thread) {
                log::error!("detect api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let state = state.clone();
                std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &state) {
                        log::warn!("detect api request failed: {:#}", err);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_IDLE_SLEEP);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &ServerState) -> Result<()> {
    // HTTP/1.1 persistent connections: keep serving requests until the
    // client asks to close, goes quiet, or hits the per-connection cap.
    for served in 1.. {
        let Some(request) = read_request(&mut stream)? else {
            return Ok(());
        };
        let keep_alive = request.keep_alive && served < KEEP_ALIVE_MAX_REQUESTS;
        dispatch(&mut stream, state, &request, keep_alive)?;
        if !keep_alive {
            return Ok(());
        }
    }
    Ok(())
}

fn dispatch(
    stream: &mut TcpStream,
    state: &ServerState,
    request: &HttpRequest,
    keep_alive: bool,
) -> Result<()> {
    match (request.method.as_str(), request.path.as_str()) {
        ("POST", "/detect") => handle_detect(stream, state, &request.body, keep_alive),
        ("POST", "/reset") => {
            state.engine.reset_cooldowns();
            log::info!("cooldowns reset");
            write_json(
                stream,
                200,
                keep_alive,
                &json!({
                    "message": "cooldowns reset",
                    "timestamp": now_rfc3339(),
                }),
            )
        }
        ("GET", "/health") => write_json(
            stream,
            200,
            keep_alive,
            &json!({
                "status": "healthy",
                "model_loaded": state.backend_name().is_some(),
                "backend": state.backend_name(),
                "frames_processed": state.engine.frames_processed(),
            }),
        ),
        ("GET", "/stats") => {
            let cfg = state.engine.config();
            write_json(
                stream,
                200,
                keep_alive,
                &json!({
                    "frames_processed": state.engine.frames_processed(),
                    "backend": state.backend_name(),
                    "confidence_threshold": cfg.confidence_threshold,
                    "cooldown_seconds": cfg.cooldown.as_secs_f64(),
                    "priority_classes": &cfg.priority_classes,
                    "cooldown_entries": state.engine.cooldown_entries(),
                    "uptime_seconds": state.uptime_seconds(),
                }),
            )
        }
        ("GET", "/config") => {
            let cfg = state.engine.config();
            write_json(
                stream,
                200,
                keep_alive,
                &json!({
                    "confidence_threshold": cfg.confidence_threshold,
                    "center_threshold": cfg.center_threshold,
                    "cooldown_seconds": cfg.cooldown.as_secs_f64(),
                    "max_detections": cfg.max_detections,
                    "default_threshold": cfg.default_threshold,
                    "class_thresholds": &cfg.class_thresholds,
                    "priority_classes": &cfg.priority_classes,
                }),
            )
        }
        ("GET", "/classes") => {
            let Some(backend) = &state.backend else {
                return write_json(stream, 500, keep_alive, &json!({"error": "model not loaded"}));
            };
            let classes = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.class_names().to_vec()
            };
            write_json(
                stream,
                200,
                keep_alive,
                &json!({
                    "classes": &classes,
                    "total_classes": classes.len(),
                    "priority_classes": &state.engine.config().priority_classes,
                }),
            )
        }
        _ => write_json(
            stream,
            404,
            keep_alive,
            &json!({
                "error": "endpoint not found",
                "available_endpoints": [
                    "POST /detect",
                    "POST /reset",
                    "GET /health",
                    "GET /stats",
                    "GET /config",
                    "GET /classes",
                ],
            }),
        ),
    }
}

fn handle_detect(
    stream: &mut TcpStream,
    state: &ServerState,
    body: &[u8],
    keep_alive: bool,
) -> Result<()> {
    let started = Instant::now();
    let Some(backend) = &state.backend else {
        return write_json(stream, 500, keep_alive, &json!({"error": "model not loaded"}));
    };
    if body.is_empty() {
        // a request with no frame at all is a client error, not a
        // degraded detection
        return write_json(stream, 400, keep_alive, &json!({"error": "no image sent"}));
    }

    let mut result = match run_detect(state, backend, body) {
        Ok(result) => result,
        Err(err) => {
            log::warn!("detect request degraded: {:#}", err);
            FrameResult::empty(state.engine.frames_processed(), format!("{:#}", err))
        }
    };
    result.processing_time = Some(round_ms(started.elapsed().as_secs_f64() * 1000.0));

    let payload = serde_json::to_vec(&result)?;
    write_response(stream, 200, "application/json", &payload, keep_alive)
}

fn run_detect(
    state: &ServerState,
    backend: &Arc<Mutex<dyn DetectorBackend>>,
    body: &[u8],
) -> Result<FrameResult> {
    let mut img = image::load_from_memory(body).context("failed to decode image")?;
    if state.rotate_portrait {
        img = img.rotate90();
    }
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    // Inference holds only the backend lock; engine locks are internal and
    // never span this call.
    let (output, class_names) = {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        let output = guard.detect(rgb.as_raw(), width, height)?;
        (output, guard.class_names().to_vec())
    };

    Ok(state.engine.process_frame(
        &output.detections,
        &class_names,
        width,
        height,
        output.inference_time,
    ))
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
    keep_alive: bool,
}

/// Read one request off the stream. `Ok(None)` means the client closed the
/// connection (or went idle past the read timeout) between requests.
fn read_request(stream: &mut TcpStream) -> Result<Option<HttpRequest>> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = match stream.read(&mut buf) {
            Ok(n) => n,
            Err(err)
                if data.is_empty()
                    && matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            if data.is_empty() {
                return Ok(None);
            }
            return Err(anyhow!("connection closed before headers finished"));
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let header_text = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .map(|value| value.parse())
        .transpose()
        .map_err(|_| anyhow!("invalid content-length header"))?
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Err(anyhow!("request body too large"));
    }

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(anyhow!("connection closed mid-body"));
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    // HTTP/1.1 connections persist unless the client opts out
    let keep_alive = headers
        .get("connection")
        .map(|value| !value.eq_ignore_ascii_case("close"))
        .unwrap_or(true);
    Ok(Some(HttpRequest {
        method: method.to_string(),
        path,
        body,
        keep_alive,
    }))
}

fn write_json(
    stream: &mut TcpStream,
    status: u16,
    keep_alive: bool,
    body: &serde_json::Value,
) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    write_response(stream, status, "application/json", &payload, keep_alive)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
    keep_alive: bool,
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let connection_headers = if keep_alive {
        format!(
            "Connection: keep-alive\r\nKeep-Alive: timeout={}, max={}\r\n",
            READ_TIMEOUT.as_secs(),
            KEEP_ALIVE_MAX_REQUESTS
        )
    } else {
        "Connection: close\r\n".to_string()
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\n{connection_headers}Cache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len(),
        connection_headers = connection_headers
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}
