//! HTTP surface over [`Checker`]
//!
//! | Route | Meaning |
//! |-------|---------|
//! | `POST /upload?filename=x.html&take_screenshots=true` | check the raw HTML body |
//! | `GET /reports` | all reports, newest first |
//! | `GET /reports/<run_id>` | one report |
//! | `GET <public_prefix>/<file>` | a screenshot artifact |
//!
//! The file name may also be sent in an `X-Filename` header.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, Server};
use url::Url;

use crate::{Checker, Error, Result, SessionLauncher};

type HttpResponse = Response<Cursor<Vec<u8>>>;

/// A bound listener, ready to serve.
pub struct HttpServer {
    server: Arc<Server>,
}

impl HttpServer {
    pub fn bind(addr: &str) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| Error::ConfigError(format!("cannot listen on {}: {}", addr, e)))?;
        Ok(Self {
            server: Arc::new(server),
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> String {
        self.server.server_addr().to_string()
    }

    /// Serve requests on `workers` threads until the listener fails.
    /// Checks are driven to completion on `runtime`.
    pub fn run<L>(self, checker: Arc<Checker<L>>, runtime: tokio::runtime::Handle, workers: usize)
    where
        L: SessionLauncher + Send + Sync + 'static,
    {
        info!("Listening on http://{}", self.local_addr());
        let handles: Vec<_> = (0..workers.max(1))
            .map(|i| {
                let server = Arc::clone(&self.server);
                let checker = Arc::clone(&checker);
                let runtime = runtime.clone();
                thread::Builder::new()
                    .name(format!("mailproof-http-{}", i))
                    .spawn(move || loop {
                        match server.recv() {
                            Ok(request) => handle(&checker, &runtime, request),
                            Err(e) => {
                                error!("HTTP listener stopped: {}", e);
                                break;
                            }
                        }
                    })
            })
            .collect();

        for handle in handles {
            match handle {
                Ok(h) => {
                    let _ = h.join();
                }
                Err(e) => error!("Failed to spawn HTTP worker: {}", e),
            }
        }
    }
}

fn json_response(status: u16, body: &serde_json::Value) -> HttpResponse {
    let mut resp = Response::from_string(body.to_string()).with_status_code(status);
    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        resp.add_header(h);
    }
    resp
}

fn error_response(err: &Error) -> HttpResponse {
    let status = match err {
        Error::InputError(_) => 400,
        Error::NotFound(_) => 404,
        _ => 500,
    };
    if !err.is_client_error() {
        error!("Request failed: {}", err);
    }
    json_response(status, &json!({ "error": err.to_string() }))
}

fn handle<L>(checker: &Checker<L>, runtime: &tokio::runtime::Handle, mut request: Request)
where
    L: SessionLauncher + Send + Sync + 'static,
{
    debug!("{} {}", request.method(), request.url());
    let response = match Url::parse(&format!("http://localhost{}", request.url())) {
        Ok(url) => route(checker, runtime, &mut request, &url),
        Err(e) => error_response(&Error::InputError(format!("bad request target: {}", e))),
    };
    if let Err(e) = request.respond(response) {
        warn!("Failed to send response: {}", e);
    }
}

fn route<L>(
    checker: &Checker<L>,
    runtime: &tokio::runtime::Handle,
    request: &mut Request,
    url: &Url,
) -> HttpResponse
where
    L: SessionLauncher + Send + Sync + 'static,
{
    let path = url.path();
    let artifact_prefix = format!("{}/", checker.config().public_prefix.trim_end_matches('/'));

    let method = request.method().clone();

    match (&method, path) {
        (Method::Post, "/upload") => upload(checker, runtime, request, url),
        (Method::Get, "/reports") => match checker.reports().list() {
            Ok(reports) => json_response(200, &json!(reports)),
            Err(e) => error_response(&e),
        },
        (Method::Get, p) if p.starts_with("/reports/") => {
            match checker.reports().get(&p["/reports/".len()..]) {
                Ok(report) => json_response(200, &json!(report)),
                Err(e) => error_response(&e),
            }
        }
        (Method::Get, p) if p.starts_with(&artifact_prefix) => {
            let name = &p[artifact_prefix.len()..];
            match checker.artifacts().resolve(name).and_then(|p| Ok(std::fs::read(p)?)) {
                Ok(bytes) => {
                    let mut resp = Response::from_data(bytes);
                    if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], &b"image/png"[..]) {
                        resp.add_header(h);
                    }
                    resp
                }
                Err(e) => error_response(&e),
            }
        }
        _ => error_response(&Error::NotFound(path.to_string())),
    }
}

fn upload<L>(
    checker: &Checker<L>,
    runtime: &tokio::runtime::Handle,
    request: &mut Request,
    url: &Url,
) -> HttpResponse
where
    L: SessionLauncher + Send + Sync + 'static,
{
    let limit = checker.config().max_upload_bytes;
    if request.body_length().is_some_and(|len| len > limit) {
        return json_response(413, &json!({ "error": format!("File too large (limit {} bytes)", limit) }));
    }

    let mut filename = None;
    let mut take_screenshots = false;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "filename" => filename = Some(value.into_owned()),
            "take_screenshots" => take_screenshots = value == "true",
            _ => {}
        }
    }
    let filename = filename.or_else(|| {
        request
            .headers()
            .iter()
            .find(|h| h.field.equiv("X-Filename"))
            .map(|h| h.value.as_str().to_string())
    });
    let Some(filename) = filename else {
        return error_response(&Error::InputError("No file uploaded".into()));
    };

    let mut body = Vec::new();
    if let Err(e) = request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut body)
    {
        return error_response(&Error::InputError(format!("Failed to read upload: {}", e)));
    }
    if body.len() > limit {
        return json_response(413, &json!({ "error": format!("File too large (limit {} bytes)", limit) }));
    }

    let upload = match checker.accept(&filename, body, take_screenshots) {
        Ok(upload) => upload,
        Err(e) => return error_response(&e),
    };

    match runtime.block_on(checker.check(upload)) {
        Ok(report) => json_response(
            200,
            &json!({
                "success": true,
                "report_id": report.run_id,
                "results": report,
            }),
        ),
        Err(e) => error_response(&e),
    }
}
