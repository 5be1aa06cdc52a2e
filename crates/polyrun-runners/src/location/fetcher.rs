//! Reachability probes and downloads for the network runner.

use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;

use once_cell::sync::OnceCell;
use polyrun_config::NetworkConfig;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use tracing::debug;

use crate::error::RunnerError;

/// The "is URL reachable" and "download URL to file" facilities.
pub trait UrlFetcher: Send + Sync {
    /// Lightweight probe; any failure counts as unreachable.
    fn is_reachable(&self, url: &str) -> bool;

    /// Download `url` into `dest`, returning the number of bytes written.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, RunnerError>;
}

/// [`UrlFetcher`] over a blocking reqwest client.
///
/// The client is built on first use, so constructing a registry never opens
/// sockets or loads TLS roots.
pub struct HttpFetcher {
    probe_timeout: Duration,
    download_timeout: Duration,
    use_proxy: bool,
    client: OnceCell<Client>,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            download_timeout: config.download_timeout(),
            use_proxy: config.use_proxy(),
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&Client, reqwest::Error> {
        self.client.get_or_try_init(|| {
            let mut builder = Client::builder()
                .connect_timeout(self.probe_timeout)
                .use_rustls_tls();
            if !self.use_proxy {
                builder = builder.no_proxy();
            }
            builder.build()
        })
    }

    fn request_status(&self, request: RequestBuilder, url: &str, method: &str) -> Option<StatusCode> {
        match request.timeout(self.probe_timeout).send() {
            Ok(response) => {
                let status = response.status();
                debug!(url = %url, method = method, status = %status, "Checked remote script");
                Some(status)
            }
            Err(e) => {
                debug!(url = %url, method = method, error = %e, "Remote script check failed");
                None
            }
        }
    }
}

/// Servers that refuse `HEAD` itself get asked again with `GET`.
fn needs_get_fallback(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED
    )
}

impl UrlFetcher for HttpFetcher {
    fn is_reachable(&self, url: &str) -> bool {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                debug!(error = %e, "HTTP client unavailable");
                return false;
            }
        };
        let Some(status) = self.request_status(client.head(url), url, "HEAD") else {
            return false;
        };
        if needs_get_fallback(status) {
            return self
                .request_status(client.get(url), url, "GET")
                .is_some_and(|status| status.is_success());
        }
        status.is_success()
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, RunnerError> {
        let network = |reason: String| RunnerError::Network {
            url: url.to_string(),
            reason,
        };
        let client = self.client().map_err(|e| network(e.to_string()))?;
        let mut response = client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| network(e.to_string()))?;
        let mut file = File::create(dest).map_err(|e| RunnerError::io(dest, e))?;
        let written = io::copy(&mut response, &mut file).map_err(|e| RunnerError::io(dest, e))?;
        debug!(url = %url, bytes = written, dest = %dest.display(), "Downloaded remote script");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Minimal HTTP/1.1 server: `/any` answers every method, `/get-only`
    /// refuses HEAD with 405, everything else is 404.
    fn serve() -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                answer(stream, &log);
            }
        });
        (base, seen)
    }

    fn answer(mut stream: TcpStream, log: &Mutex<Vec<String>>) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut header = String::new();
        while reader.read_line(&mut header).unwrap() > 2 {
            header.clear();
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();
        let status = match (method.as_str(), path.as_str()) {
            (_, "/any") | ("GET", "/get-only") => "200 OK",
            ("HEAD", "/get-only") => "405 Method Not Allowed",
            _ => "404 Not Found",
        };
        log.lock().unwrap().push(format!("{method} {path}"));
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&NetworkConfig {
            use_proxy: Some(false),
            ..NetworkConfig::default()
        })
    }

    #[test]
    fn test_get_fallback_only_when_head_is_refused() {
        let (base, seen) = serve();
        let fetcher = fetcher();

        assert!(fetcher.is_reachable(&format!("{base}/any")));
        assert!(fetcher.is_reachable(&format!("{base}/get-only")));
        assert!(!fetcher.is_reachable(&format!("{base}/missing")));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["HEAD /any", "HEAD /get-only", "GET /get-only", "HEAD /missing"]
        );
    }

    #[test]
    fn test_fallback_statuses() {
        assert!(needs_get_fallback(StatusCode::METHOD_NOT_ALLOWED));
        assert!(needs_get_fallback(StatusCode::NOT_IMPLEMENTED));
        assert!(!needs_get_fallback(StatusCode::NOT_FOUND));
        assert!(!needs_get_fallback(StatusCode::OK));
    }
}
