//! Network prober: HTTP probes against worker endpoints.
//!
//! Connectivity is a timed GET on the worker's health path, tool
//! availability is a GET on `/tools/<name>` per tool, and tool tests POST
//! an empty JSON object to the same path. Security checks read the
//! hardening headers of the health response; dependency checks cover the
//! health endpoint plus a TCP connect to every declared dependency.
//! Resource usage comes from the host sampler. Error rates are derived
//! from this prober's own connectivity outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::Full;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

use fleetwatch_core::config::WorkerSpec;
use fleetwatch_core::{
    ChecklistItem, HostSampler, ProbeError, ProbeFuture, Prober, RequestCounts, ResourceUsage,
    ToolStatus,
};

const USER_AGENT: &str = "fleetwatch/0.1";

/// Headers a hardened health endpoint is expected to send.
const SECURITY_HEADERS: [(&str, &str); 2] = [
    ("x-content-type-options", "content type sniffing disabled"),
    ("x-frame-options", "framing restricted"),
];

/// Where and what to probe for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTarget {
    /// `host:port`.
    pub address: String,
    pub health_path: String,
    pub tools: Vec<String>,
    /// `host:port` of services the worker relies on.
    pub dependencies: Vec<String>,
}

impl From<&WorkerSpec> for HttpTarget {
    fn from(spec: &WorkerSpec) -> Self {
        Self {
            address: spec.address.clone(),
            health_path: spec.health_path.clone(),
            tools: spec.tools.clone(),
            dependencies: spec.dependencies.clone(),
        }
    }
}

pub struct HttpProber {
    targets: RwLock<HashMap<String, HttpTarget>>,
    /// Probe outcomes per worker, used as its request counts.
    tallies: Mutex<HashMap<String, RequestCounts>>,
    sampler: Arc<dyn HostSampler>,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration, sampler: Arc<dyn HostSampler>) -> Self {
        Self {
            targets: RwLock::new(HashMap::new()),
            tallies: Mutex::new(HashMap::new()),
            sampler,
            timeout,
        }
    }

    pub fn add_target(&self, worker: &str, target: HttpTarget) {
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker.to_string(), target);
    }

    /// Stop probing a worker and drop its tallies.
    pub fn remove_target(&self, worker: &str) -> bool {
        self.tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worker);
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worker)
            .is_some()
    }

    fn target(&self, worker: &str) -> Result<HttpTarget, ProbeError> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker)
            .cloned()
            .ok_or_else(|| ProbeError::Unreachable(format!("no address known for {worker}")))
    }

    fn tally(&self, worker: &str, ok: bool) {
        let mut tallies = self.tallies.lock().unwrap_or_else(PoisonError::into_inner);
        let counts = tallies.entry(worker.to_string()).or_default();
        counts.total += 1;
        if !ok {
            counts.failed += 1;
        }
    }
}

impl Prober for HttpProber {
    fn connectivity<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Duration> {
        Box::pin(async move {
            let target = self.target(worker)?;
            let started = Instant::now();
            let outcome = http_get(&target.address, &target.health_path, self.timeout).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok(status) if status.is_success() => {
                    self.tally(worker, true);
                    Ok(elapsed)
                }
                Ok(status) => {
                    self.tally(worker, false);
                    Err(ProbeError::Http(format!(
                        "{} returned {status}",
                        target.health_path
                    )))
                }
                Err(e) => {
                    self.tally(worker, false);
                    Err(e)
                }
            }
        })
    }

    fn resources<'a>(&'a self, _worker: &'a str) -> ProbeFuture<'a, ResourceUsage> {
        let sampler = self.sampler.clone();
        Box::pin(async move {
            let sample = tokio::task::spawn_blocking(move || sampler.sample())
                .await
                .map_err(|e| ProbeError::Sampler(e.to_string()))??;
            Ok(ResourceUsage {
                memory: sample.memory_usage,
                cpu: sample.cpu_usage,
            })
        })
    }

    fn request_counts<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, RequestCounts> {
        let counts = self
            .tallies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker)
            .copied()
            .unwrap_or_default();
        Box::pin(async move { Ok(counts) })
    }

    fn tools<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ToolStatus>> {
        Box::pin(async move {
            let target = self.target(worker)?;
            let mut statuses = Vec::with_capacity(target.tools.len());
            for tool in &target.tools {
                let path = format!("/tools/{tool}");
                let available = matches!(
                    http_get(&target.address, &path, self.timeout).await,
                    Ok(status) if status.is_success()
                );
                statuses.push(ToolStatus {
                    name: tool.clone(),
                    available,
                });
            }
            Ok(statuses)
        })
    }

    fn tool_tests<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async move {
            let target = self.target(worker)?;
            let mut items = Vec::with_capacity(target.tools.len());
            for tool in &target.tools {
                let path = format!("/tools/{tool}");
                let item = match request(&target.address, Method::POST, &path, self.timeout).await
                {
                    Ok(parts) => ChecklistItem::new(
                        tool.as_str(),
                        parts.status.is_success(),
                        format!("POST {path} returned {}", parts.status),
                    ),
                    Err(e) => ChecklistItem::new(tool.as_str(), false, e.to_string()),
                };
                items.push(item);
            }
            Ok(items)
        })
    }

    fn configuration<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        let result = self
            .target(worker)
            .map(|target| configuration_items(&target, self.timeout));
        Box::pin(async move { result })
    }

    fn security<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async move {
            let target = self.target(worker)?;
            let parts =
                request(&target.address, Method::GET, &target.health_path, self.timeout).await?;
            Ok(security_items(&parts.headers))
        })
    }

    fn dependencies<'a>(&'a self, worker: &'a str) -> ProbeFuture<'a, Vec<ChecklistItem>> {
        Box::pin(async move {
            let target = self.target(worker)?;
            let mut items = Vec::with_capacity(target.dependencies.len() + 1);

            items.push(
                match http_get(&target.address, &target.health_path, self.timeout).await {
                    Ok(status) => ChecklistItem::new(
                        "health_endpoint",
                        status.is_success(),
                        format!("{} returned {status}", target.health_path),
                    ),
                    Err(e) => ChecklistItem::new("health_endpoint", false, e.to_string()),
                },
            );

            for dependency in &target.dependencies {
                let connect = TcpStream::connect(dependency.as_str());
                let item = match tokio::time::timeout(self.timeout, connect).await {
                    Ok(Ok(_)) => ChecklistItem::new(dependency.as_str(), true, "reachable"),
                    Ok(Err(e)) => ChecklistItem::new(dependency.as_str(), false, e.to_string()),
                    Err(_) => ChecklistItem::new(
                        dependency.as_str(),
                        false,
                        ProbeError::Timeout(self.timeout).to_string(),
                    ),
                };
                items.push(item);
            }
            Ok(items)
        })
    }
}

/// Static validation of a probe target.
fn configuration_items(target: &HttpTarget, timeout: Duration) -> Vec<ChecklistItem> {
    let address_ok = target
        .address
        .rsplit_once(':')
        .is_some_and(|(host, port)| {
            !host.is_empty() && port.parse::<u16>().is_ok_and(|port| port != 0)
        });
    let path_ok = target.health_path.starts_with('/');
    let tools_ok = !target.tools.is_empty();
    let timeout_ok = !timeout.is_zero();

    vec![
        ChecklistItem::new(
            "address",
            address_ok,
            if address_ok {
                format!("{} is host:port", target.address)
            } else {
                format!("{:?} is not host:port", target.address)
            },
        ),
        ChecklistItem::new(
            "health_path",
            path_ok,
            if path_ok {
                format!("{} is absolute", target.health_path)
            } else {
                format!("{:?} must start with /", target.health_path)
            },
        ),
        ChecklistItem::new(
            "tools",
            tools_ok,
            format!("{} tools declared", target.tools.len()),
        ),
        ChecklistItem::new("probe_timeout", timeout_ok, format!("probe timeout {timeout:?}")),
    ]
}

fn security_items(headers: &HeaderMap) -> Vec<ChecklistItem> {
    let mut items: Vec<ChecklistItem> = SECURITY_HEADERS
        .iter()
        .map(|(name, purpose)| {
            let present = headers.contains_key(*name);
            let message = if present {
                purpose.to_string()
            } else {
                format!("{name} header missing")
            };
            ChecklistItem::new(*name, present, message)
        })
        .collect();

    // A `server` header carrying a version (`name/1.2`) discloses the stack.
    let banner = headers
        .get(http::header::SERVER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.contains('/'));
    items.push(ChecklistItem::new(
        "server_banner",
        banner.is_none(),
        match banner {
            Some(value) => format!("server version disclosed: {value}"),
            None => "server version not disclosed".to_string(),
        },
    ));
    items
}

/// Issue a GET and return the response status.
///
/// Connection failures and timeouts are errors; any HTTP response,
/// including non-2xx, is `Ok`.
pub async fn http_get(
    address: &str,
    path: &str,
    timeout: Duration,
) -> Result<StatusCode, ProbeError> {
    request(address, Method::GET, path, timeout)
        .await
        .map(|parts| parts.status)
}

/// Send one request and return the response head. POSTs carry `{}`.
async fn request(
    address: &str,
    method: Method,
    path: &str,
    timeout: Duration,
) -> Result<http::response::Parts, ProbeError> {
    let uri = format!("http://{address}{path}");
    let body = if method == Method::POST {
        Bytes::from_static(b"{}")
    } else {
        Bytes::new()
    };

    let exchange = async {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| ProbeError::Unreachable(format!("{address}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ProbeError::Http(format!("handshake with {address} failed: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let mut builder = http::Request::builder()
            .method(method)
            .uri(&uri)
            .header("host", address)
            .header("user-agent", USER_AGENT);
        if !body.is_empty() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(Full::new(body))
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ProbeError::Http(format!("request to {uri} failed: {e}")))?;
        let (parts, _body) = resp.into_parts();
        Ok::<_, ProbeError>(parts)
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => {
            if let Err(e) = &result {
                debug!(%uri, error = %e, "probe failed");
            }
            result
        }
        Err(_) => {
            debug!(%uri, "probe timed out");
            Err(ProbeError::Timeout(timeout))
        }
    }
}
