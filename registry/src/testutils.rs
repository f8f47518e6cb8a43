use bytes::Bytes;
use http_body_util::Full;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// In-process consul lookalike serving canned JSON per path.
pub struct ConsulStub {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

pub struct ConsulStubBuilder {
    routes: HashMap<String, String>,
    index: u64,
    fail_first: Option<(String, usize)>,
}

impl ConsulStub {
    pub fn builder() -> ConsulStubBuilder {
        ConsulStubBuilder {
            routes: HashMap::new(),
            index: 1,
            fail_first: None,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Origin-form URIs of every request served so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl ConsulStubBuilder {
    pub fn route(mut self, path: &str, json: &str) -> Self {
        self.routes.insert(path.to_string(), json.to_string());
        self
    }

    /// Index reported in the X-Consul-Index response header.
    pub fn index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    /// Answer the first `n` requests for `path` with a 500.
    pub fn fail_first(mut self, path: &str, n: usize) -> Self {
        self.fail_first = Some((path.to_string(), n));
        self
    }

    pub async fn spawn(self) -> ConsulStub {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub listener");
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(self.routes);
        let fail_first = Arc::new(self.fail_first);
        let failures = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let index = self.index;
        let seen = requests.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let routes = routes.clone();
                let fail_first = fail_first.clone();
                let failures = failures.clone();
                let seen = seen.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let svc = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let routes = routes.clone();
                        let fail_first = fail_first.clone();
                        let failures = failures.clone();
                        let seen = seen.clone();
                        async move {
                            seen.lock().unwrap().push(req.uri().to_string());

                            if let Some((path, n)) = fail_first.as_ref()
                                && req.uri().path() == path
                                && failures.fetch_add(1, Ordering::SeqCst) < *n
                            {
                                let res = Response::builder()
                                    .status(500)
                                    .body(Full::new(Bytes::new()))
                                    .unwrap();
                                return Ok::<_, Infallible>(res);
                            }

                            let res = match routes.get(req.uri().path()) {
                                Some(json) => Response::builder()
                                    .header("X-Consul-Index", index.to_string())
                                    .header("Content-Type", "application/json")
                                    .body(Full::new(Bytes::from(json.clone())))
                                    .unwrap(),
                                None => Response::builder()
                                    .status(404)
                                    .body(Full::new(Bytes::new()))
                                    .unwrap(),
                            };
                            Ok::<_, Infallible>(res)
                        }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, svc)
                        .await;
                });
            }
        });

        ConsulStub { addr, requests }
    }
}
