use crate::config::Strategy;
use crate::errors::ProxyError;
use arc_swap::ArcSwap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use url::Url;

/// A resolved backend for one route.
#[derive(Clone, Debug)]
pub struct Target {
    pub service: String,
    pub url: Url,
    pub tags: Vec<String>,
}

/// One host/path prefix and the targets bound to it.
#[derive(Debug)]
struct Route {
    host: String,
    path: String,
    targets: Vec<Arc<Target>>,
    cursor: AtomicUsize,
}

impl Route {
    fn matches(&self, host: &str, path: &str) -> bool {
        (self.host.is_empty() || self.host == host) && path.starts_with(&self.path)
    }

    fn pick(&self, strategy: Strategy) -> Arc<Target> {
        let i = match strategy {
            Strategy::Rr => self.cursor.fetch_add(1, Ordering::Relaxed) % self.targets.len(),
            Strategy::Random => rand::thread_rng().gen_range(0..self.targets.len()),
        };
        self.targets[i].clone()
    }
}

/// An immutable routing table parsed from one routing document.
///
/// Routes are ordered longest path-prefix first; within the same prefix
/// length, the reverse lexicographic order of the raw route lines decides.
#[derive(Debug, Default)]
pub struct Table {
    routes: Vec<Route>,
}

impl Table {
    pub fn parse(doc: &str) -> Result<Table, ProxyError> {
        let mut lines = Vec::new();
        for line in doc.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            lines.push(parse_route_line(line)?);
        }

        lines.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then_with(|| b.raw.cmp(&a.raw)));

        let mut routes: Vec<Route> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        for line in lines {
            let target = Arc::new(Target {
                service: line.service,
                url: line.url,
                tags: line.tags,
            });
            match index.get(&(line.host.clone(), line.path.clone())) {
                Some(&i) => routes[i].targets.push(target),
                None => {
                    index.insert((line.host.clone(), line.path.clone()), routes.len());
                    routes.push(Route {
                        host: line.host,
                        path: line.path,
                        targets: vec![target],
                        cursor: AtomicUsize::new(0),
                    });
                }
            }
        }

        Ok(Table { routes })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns a target for the request host and path, or None when no
    /// route matches. An empty route host matches any request host.
    pub fn lookup(&self, host: &str, path: &str, strategy: Strategy) -> Option<Arc<Target>> {
        let req_host = host.split(':').next().unwrap_or("").to_ascii_lowercase();
        self.routes
            .iter()
            .find(|r| r.matches(&req_host, path))
            .map(|r| r.pick(strategy))
    }
}

struct RouteLine {
    service: String,
    host: String,
    path: String,
    url: Url,
    tags: Vec<String>,
    raw: String,
}

// Grammar:
//   route add <service> <host><path> <url> [tags "<csv>"]
fn parse_route_line(line: &str) -> Result<RouteLine, ProxyError> {
    let invalid = || ProxyError::InvalidRouteLine(line.to_string());

    let rest = line.strip_prefix("route add ").ok_or_else(invalid)?;
    let mut fields = rest.splitn(3, ' ');
    let service = fields.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let dst = fields.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let rest = fields.next().ok_or_else(invalid)?;

    let (target, tags_part) = match rest.split_once(' ') {
        Some((target, tags)) => (target, Some(tags)),
        None => (rest, None),
    };

    let url =
        Url::parse(target).map_err(|_| ProxyError::InvalidTargetUrl(target.to_string()))?;
    if !url.has_host() {
        return Err(ProxyError::InvalidTargetUrl(target.to_string()));
    }

    let slash = dst.find('/').ok_or_else(invalid)?;
    let (host, path) = dst.split_at(slash);

    let tags = match tags_part {
        Some(t) => parse_tags(t).ok_or_else(invalid)?,
        None => Vec::new(),
    };

    Ok(RouteLine {
        service: service.to_string(),
        host: host.to_ascii_lowercase(),
        path: path.to_string(),
        url,
        tags,
        raw: line.to_string(),
    })
}

// Undoes the quoting applied when the route line was formatted. The CSV is
// quoted with Rust's Debug string formatting, so the escapes to reverse are
// \" \\ \n \r \t \0 \' and \u{…}.
fn parse_tags(s: &str) -> Option<Vec<String>> {
    let inner = s
        .strip_prefix("tags ")?
        .strip_prefix('"')?
        .strip_suffix('"')?;

    let mut csv = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            csv.push(c);
            continue;
        }
        match chars.next()? {
            '"' => csv.push('"'),
            '\\' => csv.push('\\'),
            '\'' => csv.push('\''),
            'n' => csv.push('\n'),
            'r' => csv.push('\r'),
            't' => csv.push('\t'),
            '0' => csv.push('\0'),
            'u' => {
                if chars.next()? != '{' {
                    return None;
                }
                let mut hex = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        c if c.is_ascii_hexdigit() && hex.len() < 6 => hex.push(c),
                        _ => return None,
                    }
                }
                csv.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
            }
            _ => return None,
        }
    }

    if csv.is_empty() {
        return Some(Vec::new());
    }
    Some(csv.split(',').map(|t| t.to_string()).collect())
}

/// Holder of the current routing table.
///
/// Readers resolve against an atomic snapshot and never block the writer;
/// the watcher replaces the whole table, never mutates it in place.
#[derive(Default)]
pub struct RoutingTable {
    current: ArcSwap<Table>,
    document: ArcSwap<String>,
    loaded: AtomicBool,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `doc` and installs it as the current table. A parse failure
    /// on any line aborts the swap and the previous table stays live.
    pub fn replace(&self, doc: &str) -> Result<usize, ProxyError> {
        let table = Table::parse(doc)?;
        let routes = table.len();
        self.current.store(Arc::new(table));
        self.document.store(Arc::new(doc.to_string()));
        self.loaded.store(true, Ordering::Release);
        Ok(routes)
    }

    pub fn lookup(&self, host: &str, path: &str, strategy: Strategy) -> Option<Arc<Target>> {
        self.current.load().lookup(host, path, strategy)
    }

    /// The last routing document that was successfully applied.
    pub fn document(&self) -> Arc<String> {
        self.document.load_full()
    }

    /// True once a routing document has been applied.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}
