use std::collections::HashMap;

/// Decodes a URL-prefix tag into a `(host, path)` pair.
///
/// The tag must start with `prefix`; the remainder has `$NAME` references
/// substituted from `env`, then splits at the first `/`. An empty host means
/// "any host". Tags without the prefix, without a `/`, or with an unbound
/// variable are rejected.
pub fn parse_url_prefix_tag(
    tag: &str,
    prefix: &str,
    env: &HashMap<String, String>,
) -> Option<(String, String)> {
    let rest = tag.trim().strip_prefix(prefix)?;

    let mut expanded = String::with_capacity(rest.len());
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            expanded.push(c);
            continue;
        }
        let mut name = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                name.push(next);
                chars.next();
            } else {
                break;
            }
        }
        match env.get(&name) {
            Some(value) => expanded.push_str(value),
            None => return None,
        }
    }

    let slash = expanded.find('/')?;
    let (host, path) = expanded.split_at(slash);
    Some((host.trim().to_string(), path.trim().to_string()))
}
