//! Route-to-permission table.
//!
//! Keys come from configuration as either `"METHOD /path"` or a bare
//! `"/path"`, where path segments starting with `:` match any single
//! non-empty segment. Lookups try, in order:
//!
//! 1. literal path with matching method,
//! 2. literal bare path,
//! 3. templated paths with matching method,
//! 4. templated bare paths.
//!
//! Within each templated tier, patterns with fewer parameters win, then the
//! key that sorts first. A path nothing matches is public.

use std::collections::{BTreeMap, HashMap};

use crate::{HostError, Result};

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct Pattern {
    key: String,
    method: Option<String>,
    segments: Vec<Segment>,
    params: usize,
    required: Vec<String>,
}

impl Pattern {
    fn matches(&self, segments: &[&str]) -> bool {
        self.segments.len() == segments.len()
            && self.segments.iter().zip(segments).all(|(p, s)| match p {
                Segment::Literal(lit) => lit == s,
                Segment::Param => !s.is_empty(),
            })
    }
}

/// Which configured entry a lookup resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    /// Configuration key of the matched entry, `None` if nothing matched.
    pub key: Option<&'a str>,
    /// Required permissions, AND-combined, in configured order.
    pub required: &'a [String],
}

impl RouteMatch<'_> {
    /// No permission required.
    pub fn is_public(&self) -> bool {
        self.required.is_empty()
    }
}

/// Compiled route-to-permission map.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    literal: HashMap<(Option<String>, String), (String, Vec<String>)>,
    templated: Vec<Pattern>,
}

/// Split a configuration key into optional method and path.
fn parse_key(key: &str) -> Result<(Option<String>, String)> {
    let mut parts = key.split_whitespace();
    let (method, path) = match (parts.next(), parts.next(), parts.next()) {
        (Some(path), None, None) => (None, path),
        (Some(method), Some(path), None) => {
            let method = method.to_ascii_uppercase();
            if !METHODS.contains(&method.as_str()) {
                return Err(HostError::Config(format!(
                    "route '{key}': unknown method '{method}'"
                )));
            }
            (Some(method), path)
        }
        _ => {
            return Err(HostError::Config(format!(
                "route '{key}': expected \"METHOD /path\" or \"/path\""
            )))
        }
    };

    if !path.starts_with('/') {
        return Err(HostError::Config(format!(
            "route '{key}': path must start with '/'"
        )));
    }
    Ok((method, normalize_path(path)))
}

/// Drop any query string and trailing slash.
fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('/').split('/').collect()
}

impl RouteTable {
    /// Compile a table from `route key -> permission names`.
    pub fn from_map(routes: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut table = Self::default();

        for (key, required) in routes {
            let (method, path) = parse_key(key)?;
            let segments: Vec<Segment> = split_segments(&path)
                .into_iter()
                .map(|s| match s.strip_prefix(':') {
                    Some(name) if !name.is_empty() => Ok(Segment::Param),
                    Some(_) => Err(HostError::Config(format!(
                        "route '{key}': empty parameter name"
                    ))),
                    None => Ok(Segment::Literal(s.to_string())),
                })
                .collect::<Result<_>>()?;

            let params = segments.iter().filter(|s| **s == Segment::Param).count();
            if params == 0 {
                let slot = (method, path);
                if table.literal.contains_key(&slot) {
                    return Err(HostError::Config(format!("route '{key}' is duplicated")));
                }
                table.literal.insert(slot, (key.clone(), required.clone()));
            } else {
                table.templated.push(Pattern {
                    key: key.clone(),
                    method,
                    segments,
                    params,
                    required: required.clone(),
                });
            }
        }

        table.templated.sort_by(|a, b| {
            b.method
                .is_some()
                .cmp(&a.method.is_some())
                .then(a.params.cmp(&b.params))
                .then_with(|| a.key.cmp(&b.key))
        });

        Ok(table)
    }

    /// Find the entry governing `method path`.
    pub fn lookup(&self, method: &str, path: &str) -> RouteMatch<'_> {
        let method = method.to_ascii_uppercase();
        let path = normalize_path(path);

        let exact = self
            .literal
            .get(&(Some(method.clone()), path.clone()))
            .or_else(|| self.literal.get(&(None, path.clone())));
        if let Some((key, required)) = exact {
            return RouteMatch {
                key: Some(key),
                required,
            };
        }

        let segments = split_segments(&path);
        self.templated
            .iter()
            .filter(|p| p.method.as_deref().map_or(true, |m| m == method))
            .find(|p| p.matches(&segments))
            .map(|p| RouteMatch {
                key: Some(&p.key),
                required: &p.required,
            })
            .unwrap_or(RouteMatch {
                key: None,
                required: &[],
            })
    }

    /// Permissions required for `method path` (empty if public).
    pub fn required(&self, method: &str, path: &str) -> &[String] {
        self.lookup(method, path).required
    }

    /// Number of configured entries.
    pub fn len(&self) -> usize {
        self.literal.len() + self.templated.len()
    }

    /// Whether no entries are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
