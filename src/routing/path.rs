//! Route pattern compiler, matcher and renderer.
//!
//! # Responsibilities
//! - Compile a `/`-delimited pattern into an ordered list of parts
//! - Match concrete request paths and capture parameter values
//! - Render concrete URLs from parameter values (reverse routing)
//!
//! # Pattern Syntax
//! ```text
//! /literal/segments        matched byte-for-byte
//! /:name  or  /:name.html  one segment, percent-decoded, suffix stripped
//! /$name<[0-9]+>           anchored regex against the raw remainder
//! /*name                   everything that is left, including `/`
//! trailing `/`             rendered URLs end in `/`
//! ```
//!
//! # Design Decisions
//! - Immutable once compiled; shared read-only across requests
//! - Unconsumed render values become a sorted query string
//! - Regex values are validated against the full value on render

use std::collections::{BTreeMap, BTreeSet, HashSet};

use regex::Regex;
use thiserror::Error;
use url::form_urlencoded;

/// Parameter values keyed by name. Ordered so rendered query strings are stable.
pub type Params = BTreeMap<String, String>;

/// Errors raised while compiling or rendering a path.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("path {pattern:?} corrupted")]
    Corrupted { pattern: String },

    #[error("path {pattern:?} has invalid regex: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("path {pattern:?} declares param {name} twice")]
    DuplicateParam { pattern: String, name: String },

    #[error("param {0} not found")]
    ParamNotFound(String),

    #[error("param {0} in wrong format")]
    WrongFormat(String),
}

/// Result of a successful [`Path::match_path`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub values: Params,
}

#[derive(Debug, Clone)]
enum Part {
    Fixed(String),
    Param { name: String, suffix: String },
    Regex { name: String, prefix: Regex, full: Regex },
    Wildcard(String),
}

impl Part {
    /// Match the part against the remaining path. Returns the captured
    /// `(key, value)` (key may be empty) and the number of bytes consumed.
    fn matches<'a>(&'a self, path: &str) -> Option<(&'a str, String, usize)> {
        match self {
            Part::Fixed(literal) => path
                .starts_with(literal.as_str())
                .then(|| ("", String::new(), literal.len())),
            Part::Param { name, suffix } => {
                let segment = path.split('/').next().unwrap_or_default();
                let raw = segment.strip_suffix(suffix.as_str())?;
                Some((name.as_str(), decode_segment(raw), segment.len()))
            }
            Part::Regex { name, prefix, .. } => {
                let found = prefix.find(path)?;
                Some((name.as_str(), found.as_str().to_string(), found.end()))
            }
            Part::Wildcard(name) => Some((name.as_str(), path.to_string(), path.len())),
        }
    }

    fn render(
        &self,
        values: &Params,
        normalize: &BTreeSet<String>,
    ) -> Result<(String, Option<&str>), PathError> {
        let lookup = |name: &str| {
            values.get(name).map(|value| {
                if normalize.contains(name) {
                    url_title(value)
                } else {
                    value.clone()
                }
            })
        };

        match self {
            Part::Fixed(literal) => Ok((literal.clone(), None)),
            Part::Param { name, suffix } => {
                let value = lookup(name).ok_or_else(|| PathError::ParamNotFound(name.clone()))?;
                Ok((escape_segment(&value) + suffix, Some(name.as_str())))
            }
            Part::Regex { name, full, .. } => {
                let value = lookup(name).ok_or_else(|| PathError::ParamNotFound(name.clone()))?;
                if !full.is_match(&value) {
                    return Err(PathError::WrongFormat(name.clone()));
                }
                Ok((value, Some(name.as_str())))
            }
            Part::Wildcard(name) => match lookup(name) {
                Some(value) => Ok((value, Some(name.as_str()))),
                None => Ok((String::new(), None)),
            },
        }
    }
}

/// A compiled, matchable and renderable route pattern.
#[derive(Debug, Clone)]
pub struct Path {
    pattern: String,
    parts: Vec<Part>,
    params: Vec<String>,
    trailing_slash: bool,
    normalize: BTreeSet<String>,
}

impl Path {
    /// Compile a pattern such as `/path/to/:something/$id<[0-9]+>/*foo`.
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        let corrupted = || PathError::Corrupted {
            pattern: pattern.to_string(),
        };

        let mut parts = Vec::new();
        let mut params: Vec<String> = Vec::new();
        let mut rest = pattern;

        while rest.len() > 1 {
            rest = rest.strip_prefix('/').ok_or_else(corrupted)?;

            let (part, leftover) = match rest.as_bytes()[0] {
                b':' => {
                    let (segment, leftover) = split_segment(&rest[1..]);
                    let (name, suffix) = match segment.split_once('.') {
                        Some((name, suffix)) => (name, format!(".{suffix}")),
                        None => (segment, String::new()),
                    };
                    (
                        Part::Param {
                            name: name.to_string(),
                            suffix,
                        },
                        leftover,
                    )
                }
                b'$' => {
                    let body = &rest[1..];
                    let open = body.find('<').ok_or_else(corrupted)?;
                    let close = body[open..].find('>').map(|i| i + open).ok_or_else(corrupted)?;
                    let expr = &body[open + 1..close];
                    if expr.is_empty() {
                        return Err(corrupted());
                    }
                    let compile = |anchored: String| {
                        Regex::new(&anchored).map_err(|source| PathError::Regex {
                            pattern: pattern.to_string(),
                            source,
                        })
                    };
                    (
                        Part::Regex {
                            name: body[..open].to_string(),
                            prefix: compile(format!("^(?:{expr})"))?,
                            full: compile(format!("^(?:{expr})$"))?,
                        },
                        &body[close + 1..],
                    )
                }
                b'*' => {
                    let (name, leftover) = split_segment(&rest[1..]);
                    (Part::Wildcard(name.to_string()), leftover)
                }
                _ => match rest.find([':', '*', '$']) {
                    None => {
                        let literal = rest.strip_suffix('/').unwrap_or(rest);
                        (Part::Fixed(literal.to_string()), "")
                    }
                    Some(pos) if rest.as_bytes()[pos - 1] == b'/' => {
                        (Part::Fixed(rest[..pos - 1].to_string()), &rest[pos - 1..])
                    }
                    Some(_) => return Err(corrupted()),
                },
            };

            let name = match &part {
                Part::Param { name, .. } | Part::Regex { name, .. } | Part::Wildcard(name) => {
                    name.as_str()
                }
                Part::Fixed(_) => "",
            };
            if !name.is_empty() {
                if params.iter().any(|p| p == name) {
                    return Err(PathError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                params.push(name.to_string());
            }

            parts.push(part);
            rest = leftover;
        }

        params.sort();

        Ok(Self {
            pattern: pattern.to_string(),
            parts,
            params,
            trailing_slash: pattern.ends_with('/'),
            normalize: BTreeSet::new(),
        })
    }

    /// The pattern this path was compiled from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names captured by this path, sorted lexically.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Flag parameters to be slugified with [`url_title`] on render.
    pub fn set_normalize<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.normalize.extend(names.into_iter().map(Into::into));
    }

    /// Match a concrete path against the pattern.
    ///
    /// Every part must be preceded by a `/`. Whatever is left after the last
    /// part must be empty, or a single `/` following a non-empty capture.
    pub fn match_path(&self, path: &str) -> Option<Match> {
        let mut values = Params::new();
        let mut rest = path;
        let mut last_consumed = 1;

        for part in &self.parts {
            rest = rest.strip_prefix('/')?;
            let (key, value, consumed) = part.matches(rest)?;
            if !key.is_empty() {
                values.insert(key.to_string(), value);
            }
            rest = &rest[consumed..];
            last_consumed = consumed;
        }

        match rest {
            "" => Some(Match { values }),
            "/" if last_consumed > 0 => Some(Match { values }),
            _ => None,
        }
    }

    /// Render a URL from `values`. Keys consumed by a part are added to `used`;
    /// everything else in `values` not already in `used` goes to the query string.
    pub fn render(&self, values: &Params, used: &mut HashSet<String>) -> Result<String, PathError> {
        let mut path = String::new();

        for part in &self.parts {
            let (rendered, key) = part.render(values, &self.normalize)?;
            path.push('/');
            path.push_str(&rendered);
            if let Some(key) = key {
                used.insert(key.to_string());
            }
        }

        if path.is_empty() {
            path.push('/');
        } else if self.trailing_slash && !path.ends_with('/') {
            path.push('/');
        }

        let mut query = form_urlencoded::Serializer::new(String::new());
        let mut has_query = false;
        for (key, value) in values.iter().filter(|(k, _)| !used.contains(k.as_str())) {
            query.append_pair(key, value);
            has_query = true;
        }

        if has_query {
            path.push('?');
            path.push_str(&query.finish());
        }
        Ok(path)
    }
}

fn split_segment(s: &str) -> (&str, &str) {
    match s.find('/') {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Escape a segment value: unreserved characters (`A-Za-z0-9-_.~`) stay,
/// space becomes `+`, everything else is percent-encoded.
fn escape_segment(value: &str) -> String {
    urlencoding::encode(value).replace("%20", "+")
}

fn decode_segment(raw: &str) -> String {
    urlencoding::decode(&raw.replace('+', " "))
        .map(|decoded| decoded.into_owned())
        .unwrap_or_default()
}

/// Slugify a value for use in a URL: lower-cased, `/`, `%` and whitespace
/// replaced by `-`, runs of `-` collapsed.
pub fn url_title(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        let c = if c == '/' || c == '%' || c.is_whitespace() { '-' } else { c };
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out
}
