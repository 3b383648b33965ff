//! Ant-style path patterns
//!
//! Templates and request paths are split on `/` and empty segments are
//! dropped, so `/api//orders` and `/api/orders` name the same route. Within a
//! segment `?` matches one character and `*` matches any run of characters;
//! a segment that is exactly `**` matches any number of whole segments,
//! including none.
//!
//! `{name}` matches like `*`, and `{name:regex}` matches when the regular
//! expression accepts the characters it covers. Variable values are not
//! captured.
//!
//! A trailing slash is significant: `/users` and `/users/` are different
//! patterns, unless the template ends in `**`.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobToken {
    Char(char),
    AnyChar,
    AnyRun,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Glob(Vec<GlobToken>),
    Variable(Regex),
    AnyPath,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw == "**" {
            return Segment::AnyPath;
        }
        if raw.contains('{') {
            return Self::parse_variables(raw);
        }
        if !raw.contains(['*', '?']) {
            return Segment::Literal(raw.to_string());
        }

        let mut tokens = Vec::with_capacity(raw.len());
        for ch in raw.chars() {
            let token = match ch {
                '*' => GlobToken::AnyRun,
                '?' => GlobToken::AnyChar,
                other => GlobToken::Char(other),
            };
            // Adjacent stars match the same strings as one
            if token == GlobToken::AnyRun && tokens.last() == Some(&GlobToken::AnyRun) {
                continue;
            }
            tokens.push(token);
        }
        Segment::Glob(tokens)
    }

    fn parse_variables(raw: &str) -> Self {
        let (constrained, unconstrained) = variable_expressions(raw);
        match Regex::new(&constrained) {
            Ok(regex) => Segment::Variable(regex),
            Err(e) => {
                // Matching more than intended keeps the route protected
                warn!(
                    segment = raw,
                    error = %e,
                    "Invalid path variable constraint, matching any value"
                );
                Regex::new(&unconstrained)
                    .map(Segment::Variable)
                    .unwrap_or_else(|_| Segment::Glob(vec![GlobToken::AnyRun]))
            }
        }
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == segment,
            Segment::Glob(tokens) => glob_matches(tokens, segment),
            Segment::Variable(regex) => regex.is_match(segment),
            Segment::AnyPath => true,
        }
    }
}

fn push_literal(expression: &mut String, ch: char) {
    expression.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4])));
}

/// Anchored expressions for a segment holding `{...}` variables
///
/// The first honours `{name:regex}` constraints, the second treats every
/// variable as unconstrained. An unclosed `{` is literal text.
fn variable_expressions(raw: &str) -> (String, String) {
    let mut constrained = String::from("^");
    let mut unconstrained = String::from("^");
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                let mut body = String::new();
                let mut depth = 1;
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                closed = true;
                                break;
                            }
                        }
                        _ => {}
                    }
                    body.push(inner);
                }

                if !closed {
                    for literal in std::iter::once('{').chain(body.chars()) {
                        push_literal(&mut constrained, literal);
                        push_literal(&mut unconstrained, literal);
                    }
                    continue;
                }

                unconstrained.push_str(".*");
                match body.split_once(':') {
                    Some((_, constraint)) => {
                        constrained.push_str("(?:");
                        constrained.push_str(constraint);
                        constrained.push(')');
                    }
                    None => constrained.push_str(".*"),
                }
            }
            '*' => {
                constrained.push_str(".*");
                unconstrained.push_str(".*");
            }
            '?' => {
                constrained.push('.');
                unconstrained.push('.');
            }
            other => {
                push_literal(&mut constrained, other);
                push_literal(&mut unconstrained, other);
            }
        }
    }

    constrained.push('$');
    unconstrained.push('$');
    (constrained, unconstrained)
}

/// Single-segment wildcard match with star backtracking
fn glob_matches(tokens: &[GlobToken], text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let (mut t, mut c) = (0, 0);
    // Position of the last star and the text index it currently absorbs up to
    let mut star: Option<(usize, usize)> = None;

    while c < chars.len() {
        match tokens.get(t) {
            Some(GlobToken::AnyRun) => {
                star = Some((t, c));
                t += 1;
                continue;
            }
            Some(GlobToken::AnyChar) => {
                t += 1;
                c += 1;
                continue;
            }
            Some(GlobToken::Char(expected)) if *expected == chars[c] => {
                t += 1;
                c += 1;
                continue;
            }
            _ => {}
        }

        match star {
            Some((star_t, star_c)) => {
                t = star_t + 1;
                c = star_c + 1;
                star = Some((star_t, star_c + 1));
            }
            None => return false,
        }
    }

    tokens[t..].iter().all(|token| *token == GlobToken::AnyRun)
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyPath, rest)) => {
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((segment, rest)) => match path.split_first() {
            Some((head, tail)) => segment.matches(head) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// Non-empty `/`-separated segments
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// A path pattern, optionally restricted to a set of HTTP methods
///
/// Two patterns are equal when their template text and method sets are
/// equal. Methods are compared case-insensitively.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    template: String,
    methods: Option<BTreeSet<String>>,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl RoutePattern {
    /// A pattern matching every method
    pub fn new(template: impl Into<String>) -> Self {
        Self::compile(template.into(), None)
    }

    /// A pattern matching only the given methods
    ///
    /// An empty method list places no restriction, the same as
    /// [`RoutePattern::new`].
    pub fn with_methods<I, M>(template: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let methods: BTreeSet<String> = methods
            .into_iter()
            .map(|method| method.as_ref().to_ascii_uppercase())
            .collect();
        Self::compile(template.into(), (!methods.is_empty()).then_some(methods))
    }

    fn compile(template: String, methods: Option<BTreeSet<String>>) -> Self {
        let mut segments: Vec<Segment> = Vec::new();
        for raw in split_segments(&template) {
            let segment = Segment::parse(raw);
            // `**/**` matches the same paths as `**`
            if matches!(segment, Segment::AnyPath)
                && matches!(segments.last(), Some(Segment::AnyPath))
            {
                continue;
            }
            segments.push(segment);
        }

        Self {
            trailing_slash: template.ends_with('/'),
            template,
            methods,
            segments,
        }
    }

    /// The template text
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Upper-cased methods, or `None` when all methods match
    pub fn methods(&self) -> Option<&BTreeSet<String>> {
        self.methods.as_ref()
    }

    /// Whether `path` and `method` match this pattern
    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.matches_method(method) && self.matches_path(path)
    }

    /// Whether `path` matches, ignoring methods
    pub fn matches_path(&self, path: &str) -> bool {
        let segments: Vec<&str> = split_segments(path).collect();
        if !match_segments(&self.segments, &segments) {
            return false;
        }
        matches!(self.segments.last(), Some(Segment::AnyPath))
            || self.trailing_slash == path.ends_with('/')
    }

    fn matches_method(&self, method: &str) -> bool {
        self.methods.as_ref().is_none_or(|methods| {
            methods
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(method))
        })
    }

    /// The same pattern with its trailing slash toggled
    ///
    /// Every trailing slash is stripped when present. Returns `None` for the
    /// root pattern `/` and for the empty pattern, which have no meaningful
    /// counterpart.
    pub fn trailing_slash_counterpart(&self) -> Option<Self> {
        let toggled = if self.trailing_slash {
            let stripped = self.template.trim_end_matches('/');
            if stripped.is_empty() {
                return None;
            }
            stripped.to_string()
        } else if self.template.is_empty() {
            return None;
        } else {
            format!("{}/", self.template)
        };
        Some(Self::compile(toggled, self.methods.clone()))
    }
}

impl PartialEq for RoutePattern {
    fn eq(&self, other: &Self) -> bool {
        self.template == other.template && self.methods == other.methods
    }
}

impl Eq for RoutePattern {}

impl Hash for RoutePattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.template.hash(state);
        self.methods.hash(state);
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.methods {
            Some(methods) => {
                let methods: Vec<&str> = methods.iter().map(String::as_str).collect();
                write!(f, "{} {}", methods.join("|"), self.template)
            }
            None => f.write_str(&self.template),
        }
    }
}
