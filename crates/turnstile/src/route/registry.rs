//! Protected route registration and lookup
//!
//! Routes are registered on a mutable [`RouteRegistry`] during startup and
//! then sealed into an immutable [`ProtectedRoutes`] that is shared by every
//! request. Sealing consumes the registry, so nothing can be registered once
//! matching has started.

use std::collections::HashSet;

use tracing::debug;

use super::pattern::RoutePattern;

/// Mutable set of protected route patterns
///
/// Registering the same pattern twice has no effect. With trailing-slash
/// compensation enabled (the default), registering `/a/b` also registers
/// `/a/b/` and vice versa, with the same method restriction.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    patterns: HashSet<RoutePattern>,
    trailing_slash_compensation: bool,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self {
            patterns: HashSet::new(),
            trailing_slash_compensation: true,
        }
    }
}

impl RouteRegistry {
    /// Create an empty registry with trailing-slash compensation enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable trailing-slash compensation
    ///
    /// Applies to routes registered afterwards.
    pub fn trailing_slash_compensation(&mut self, enabled: bool) -> &mut Self {
        self.trailing_slash_compensation = enabled;
        self
    }

    /// Protect `template` for every method
    pub fn register_route(&mut self, template: impl Into<String>) -> &mut Self {
        self.insert(RoutePattern::new(template));
        self
    }

    /// Protect `template` for the given methods only
    pub fn register_route_with_methods<I, M>(
        &mut self,
        template: impl Into<String>,
        methods: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        self.insert(RoutePattern::with_methods(template, methods));
        self
    }

    /// Protect each template for every method
    pub fn register_routes<I, T>(&mut self, templates: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        for template in templates {
            self.register_route(template);
        }
        self
    }

    /// Protect each `(template, method)` pair
    pub fn register_routes_with_methods<I, T, M>(&mut self, routes: I) -> &mut Self
    where
        I: IntoIterator<Item = (T, M)>,
        T: Into<String>,
        M: AsRef<str>,
    {
        for (template, method) in routes {
            self.register_route_with_methods(template, [method]);
        }
        self
    }

    /// Number of registered patterns, compensating patterns included
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether this exact pattern is registered
    pub fn contains(&self, pattern: &RoutePattern) -> bool {
        self.patterns.contains(pattern)
    }

    /// Freeze the registry for matching
    pub fn seal(self) -> ProtectedRoutes {
        let mut patterns: Vec<RoutePattern> = self.patterns.into_iter().collect();
        patterns.sort_by(|a, b| a.template().cmp(b.template()));
        debug!(pattern_count = patterns.len(), "Protected routes sealed");
        ProtectedRoutes { patterns }
    }

    fn insert(&mut self, pattern: RoutePattern) {
        if self.trailing_slash_compensation
            && let Some(counterpart) = pattern.trailing_slash_counterpart()
        {
            self.patterns.insert(counterpart);
        }
        self.patterns.insert(pattern);
    }
}

/// Immutable, shareable set of protected route patterns
#[derive(Debug, Clone, Default)]
pub struct ProtectedRoutes {
    patterns: Vec<RoutePattern>,
}

impl ProtectedRoutes {
    /// Whether the request needs authorization
    ///
    /// True when any registered pattern matches both the path and the
    /// method.
    pub fn matches(&self, path: &str, method: &str) -> bool {
        self.matching_pattern(path, method).is_some()
    }

    /// The first pattern, in template order, that matches the request
    pub fn matching_pattern(&self, path: &str, method: &str) -> Option<&RoutePattern> {
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(path, method))
    }

    /// All patterns, sorted by template
    pub fn patterns(&self) -> &[RoutePattern] {
        &self.patterns
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no route is protected
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
