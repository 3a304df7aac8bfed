//! Route tables and bound adapters.
//!
//! # Responsibilities
//! - Store rules (pattern, endpoint, defaults, methods)
//! - Keep rules ordered by specificity for matching
//! - Bind a table to a server name, script name and scheme
//! - Forward matching and reverse url building
//!
//! # Design Decisions
//! - One rule per endpoint; a second registration is an error
//! - Built once at startup, then shared read-only behind `Arc`
//! - Rules without declared methods accept every method

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;

use super::adapter::{BuildOptions, RouteMatch, UrlAdapter};
use super::error::RoutingError;
use super::pattern::RoutePattern;
use super::Values;

/// A single route entry.
#[derive(Debug, Clone)]
pub struct Rule {
    pattern: RoutePattern,
    endpoint: String,
    defaults: Values,
    methods: Option<Vec<Method>>,
}

impl Rule {
    pub fn new(pattern: RoutePattern, endpoint: impl Into<String>) -> Self {
        Self {
            pattern,
            endpoint: endpoint.into(),
            defaults: Values::new(),
            methods: None,
        }
    }

    pub fn with_defaults(mut self, defaults: Values) -> Self {
        self.defaults = defaults;
        self
    }

    /// Restrict the rule to these methods. `HEAD` is implied by `GET`.
    pub fn with_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        let mut methods: Vec<Method> = methods.into_iter().collect();
        if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        self.methods = Some(methods);
        self
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn defaults(&self) -> &Values {
        &self.defaults
    }

    /// Declared methods, `None` when the rule is method-agnostic.
    pub fn methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    fn allows(&self, method: &Method) -> bool {
        self.methods
            .as_ref()
            .map_or(true, |methods| methods.contains(method))
    }

    /// Whether this rule can build a url for the given values and method.
    fn suitable_for(&self, values: &Values, method: Option<&Method>) -> bool {
        if let Some(method) = method {
            if !self.allows(method) {
                return false;
            }
        }
        self.defaults
            .iter()
            .all(|(key, default)| values.get(key).map_or(true, |value| value == default))
    }
}

/// A table of rules keyed by endpoint.
#[derive(Debug, Default)]
pub struct RouteMap {
    rules: Vec<Arc<Rule>>,
    by_endpoint: HashMap<String, Arc<Rule>>,
}

impl RouteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, keeping the table ordered by specificity.
    pub fn add(&mut self, rule: Rule) -> Result<(), RoutingError> {
        if self.by_endpoint.contains_key(&rule.endpoint) {
            return Err(RoutingError::DuplicateEndpoint {
                endpoint: rule.endpoint,
            });
        }

        let rule = Arc::new(rule);
        let weights = rule.pattern.weights();
        let position = self
            .rules
            .iter()
            .position(|existing| existing.pattern.weights() > weights)
            .unwrap_or(self.rules.len());

        self.rules.insert(position, Arc::clone(&rule));
        self.by_endpoint.insert(rule.endpoint.clone(), rule);
        Ok(())
    }

    pub fn contains_endpoint(&self, endpoint: &str) -> bool {
        self.by_endpoint.contains_key(endpoint)
    }

    pub fn rule(&self, endpoint: &str) -> Option<&Rule> {
        self.by_endpoint.get(endpoint).map(Arc::as_ref)
    }

    /// Rules in matching order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Bind the table for matching and building.
    pub fn bind(
        self: &Arc<Self>,
        server_name: impl Into<String>,
        script_name: &str,
        url_scheme: impl Into<String>,
    ) -> MapAdapter {
        MapAdapter {
            map: Arc::clone(self),
            server_name: server_name.into(),
            script_name: script_name.trim_end_matches('/').to_string(),
            url_scheme: url_scheme.into(),
        }
    }

    fn match_path(&self, path: &str, method: Option<&Method>) -> Result<RouteMatch, RoutingError> {
        let mut allowed: Vec<Method> = Vec::new();

        for rule in &self.rules {
            let Some(captured) = rule.pattern.matches(path) else {
                continue;
            };
            match method {
                Some(method) if !rule.allows(method) => {
                    for allowed_method in rule.methods.iter().flatten() {
                        if !allowed.contains(allowed_method) {
                            allowed.push(allowed_method.clone());
                        }
                    }
                }
                _ => {
                    let mut values = rule.defaults.clone();
                    values.extend(captured);
                    return Ok(RouteMatch {
                        endpoint: rule.endpoint.clone(),
                        values,
                    });
                }
            }
        }

        match method {
            Some(method) if !allowed.is_empty() => Err(RoutingError::MethodNotAllowed {
                path: path.to_string(),
                method: method.clone(),
                allowed,
            }),
            _ => Err(RoutingError::NoMatch {
                path: path.to_string(),
            }),
        }
    }

    fn build_path(
        &self,
        endpoint: &str,
        values: &Values,
        method: Option<&Method>,
        append_unknown: bool,
    ) -> Result<String, RoutingError> {
        let rule = self
            .by_endpoint
            .get(endpoint)
            .filter(|rule| rule.suitable_for(values, method))
            .ok_or_else(|| RoutingError::no_route(endpoint))?;

        let mut path = rule
            .pattern
            .render(values, &rule.defaults)
            .ok_or_else(|| RoutingError::no_route(endpoint))?;

        if append_unknown {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            let mut appended = false;
            for (key, value) in values {
                if rule.pattern.has_argument(key) || rule.defaults.contains_key(key) {
                    continue;
                }
                for text in query_values(value) {
                    query.append_pair(key, &text);
                    appended = true;
                }
            }
            if appended {
                path.push('?');
                path.push_str(&query.finish());
            }
        }

        Ok(path)
    }
}

/// Flatten a value into query-string values; arrays repeat the key.
fn query_values(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(query_values).collect(),
        other => vec![other.to_string()],
    }
}

/// A route table bound to a request or to the configured server.
#[derive(Debug, Clone)]
pub struct MapAdapter {
    map: Arc<RouteMap>,
    server_name: String,
    script_name: String,
    url_scheme: String,
}

impl MapAdapter {
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    pub fn url_scheme(&self) -> &str {
        &self.url_scheme
    }

    pub fn map(&self) -> &RouteMap {
        &self.map
    }

    /// Strip the script name from an incoming path.
    fn path_info<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.script_name.is_empty() {
            return Some(path);
        }
        match path.strip_prefix(self.script_name.as_str())? {
            "" => Some("/"),
            rest if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

impl UrlAdapter for MapAdapter {
    fn match_path(&self, path: &str, method: Option<&Method>) -> Result<RouteMatch, RoutingError> {
        let path_info = self.path_info(path).ok_or_else(|| RoutingError::NoMatch {
            path: path.to_string(),
        })?;
        self.map.match_path(path_info, method)
    }

    fn build(
        &self,
        endpoint: &str,
        values: &Values,
        options: &BuildOptions,
    ) -> Result<String, RoutingError> {
        let path = self.map.build_path(
            endpoint,
            values,
            options.method.as_ref(),
            options.append_unknown,
        )?;
        let relative = format!("{}{}", self.script_name, path);

        if options.force_external {
            Ok(format!(
                "{}://{}{}",
                self.url_scheme, self.server_name, relative
            ))
        } else {
            Ok(relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(pattern: &str, endpoint: &str) -> Rule {
        Rule::new(RoutePattern::parse(pattern).unwrap(), endpoint)
    }

    fn bound(map: RouteMap) -> MapAdapter {
        Arc::new(map).bind("example.com", "/", "http")
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut map = RouteMap::new();
        map.add(rule("/chat", "chat")).unwrap();
        let err = map.add(rule("/chat2", "chat")).unwrap_err();
        assert_eq!(
            err,
            RoutingError::DuplicateEndpoint {
                endpoint: "chat".into()
            }
        );
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_static_rule_wins_over_variable() {
        let mut map = RouteMap::new();
        map.add(rule("/rooms/<id>", "room")).unwrap();
        map.add(rule("/rooms/new", "new_room")).unwrap();
        let adapter = bound(map);

        assert_eq!(adapter.match_path("/rooms/new", None).unwrap().endpoint, "new_room");
        assert_eq!(adapter.match_path("/rooms/7", None).unwrap().endpoint, "room");
    }

    #[test]
    fn test_match_merges_defaults() {
        let mut map = RouteMap::new();
        let defaults: Values = [("ws".to_string(), Value::Null)].into_iter().collect();
        map.add(rule("/rooms/<id>", "room").with_defaults(defaults))
            .unwrap();
        let matched = bound(map).match_path("/rooms/9", None).unwrap();

        assert_eq!(matched.values.get("id"), Some(&json!("9")));
        assert_eq!(matched.values.get("ws"), Some(&Value::Null));
    }

    #[test]
    fn test_method_not_allowed() {
        let mut map = RouteMap::new();
        map.add(rule("/submit", "submit").with_methods([Method::POST]))
            .unwrap();
        let adapter = bound(map);

        let err = adapter.match_path("/submit", Some(&Method::GET)).unwrap_err();
        match err {
            RoutingError::MethodNotAllowed { allowed, .. } => assert_eq!(allowed, vec![Method::POST]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(adapter.match_path("/submit", Some(&Method::POST)).is_ok());
        assert!(matches!(
            adapter.match_path("/nope", Some(&Method::GET)),
            Err(RoutingError::NoMatch { .. })
        ));
    }

    #[test]
    fn test_get_implies_head() {
        let rule = rule("/", "index").with_methods([Method::GET]);
        assert!(rule.allows(&Method::HEAD));
        assert!(!rule.allows(&Method::POST));
    }

    #[test]
    fn test_build_relative_and_external() {
        let mut map = RouteMap::new();
        map.add(rule("/rooms/<id>", "room")).unwrap();
        let adapter = bound(map);
        let values: Values = [("id".to_string(), json!("lobby"))].into_iter().collect();

        assert_eq!(
            adapter.build("room", &values, &BuildOptions::default()).unwrap(),
            "/rooms/lobby"
        );
        assert_eq!(
            adapter
                .build("room", &values, &BuildOptions::default().external())
                .unwrap(),
            "http://example.com/rooms/lobby"
        );
    }

    #[test]
    fn test_build_appends_unknown_values() {
        let mut map = RouteMap::new();
        map.add(rule("/chat", "chat")).unwrap();
        let adapter = bound(map);
        let values: Values = [
            ("page".to_string(), json!(2)),
            ("tag".to_string(), json!(["a", "b c"])),
            ("skip".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            adapter.build("chat", &values, &BuildOptions::default()).unwrap(),
            "/chat?page=2&tag=a&tag=b+c"
        );
        assert_eq!(
            adapter
                .build("chat", &values, &BuildOptions::default().append_unknown(false))
                .unwrap(),
            "/chat"
        );
    }

    #[test]
    fn test_build_rejects_conflicting_default() {
        let mut map = RouteMap::new();
        let defaults: Values = [("ws".to_string(), Value::Null)].into_iter().collect();
        map.add(rule("/chat", "chat").with_defaults(defaults)).unwrap();
        let adapter = bound(map);
        let values: Values = [("ws".to_string(), json!("yes"))].into_iter().collect();

        assert!(adapter
            .build("chat", &values, &BuildOptions::default())
            .unwrap_err()
            .is_no_route());
    }

    #[test]
    fn test_build_checks_method() {
        let mut map = RouteMap::new();
        map.add(rule("/submit", "submit").with_methods([Method::POST]))
            .unwrap();
        let adapter = bound(map);

        let get = BuildOptions::default().method(Method::GET);
        assert!(adapter.build("submit", &Values::new(), &get).is_err());
        let post = BuildOptions::default().method(Method::POST);
        assert_eq!(adapter.build("submit", &Values::new(), &post).unwrap(), "/submit");
    }

    #[test]
    fn test_script_name_prefix() {
        let mut map = RouteMap::new();
        map.add(rule("/chat", "chat")).unwrap();
        let adapter = Arc::new(map).bind("example.com", "/app/", "https");

        assert_eq!(adapter.match_path("/app/chat", None).unwrap().endpoint, "chat");
        assert!(adapter.match_path("/chat", None).is_err());
        assert!(adapter.match_path("/application/chat", None).is_err());
        assert_eq!(
            adapter
                .build("chat", &Values::new(), &BuildOptions::default().external())
                .unwrap(),
            "https://example.com/app/chat"
        );
    }
}
