use std::sync::Arc;

use gateway_contracts::{RouteDefinition, RouteSummary};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("route not found: {method} {path}")]
pub struct RouteNotFound {
    pub path: String,
    pub method: String,
}

// First match wins in declaration order, not longest prefix.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Arc<[RouteDefinition]>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDefinition>) -> Self {
        Self {
            routes: routes.into(),
        }
    }

    pub fn find(&self, path: &str, method: &str) -> Result<&RouteDefinition, RouteNotFound> {
        self.routes
            .iter()
            .find(|route| {
                path.starts_with(route.path.as_str())
                    && route.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
            })
            .ok_or_else(|| RouteNotFound {
                path: path.to_string(),
                method: method.to_string(),
            })
    }

    pub fn routes(&self) -> &[RouteDefinition] {
        &self.routes
    }

    pub fn paths(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.path.clone()).collect()
    }

    pub fn summaries(&self) -> Vec<RouteSummary> {
        self.routes.iter().map(RouteSummary::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str, methods: &[&str], target: &str) -> RouteDefinition {
        RouteDefinition {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            require_auth: false,
            rate_limit: None,
            target: target.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn first_declared_prefix_wins_over_longer_prefix() {
        let table = RouteTable::new(vec![
            route("/ai", &["POST"], "ai-general"),
            route("/ai/task-analyzer", &["POST"], "task-analyzer"),
        ]);
        let hit = table.find("/ai/task-analyzer", "POST").unwrap();
        assert_eq!(hit.target, "ai-general");
    }

    #[test]
    fn declaration_order_flip_changes_resolution() {
        let table = RouteTable::new(vec![
            route("/ai/task-analyzer", &["POST"], "task-analyzer"),
            route("/ai", &["POST"], "ai-general"),
        ]);
        assert_eq!(
            table.find("/ai/task-analyzer", "POST").unwrap().target,
            "task-analyzer"
        );
        assert_eq!(table.find("/ai/other", "POST").unwrap().target, "ai-general");
    }

    #[test]
    fn method_mismatch_falls_through_to_later_routes() {
        let table = RouteTable::new(vec![
            route("/clients", &["GET"], "clients-read"),
            route("/clients", &["POST", "PUT"], "clients-write"),
        ]);
        assert_eq!(table.find("/clients", "GET").unwrap().target, "clients-read");
        assert_eq!(table.find("/clients/7", "PUT").unwrap().target, "clients-write");
        let err = table.find("/clients", "DELETE").unwrap_err();
        assert_eq!(err.method, "DELETE");
    }

    #[test]
    fn prefix_is_literal_not_segment_aware() {
        let table = RouteTable::new(vec![route("/client", &["GET"], "clients")]);
        assert!(table.find("/clients-archive", "GET").is_ok());
        assert!(table.find("/billing", "GET").is_err());
    }

    #[test]
    fn repeated_lookups_are_stable() {
        let table = RouteTable::new(vec![
            route("/reports", &["GET"], "reports"),
            route("/re", &["GET"], "catch"),
        ]);
        let first = table.find("/reports/monthly", "GET").unwrap().target.clone();
        for _ in 0..100 {
            assert_eq!(table.find("/reports/monthly", "GET").unwrap().target, first);
        }
    }
}
