use std::collections::BTreeMap;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response};
use gateway_config::Config;
use gateway_contracts::RouteDefinition;
use reqwest::Client;

use crate::error::{apply_cors, ApiError};

pub(crate) const ROUTE_HEADER: &str = "x-gateway-route";
pub(crate) const ORIGINAL_PATH_HEADER: &str = "x-original-path";

const HOP_BY_HOP: [HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
];

pub(crate) struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub(crate) struct Forwarder {
    targets: BTreeMap<String, String>,
    client: Client,
}

impl Forwarder {
    pub(crate) fn new(cfg: &Config) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.forwarding.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            targets: cfg.forwarding.targets.clone(),
            client,
        })
    }

    pub(crate) fn target_url(&self, route: &RouteDefinition, path: &str, query: Option<&str>) -> Option<String> {
        let base = self.targets.get(&route.target)?;
        let rest = path.strip_prefix(route.path.as_str()).unwrap_or("");
        let mut url = format!("{}{}", base.trim_end_matches('/'), rest);
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        Some(url)
    }

    pub(crate) async fn forward(
        &self,
        route: &RouteDefinition,
        request: InboundRequest,
    ) -> Result<Response<Body>, ApiError> {
        let url = self
            .target_url(route, &request.path, request.query.as_deref())
            .ok_or_else(|| ApiError::Forwarding(format!("unknown target {}", route.target)))?;

        let mut headers = request.headers;
        for name in &HOP_BY_HOP {
            headers.remove(name);
        }
        headers.insert(
            HeaderName::from_static(ROUTE_HEADER),
            header_value(&route.path)?,
        );
        headers.insert(
            HeaderName::from_static(ORIGINAL_PATH_HEADER),
            header_value(&request.path)?,
        );

        let mut outbound = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers);
        if request.method != Method::GET && request.method != Method::HEAD {
            outbound = outbound.body(request.body);
        }

        let upstream = outbound
            .send()
            .await
            .map_err(|e| ApiError::Forwarding(e.to_string()))?;
        let status = upstream.status();
        let mut upstream_headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| ApiError::Forwarding(e.to_string()))?;

        for name in &HOP_BY_HOP {
            upstream_headers.remove(name);
        }
        apply_cors(&mut upstream_headers);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = upstream_headers;
        Ok(response)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|e| ApiError::Forwarding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarder() -> Forwarder {
        let mut targets = BTreeMap::new();
        targets.insert("clients-api".to_string(), "http://svc:9000/clients/".to_string());
        Forwarder {
            targets,
            client: Client::new(),
        }
    }

    fn route(path: &str, target: &str) -> RouteDefinition {
        RouteDefinition {
            path: path.to_string(),
            methods: vec!["GET".to_string()],
            require_auth: true,
            rate_limit: None,
            target: target.to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn target_url_keeps_suffix_and_query() {
        let f = forwarder();
        let r = route("/clients", "clients-api");
        assert_eq!(
            f.target_url(&r, "/clients/42", Some("include=tasks")).unwrap(),
            "http://svc:9000/clients/42?include=tasks"
        );
        assert_eq!(
            f.target_url(&r, "/clients", None).unwrap(),
            "http://svc:9000/clients"
        );
        assert!(f.target_url(&route("/x", "missing"), "/x", None).is_none());
    }
}
