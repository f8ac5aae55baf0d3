use crate::config::RouteConfig;
use crate::http::Method;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

/// Host-keyed route table. `ServerConfig::find_route` covers per-host
/// resolution inline for the reactor's hot path; this wraps the same
/// longest-prefix-wins matching behind an explicit host lookup, useful for
/// composing route tables outside of a full `ServerConfig`.
#[derive(Debug, Default)]
pub struct Router {
    hosts: HashMap<String, Vec<(String, Arc<RouteConfig>)>>,
}

impl Router {
    pub fn new() -> Self {
        Self { hosts: HashMap::new() }
    }

    pub fn add_route_config(&mut self, host: &str, path: &str, route: Arc<RouteConfig>) {
        self.hosts
            .entry(host.to_string())
            .or_default()
            .push((path.to_string(), route));
    }

    pub fn resolve(
        &self,
        method: &Method,
        host: &str,
        path: &str,
    ) -> Result<Arc<RouteConfig>, RoutingError> {
        let routes = self.hosts.get(host).ok_or(RoutingError::NotFound)?;

        let mut best: Option<&(String, Arc<RouteConfig>)> = None;
        for entry in routes {
            if entry.1.matches(path) {
                if best.map_or(true, |b| entry.0.len() > b.0.len()) {
                    best = Some(entry);
                }
            }
        }

        match best {
            Some((_, route)) if method.is_allowed(&route.methods) => Ok(Arc::clone(route)),
            Some(_) => Err(RoutingError::MethodNotAllowed),
            None => Err(RoutingError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins_among_registered_routes() {
        let mut router = Router::new();
        router.add_route_config(
            "localhost",
            "/a",
            Arc::new(RouteConfig { path: "/a".into(), methods: vec!["GET".into()], ..Default::default() }),
        );
        router.add_route_config(
            "localhost",
            "/a/b",
            Arc::new(RouteConfig { path: "/a/b".into(), methods: vec!["GET".into()], ..Default::default() }),
        );

        let resolved = router.resolve(&Method::GET, "localhost", "/a/b/c").unwrap();
        assert_eq!(resolved.path, "/a/b");
    }
}
