use parser::{FromYaml, YamlError, YamlValue};
use std::collections::HashMap;

use crate::router::RoutingError;
use crate::http::Method;

// --- Constants ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";
/// Default TCP listen backlog (spec `--listen`).
pub const DEFAULT_LISTEN_BACKLOG: u32 = 1024;
/// Extensions eligible for CGI dispatch, checked alongside the route's
/// configured CGI directory prefix.
pub const CGI_EXTENSIONS: &[&str] = &[".pl", ".py", ".pyc", ".pyo", ".php"];
/// Extensions never served as static content; a request for one either
/// matches a CGI route or falls through to not-found.
pub const SCRIPT_RESERVED_EXTENSIONS: &[&str] = &[".py", ".pyc", ".pyo", ".so", ".mako"];

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    pub root: String,
    pub default_file: String,
    /// Directory prefix (relative to `path`) under which CGI-eligible
    /// scripts are dispatched to the CGI loader instead of served as static
    /// files.
    pub cgi_dir: Option<String>,
    pub cgi_path: Option<String>,
    pub autoindex: bool,
    pub upload_dir: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            cgi_dir: None,
            cgi_path: None,
            autoindex: false,
            upload_dir: String::new(),
        }
    }
}

impl FromYaml for RouteConfig {
    fn from_yaml(value: &YamlValue) -> Result<Self, YamlError> {
        let defaults = RouteConfig::default();
        Ok(RouteConfig {
            path: value
                .get("path")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.path),
            methods: value
                .get("methods")
                .map(Vec::<String>::from_yaml)
                .transpose()?
                .unwrap_or(defaults.methods),
            redirection: Option::<String>::from_yaml_opt(value.get("redirection"), "redirection")?,
            redirect_code: Option::<u16>::from_yaml_opt(value.get("redirect_code"), "redirect_code")?,
            root: value
                .get("root")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.root),
            default_file: value
                .get("default_file")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.default_file),
            cgi_dir: Option::<String>::from_yaml_opt(value.get("cgi_dir"), "cgi_dir")?,
            cgi_path: Option::<String>::from_yaml_opt(value.get("cgi_path"), "cgi_path")?,
            autoindex: value
                .get("autoindex")
                .map(bool::from_yaml)
                .transpose()?
                .unwrap_or(defaults.autoindex),
            upload_dir: value
                .get("upload_dir")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.upload_dir),
        })
    }
}

impl RouteConfig {
    pub fn matches(&self, url: &str) -> bool {
        url == self.path || url.starts_with(self.path.trim_end_matches('/')) && {
            let rest = &url[self.path.trim_end_matches('/').len()..];
            rest.is_empty() || rest.starts_with('/')
        }
    }

    /// True when `path` has a CGI-eligible extension and lives under this
    /// route's configured CGI directory (spec §4.5 step 6 / §6).
    pub fn is_cgi_request(&self, path: &str) -> bool {
        let Some(dir) = &self.cgi_dir else {
            return false;
        };
        let prefix = format!("{}/{}", self.path.trim_end_matches('/'), dir.trim_matches('/'));
        path.starts_with(prefix.as_str()) && CGI_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub routes: Vec<RouteConfig>,
    pub root: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            routes: Vec::new(),
            root: DEFAULT_ROOT.to_string(),
        }
    }
}

impl FromYaml for ServerConfig {
    fn from_yaml(value: &YamlValue) -> Result<Self, YamlError> {
        let defaults = ServerConfig::default();
        Ok(ServerConfig {
            host: value
                .get("host")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.host),
            ports: value
                .get("ports")
                .map(Vec::<u16>::from_yaml)
                .transpose()?
                .unwrap_or(defaults.ports),
            server_name: value
                .get("server_name")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.server_name),
            default_server: value
                .get("default_server")
                .map(bool::from_yaml)
                .transpose()?
                .unwrap_or(defaults.default_server),
            error_pages: value
                .get("error_pages")
                .map(HashMap::<u16, String>::from_yaml)
                .transpose()?
                .unwrap_or_default(),
            client_max_body_size: value
                .get("client_max_body_size")
                .map(usize::from_yaml)
                .transpose()?
                .unwrap_or(defaults.client_max_body_size),
            routes: value
                .get("routes")
                .map(Vec::<RouteConfig>::from_yaml)
                .transpose()?
                .unwrap_or_default(),
            root: value
                .get("root")
                .map(String::from_yaml)
                .transpose()?
                .unwrap_or(defaults.root),
        })
    }
}

impl ServerConfig {
    /// Finds the most specific route matching `url`, then checks the method
    /// is allowed on it. Longest matching `path` prefix wins.
    pub fn find_route(&self, url: &str, method: &Method) -> Result<&RouteConfig, RoutingError> {
        let mut best: Option<&RouteConfig> = None;
        for route in &self.routes {
            if route.matches(url) {
                if best.map_or(true, |b| route.path.len() > b.path.len()) {
                    best = Some(route);
                }
            }
        }

        match best {
            Some(route) => {
                if method.is_allowed(&route.methods) {
                    Ok(route)
                } else {
                    Err(RoutingError::MethodNotAllowed)
                }
            }
            None => Err(RoutingError::NotFound),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
    /// TCP listen backlog, passed straight to `listen()` for every socket
    /// this process binds (spec `--listen`; default 1024).
    pub listen_backlog: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
        }
    }
}

impl FromYaml for AppConfig {
    fn from_yaml(value: &YamlValue) -> Result<Self, YamlError> {
        let servers = match value.get("servers") {
            Some(v) => Vec::<ServerConfig>::from_yaml(v)?,
            None => vec![ServerConfig::from_yaml(value)?],
        };
        Ok(AppConfig {
            servers,
            listen_backlog: value
                .get("listen")
                .map(u32::from_yaml)
                .transpose()?
                .unwrap_or(DEFAULT_LISTEN_BACKLOG),
        })
    }
}

impl AppConfig {
    pub fn display_config(&self) {
        super::display::display_config(&self.servers);
    }

    /// Builds a single-server configuration straight from CLI flags, used
    /// when no `--config` yaml file is given.
    pub fn from_args(args: &super::cli::Args) -> Self {
        let mut error_pages = HashMap::new();
        if let Some(not_found) = &args.not_found {
            error_pages.insert(404u16, not_found.clone());
        }

        let route = RouteConfig {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "POST".to_string(), "DELETE".to_string()],
            root: args.webroot.clone(),
            default_file: args.default_page.clone(),
            cgi_dir: args.cgi_dir.clone(),
            ..RouteConfig::default()
        };

        let server = ServerConfig {
            host: args.host.clone(),
            ports: vec![args.port],
            error_pages,
            routes: vec![route],
            root: args.webroot.clone(),
            default_server: true,
            ..ServerConfig::default()
        };

        AppConfig {
            servers: vec![server],
            listen_backlog: args.listen,
        }
    }

    /// CLI flags take priority over a loaded yaml file: host/port/webroot are
    /// only overridden when the user actually passed them (clap's
    /// `default_value` makes every field always `Some`-like, so this merge
    /// only replaces the first server's identity fields the flags control
    /// directly; per-route yaml settings are left untouched).
    pub fn merge_cli(mut self, args: &super::cli::Args) -> Self {
        if args.debug {
            proxy_log::set_level(proxy_log::LEVEL_TRACE);
        }
        if let Some(first) = self.servers.first_mut() {
            if let Some(not_found) = &args.not_found {
                first.error_pages.insert(404u16, not_found.clone());
            }
        }
        self
    }
}
