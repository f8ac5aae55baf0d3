use crate::cache::TreeCache;
use crate::prelude::*;
use crate::watcher::FsWatcher;
use socket2::{Domain, Protocol, Socket, Type};
use std::process::Child;

pub struct Server {
    pub listeners: HashMap<Token, TcpListener>,
    pub configs_by_listener: HashMap<Token, Vec<Arc<ServerConfig>>>,
    pub connections: HashMap<Token, HttpConnection>,
    pub cgi_to_client: HashMap<Token, Token>,
    pub zombie_purgatory: Vec<Child>,
    pub session_store: SessionStore,
    pub tree_cache: TreeCache<LiteFile>,
    pub handler_cache: TreeCache<HandlerModule>,
    pub watcher: Option<FsWatcher>,
    next_token: usize,
}

const SESSION_TTL_SECS: u64 = 3600;
const POLL_TIMEOUT: Duration = Duration::from_millis(500);

impl Server {
    pub fn new(config: AppConfig, poll: &Poll) -> Result<Self> {
        let listen_backlog = config.listen_backlog;
        let servers = validate_configs(config.servers);
        if servers.is_empty() {
            return Err("no valid server configurations to bind".into());
        }

        let mut groups: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();
        let mut roots: Vec<String> = Vec::new();

        for server in servers {
            let server = Arc::new(server);
            roots.push(server.root.clone());
            for route in &server.routes {
                roots.push(route.root.clone());
            }
            for port in &server.ports {
                groups
                    .entry((server.host.clone(), *port))
                    .or_default()
                    .push(Arc::clone(&server));
            }
        }

        let mut next_token = 0usize;
        let mut listeners = HashMap::new();
        let mut configs_by_listener = HashMap::new();

        for ((host, port), configs) in groups {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            let mut listener = bind_with_backlog(addr, listen_backlog)?;
            let token = Token(next_token);
            next_token += 1;

            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;
            info!("listening on {addr} ({} virtual host(s))", configs.len());

            listeners.insert(token, listener);
            configs_by_listener.insert(token, configs);
        }

        let watcher = match FsWatcher::new(&roots) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("filesystem watcher disabled: {e}");
                None
            }
        };

        Ok(Self {
            listeners,
            configs_by_listener,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            zombie_purgatory: Vec::new(),
            session_store: SessionStore::new(SESSION_TTL_SECS),
            tree_cache: TreeCache::default(),
            handler_cache: TreeCache::default(),
            watcher,
            next_token,
        })
    }

    pub fn run(mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);

        loop {
            poll.poll(&mut events, Some(POLL_TIMEOUT))?;

            for event in events.iter() {
                let token = event.token();

                if self.listeners.contains_key(&token) {
                    self.accept_connections(&poll, token)?;
                    continue;
                }

                if let Some(client_token) = self.cgi_to_client.get(&token).copied() {
                    if let Some(conn) = self.connections.get_mut(&client_token) {
                        handle_cgi_event(&poll, event, token, client_token, conn, &mut self.cgi_to_client)?;
                    }
                    continue;
                }

                if self.connections.contains_key(&token) {
                    self.handle_client_event(&poll, token, event)?;
                }
            }

            timeouts::process(&mut self, &poll);
            check_time_out_cgi(&mut self.connections, &poll, &mut self.cgi_to_client);
            self.reap_zombies();

            if let Some(watcher) = &self.watcher {
                watcher.poll(&mut self.tree_cache, &mut self.handler_cache);
            }

            self.evict_closed_connections();
        }
    }

    fn accept_connections(&mut self, poll: &Poll, listener_token: Token) -> Result<()> {
        loop {
            let accepted = match self.listeners.get_mut(&listener_token) {
                Some(listener) => listener.accept(),
                None => break,
            };

            match accepted {
                Ok((mut stream, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    poll.registry().register(&mut stream, token, Interest::READABLE)?;
                    info!("accepted connection {addr} as {token:?}");

                    let configs = self
                        .configs_by_listener
                        .get(&listener_token)
                        .cloned()
                        .unwrap_or_default();
                    self.connections.insert(token, HttpConnection::new(stream, configs));
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    errors!("accept() failed: {e}");
                    break;
                }
            }
        }
        Ok(())
    }

    fn handle_client_event(&mut self, poll: &Poll, token: Token, event: &Event) -> Result<()> {
        if event.is_readable() {
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.touch();
                HttpConnection::handle_read_phase(
                    conn,
                    poll,
                    token,
                    &mut self.next_token,
                    &mut self.cgi_to_client,
                    &mut self.session_store,
                    &mut self.tree_cache,
                    &mut self.handler_cache,
                )?;
            }
        }

        if event.is_writable() {
            if let Some(conn) = self.connections.get_mut(&token) {
                HttpConnection::handle_write_phase(
                    conn,
                    poll,
                    token,
                    &mut self.next_token,
                    &mut self.cgi_to_client,
                    &mut self.session_store,
                )?;
            }
        }

        if self.connections.get(&token).is_some_and(|c| c.should_close()) {
            HttpConnection::terminate_connection(self, token);
        }

        Ok(())
    }

    fn evict_closed_connections(&mut self) {
        let dead: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.should_close())
            .map(|(token, _)| *token)
            .collect();

        for token in dead {
            HttpConnection::terminate_connection(self, token);
        }
    }

    fn reap_zombies(&mut self) {
        self.zombie_purgatory
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
    }
}

/// Binds and listens on `addr` with an explicit backlog (std's
/// `TcpListener::bind` hardcodes `listen(128)` with no way to override it),
/// then hands the socket to `mio` as a non-blocking listener.
fn bind_with_backlog(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener))
}
