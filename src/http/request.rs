use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    DELETE,
}

impl Method {
    pub fn is_allowed(&self, allowed_methods: &[String]) -> bool {
        allowed_methods.iter().any(|m| m == self.as_str())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::DELETE => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "DELETE" => Ok(Method::DELETE),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    Complete,
    Error,
}

const CRLN_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    IncompleteRequestLine,
    MalformedRequestLine,
    InvalidMethod,
    InvalidUtf8(std::string::FromUtf8Error),
    UnexpectedEof,
    HeaderTooLong,
    TooManyHeaders,
    InvalidHeaderName,
    InvalidHeaderValue,
    UnsupportedTransferEncoding,
    PayloadTooLarge,
    Error(u16),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompleteRequestLine => write!(f, "Incomplete request line"),
            ParseError::MalformedRequestLine => write!(f, "Malformed request line"),
            ParseError::InvalidMethod => write!(f, "Invalid HTTP method"),
            ParseError::InvalidUtf8(_) => write!(f, "Invalid UTF-8 in request"),
            ParseError::UnexpectedEof => write!(f, "Unexpected end of input"),
            ParseError::HeaderTooLong => write!(f, "Header line too long"),
            ParseError::TooManyHeaders => write!(f, "Too many headers"),
            ParseError::InvalidHeaderName => write!(f, "Invalid header name"),
            ParseError::InvalidHeaderValue => write!(f, "Invalid header value"),
            ParseError::UnsupportedTransferEncoding => write!(f, "Unsupported transfer encoding"),
            ParseError::PayloadTooLarge => write!(f, "Payload too large"),
            ParseError::Error(_) => write!(f, "other error"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<std::string::FromUtf8Error> for ParseError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ParseError::InvalidUtf8(err)
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub body_file: Option<File>,
    pub is_large_body: bool,
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub state: ParsingState,
    /// Set when normalization (collapsing `//`, resolving `.`/`..`) changed
    /// the request target; the dispatcher responds 302 to `normalized_target`
    /// instead of dispatching silently.
    pub path_changed_by_normalization: bool,
    pub normalized_target: String,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::GET,
            url: String::new(),
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            state: ParsingState::RequestLine,
            is_large_body: false,
            body_file: None,
            path_changed_by_normalization: false,
            normalized_target: String::new(),
        }
    }

    pub fn clear(&mut self) {
        self.state = ParsingState::RequestLine;
        self.headers.clear();
        self.body.clear();
        self.path_changed_by_normalization = false;
        self.normalized_target.clear();
    }

    pub fn finish_request(&mut self) {
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.clear();
    }

    pub fn proces_request(
        poll: &Poll,
        token: Token,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        conn: &mut HttpConnection,
        session_store: &mut SessionStore,
        tree_cache: &mut TreeCache<LiteFile>,
        handler_cache: &mut TreeCache<HandlerModule>,
    ) -> Result<bool> {
        let mut closed = false;
        loop {
            match HttpRequest::parse_request(
                conn,
                poll,
                next_token,
                cgi_to_client,
                token,
                tree_cache,
                handler_cache,
            ) {
                Ok(()) => {
                    trace!("request parsed completely");

                    if let Some(upload_manager) = &mut conn.upload_manager {
                        handle_upload_complete(&mut conn.response, upload_manager, conn.s_cfg.as_ref().unwrap());
                        conn.write_buffer.extend_from_slice(&conn.response.to_bytes());
                    } else if matches!(conn.action, ActiveAction::None)
                        && conn.write_buffer.is_empty()
                        && conn.response.body.is_empty()
                        && conn.response.status_code == HTTP_OK
                    {
                        // setup_action never produced a response (e.g. stray Complete
                        // transition) and no file/CGI/upload action is pending.
                    }

                    session_store.mange_session_store(conn);
                    conn.write_buffer.extend_from_slice(&session_cookie_bytes(conn));

                    conn.request.finish_request();
                    break;
                }
                Err(ParseError::IncompleteRequestLine) => break,
                Err(e) => {
                    let code = match e {
                        ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
                        ParseError::InvalidMethod => HTTP_METHOD_NOT_ALLOWED,
                        ParseError::HeaderTooLong => HTTP_URI_TOO_LONG,
                        ParseError::UnsupportedTransferEncoding => HTTP_NOT_IMPLEMENTED,
                        _ => HTTP_BAD_REQUEST,
                    };
                    let mut response = HttpResponse::new(code, &HttpResponse::status_text(code));
                    handle_error(&mut response, code, conn.s_cfg.as_ref());
                    closed = true;
                    conn.write_buffer.extend_from_slice(&response.to_bytes());
                    conn.request.finish_request();
                    break;
                }
            }
        }

        if !conn.write_buffer.is_empty() {
            poll.registry()
                .reregister(&mut conn.stream, token, Interest::READABLE | Interest::WRITABLE)?;
        }
        Ok(closed)
    }

    pub fn parse_request(
        conn: &mut HttpConnection,
        poll: &Poll,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        client_token: Token,
        tree_cache: &mut TreeCache<LiteFile>,
        handler_cache: &mut TreeCache<HandlerModule>,
    ) -> core::result::Result<(), ParseError> {
        loop {
            let res = match conn.request.state {
                ParsingState::RequestLine => conn.request.parse_request_line(),
                ParsingState::Headers => HttpRequest::parse_headers(conn),
                ParsingState::HeadersDone => {
                    if let Some(res) = HttpRequest::setup_action(
                        conn,
                        poll,
                        next_token,
                        cgi_to_client,
                        client_token,
                        tree_cache,
                        handler_cache,
                    )? {
                        conn.write_buffer.extend_from_slice(&res.to_bytes());
                        conn.request.state = ParsingState::Complete;
                    }
                    Ok(())
                }
                ParsingState::Body => HttpRequest::parse_body(poll, conn),
                _ => break,
            };

            match res {
                Ok(_) => {
                    if conn.request.state == ParsingState::Complete {
                        break;
                    }
                }
                Err(ParseError::IncompleteRequestLine) => return Err(ParseError::IncompleteRequestLine),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn setup_action(
        conn: &mut HttpConnection,
        poll: &Poll,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        client_token: Token,
        tree_cache: &mut TreeCache<LiteFile>,
        handler_cache: &mut TreeCache<HandlerModule>,
    ) -> core::result::Result<Option<HttpResponse>, ParseError> {
        let s_cfg = conn.resolve_config();
        conn.s_cfg = Some(Arc::clone(&s_cfg));

        if conn.request.path_changed_by_normalization {
            conn.request.state = ParsingState::Complete;
            let location = match conn.request.headers.get("host") {
                Some(host) => format!("http://{host}{}", conn.request.normalized_target),
                None => conn.request.normalized_target.clone(),
            };
            return Ok(Some(HttpResponse::redirect(HTTP_FOUND, &location)));
        }

        if conn
            .request
            .headers
            .get("transfer-encoding")
            .map(|v| v.to_lowercase().contains("chunked"))
            .unwrap_or(false)
        {
            return Err(ParseError::UnsupportedTransferEncoding);
        }

        let content_length = conn
            .request
            .headers
            .get("content-length")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);

        let content_type = conn
            .request
            .headers
            .get("content-type")
            .map(|s| s.as_str())
            .unwrap_or("");

        conn.boundary = content_type
            .split("boundary=")
            .nth(1)
            .map(|b| b.trim())
            .unwrap_or("")
            .to_string();

        if content_length > s_cfg.client_max_body_size {
            return Err(ParseError::PayloadTooLarge);
        }

        conn.body_remaining = content_length;

        let request = &conn.request;
        let mut res = HttpResponse::new(HTTP_OK, "OK");

        let outcome = match s_cfg.find_route(&request.path, &request.method) {
            Ok(r_cfg) => {
                if let Some(ref redirect_url) = r_cfg.redirection {
                    res = HttpResponse::redirect(r_cfg.redirect_code.unwrap_or(HTTP_FOUND), redirect_url);
                    Some(())
                } else if r_cfg.is_cgi_request(&request.path) {
                    return setup_cgi_action(
                        conn,
                        &s_cfg,
                        r_cfg.clone(),
                        poll,
                        next_token,
                        cgi_to_client,
                        client_token,
                        content_length,
                    );
                } else {
                    match request.method {
                        Method::GET => {
                            conn.action =
                                handle_get(request, &mut res, r_cfg, &s_cfg, tree_cache, handler_cache);
                            None
                        }
                        Method::POST => {
                            if !r_cfg.upload_dir.is_empty() {
                                let path = PathBuf::from(&r_cfg.root).join(&r_cfg.upload_dir);
                                conn.action = ActiveAction::Upload(path);
                                return pick_body_state(conn, content_length);
                            } else {
                                handle_error(&mut res, HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg));
                                Some(())
                            }
                        }
                        Method::DELETE => {
                            res = handle_delete(request, r_cfg, &s_cfg);
                            Some(())
                        }
                    }
                }
            }
            Err(RoutingError::MethodNotAllowed) => {
                handle_error(&mut res, HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg));
                Some(())
            }
            Err(RoutingError::NotFound) => {
                handle_error(&mut res, HTTP_NOT_FOUND, Some(&s_cfg));
                Some(())
            }
        };

        if outcome.is_none() && matches!(conn.action, ActiveAction::None) {
            // GET handler already produced its final response synchronously.
            conn.request.state = if content_length > 0 {
                ParsingState::Body
            } else {
                ParsingState::Complete
            };
            return Ok(Some(res));
        }

        pick_body_state(conn, content_length)
    }

    fn parse_request_line(&mut self) -> core::result::Result<(), ParseError> {
        if let Some(abs_index) = find_crlf(&self.buffer, self.cursor) {
            let line_bytes = &self.buffer[self.cursor..abs_index];
            let request_line =
                std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;

            let parts: Vec<&str> = request_line.split_whitespace().collect();
            if parts.len() == 3 {
                self.method = Method::from_str(parts[0])?;
                self.url = parts[1].to_string();
                self.version = parts[2].to_string();

                let normalized = normalize_path(&self.url);
                self.path_changed_by_normalization = normalized != self.url;
                self.normalized_target = normalized.clone();
                let (path, query) = match normalized.find('?') {
                    Some(i) => (normalized[..i].to_string(), normalized[i + 1..].to_string()),
                    None => (normalized, String::new()),
                };
                self.path = percent_decode(&path);
                self.query = query;

                self.cursor = abs_index + CRLN_LEN;
                self.state = ParsingState::Headers;
            } else {
                return Err(ParseError::MalformedRequestLine);
            }
        } else {
            return Err(ParseError::IncompleteRequestLine);
        }
        Ok(())
    }

    fn extract_and_parse_header(
        &mut self,
    ) -> core::result::Result<Option<(String, String)>, ParseError> {
        if let Some(abs_index) = find_crlf(&self.buffer, self.cursor) {
            let line_bytes = &self.buffer[self.cursor..abs_index];
            if line_bytes.is_empty() {
                self.cursor = abs_index + CRLN_LEN;
                return Ok(None);
            }
            let line =
                std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;
            self.cursor = abs_index + CRLN_LEN;
            if let Some(sep) = line.find(':') {
                let key = line[..sep].trim().to_string();
                let val = line[sep + 1..].trim().to_string();
                return Ok(Some((key.to_ascii_lowercase(), val)));
            }
            Err(ParseError::MalformedRequestLine)
        } else {
            Err(ParseError::IncompleteRequestLine)
        }
    }

    fn parse_headers(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        loop {
            let headers_option = conn.request.extract_and_parse_header()?;
            match headers_option {
                Some((k, v)) => conn.request.headers.insert(k, v),
                None => {
                    conn.request.buffer.drain(..conn.request.cursor);
                    conn.request.cursor = 0;
                    conn.request.state = ParsingState::HeadersDone;
                    return Ok(());
                }
            };
        }
    }

    pub fn parse_body(
        poll: &Poll,
        conn: &mut HttpConnection,
    ) -> core::result::Result<(), ParseError> {
        let available = conn.request.buffer.len() - conn.request.cursor;
        let to_process = std::cmp::min(available, conn.body_remaining);

        if to_process > 0 {
            match &mut conn.action {
                ActiveAction::Cgi { in_stream, .. } => {
                    let data = conn.request.buffer.drain(..to_process).collect::<Vec<u8>>();
                    conn.cgi_buffer.extend_from_slice(&data);
                    conn.body_remaining -= to_process;

                    if let Some(in_token) = conn.cgi_in_token {
                        if let Some(pipe) = in_stream {
                            let _ = poll.registry().reregister(pipe, in_token, Interest::WRITABLE);
                        }
                    }
                }
                _ => {
                    let start = conn.request.cursor;
                    execute_active_action(
                        &conn.request,
                        &mut conn.upload_manager,
                        &mut conn.action,
                        start,
                        to_process,
                        &conn.boundary,
                    )?;
                    conn.body_remaining -= to_process;
                    conn.request.buffer.drain(start..start + to_process);
                }
            }
        }

        if conn.body_remaining == 0 {
            conn.request.state = ParsingState::Complete;
            Ok(())
        } else {
            Err(ParseError::IncompleteRequestLine)
        }
    }

    pub fn extract_filename(&self) -> String {
        format!(
            "uploaded_{}",
            SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0)
        )
    }
}

pub(crate) fn pick_body_state(
    conn: &mut HttpConnection,
    content_length: usize,
) -> core::result::Result<Option<HttpResponse>, ParseError> {
    if content_length > 0 {
        conn.request.state = ParsingState::Body;
        Ok(None)
    } else if matches!(conn.action, ActiveAction::Cgi { .. } | ActiveAction::Upload(_)) {
        conn.request.state = ParsingState::Complete;
        Ok(None)
    } else {
        Ok(Some(HttpResponse::new(400, "Bad Request").set_body(
            b"Error: No file data provided.".to_vec(),
            "text/plain",
        ).clone()))
    }
}

fn session_cookie_bytes(conn: &HttpConnection) -> Vec<u8> {
    let _ = conn;
    Vec::new()
}

fn handle_upload_complete(response: &mut HttpResponse, upload_manager: &mut Upload, s_cfg: &Arc<ServerConfig>) {
    Upload::handel_upload_manager(response, upload_manager, s_cfg);
}

/// Collapses `//`, strips `.` segments, and resolves `..` without touching the
/// filesystem. A leading `/` is always preserved.
pub fn normalize_path(raw: &str) -> String {
    let (path_part, rest) = match raw.find('?') {
        Some(i) => (&raw[..i], &raw[i..]),
        None => (raw, ""),
    };

    let mut segments: Vec<&str> = Vec::new();
    for seg in path_part.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut normalized = String::from("/");
    normalized.push_str(&segments.join("/"));
    normalized.push_str(rest);
    normalized
}

pub fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(hex) = std::str::from_utf8(&bytes[i + 1..i + 3]) {
                if let Ok(byte) = u8::from_str_radix(hex, 16) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    let search_area = buffer.get(start_offset..)?;

    let mut current_pos = 0;
    while let Some(r_pos) = search_area[current_pos..].iter().position(|&b| b == b'\r') {
        let abs_r_pos_in_search = current_pos + r_pos;

        if search_area.get(abs_r_pos_in_search + 1) == Some(&b'\n') {
            return Some(start_offset + abs_r_pos_in_search);
        }
        current_pos = abs_r_pos_in_search + 1;
    }
    None
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let search_area = buffer.get(start_offset..)?;
    let first_byte = needle[0];
    let mut current_pos = 0;

    while let Some(rel_pos) = search_area[current_pos..].iter().position(|&b| b == first_byte) {
        let abs_pos_in_search = current_pos + rel_pos;

        if let Some(candidate) = search_area.get(abs_pos_in_search..abs_pos_in_search + needle.len()) {
            if candidate == needle {
                return Some(start_offset + abs_pos_in_search);
            }
        } else {
            return None;
        }
        current_pos = abs_pos_in_search + 1;
    }
    None
}

impl Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- HTTP Request ---")?;
        writeln!(f, "{:?} {} {}", self.method, self.url, self.version)?;
        writeln!(f, "Headers:")?;
        for (key, value) in &self.headers {
            writeln!(f, "  {}: {}", key, value)?;
        }
        if !self.body.is_empty() {
            writeln!(f, "Body ({} bytes)", self.body.len())?;
        } else {
            writeln!(f, "Body: <empty>")?;
        }
        writeln!(f, "--------------------")
    }
}

#[derive(Debug, Default)]
pub struct PartInfo {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
}

pub fn parse_part_headers(headers: &str) -> PartInfo {
    let mut info = PartInfo {
        name: String::new(),
        filename: None,
        content_type: String::new(),
    };

    for line in headers.lines() {
        if line.starts_with("Content-Disposition:") {
            if let Some(n) = line.split(';').find(|s| s.trim().starts_with("name=")) {
                info.name = n.split('=').nth(1).unwrap_or("").trim_matches('"').to_string();
            }
            if let Some(f) = line.split(';').find(|s| s.trim().starts_with("filename=")) {
                info.filename = Some(
                    f.split('=').nth(1).unwrap_or("").trim_matches('"').to_string(),
                );
            }
        } else if line.starts_with("Content-Type:") {
            info.content_type = line.split(':').nth(1).unwrap_or("text/plain").trim().to_string();
        }
    }
    info
}
