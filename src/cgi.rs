use crate::error::LitefsError;
use crate::prelude::*;

#[derive(Debug, PartialEq)]
pub enum CgiParsingState {
    ReadHeaders,
    StreamBody,
}

pub fn parse_cgi_headers(bytes: &[u8]) -> (u16, Vec<(String, String)>) {
    let mut status = 200;
    let mut headers = Vec::new();
    let content = String::from_utf8_lossy(bytes);

    for line in content.lines() {
        if let Some((key, val)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            let val = val.trim().to_string();

            if key == "status" {
                status = val
                    .split_whitespace()
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(200);
            } else {
                headers.push((key, val));
            }
        }
    }
    (status, headers)
}

pub fn parse_cgi_output(raw_output: &[u8]) -> (u16, Vec<(String, String)>, Vec<u8>) {
    let header_end = find_subsequence(raw_output, b"\r\n\r\n", 0).unwrap_or(0);
    let header_section = String::from_utf8_lossy(&raw_output[..header_end]);
    let body = raw_output[header_end + 4..].to_vec();
    let (status_code, headers) = parse_cgi_headers(header_section.as_bytes());
    (status_code, headers, body)
}

/// Spawns the CGI interpreter for `r_cfg`, wiring its stdin/stdout into the
/// reactor as a pair of non-blocking `UnixStream`s (grounded in the
/// bidirectional-pipe pattern already used for client sockets).
pub fn setup_cgi_action(
    conn: &mut HttpConnection,
    s_cfg: &Arc<ServerConfig>,
    r_cfg: RouteConfig,
    poll: &Poll,
    next_token: &mut usize,
    cgi_to_client: &mut HashMap<Token, Token>,
    client_token: Token,
    content_length: usize,
) -> core::result::Result<Option<HttpResponse>, ParseError> {
    let relative = conn
        .request
        .path
        .strip_prefix(&r_cfg.path)
        .unwrap_or(&conn.request.path);
    let script_path = PathBuf::from(&r_cfg.root).join(relative.trim_start_matches('/'));

    if !script_path.is_file() {
        let mut res = HttpResponse::new(HTTP_NOT_FOUND, "Not Found");
        handle_error(&mut res, HTTP_NOT_FOUND, Some(s_cfg));
        conn.request.state = ParsingState::Complete;
        return Ok(Some(res));
    }

    let envs = build_cgi_env(conn, &r_cfg);

    let (server_stdin, child_stdin) = match UnixStream::pair() {
        Ok(pair) => pair,
        Err(_) => return Ok(Some(cgi_failure(s_cfg))),
    };
    let (server_stdout, child_stdout) = match UnixStream::pair() {
        Ok(pair) => pair,
        Err(_) => return Ok(Some(cgi_failure(s_cfg, "failed to allocate stdout pipe"))),
    };
    let (server_stderr, child_stderr) = match UnixStream::pair() {
        Ok(pair) => pair,
        Err(_) => return Ok(Some(cgi_failure(s_cfg, "failed to allocate stderr pipe"))),
    };

    let interpreter = r_cfg.cgi_path.clone().unwrap_or_else(|| script_path.to_string_lossy().into_owned());
    let mut command = Command::new(&interpreter);
    if r_cfg.cgi_path.is_some() {
        command.arg(&script_path);
    }

    let child = unsafe {
        command
            .current_dir(script_path.parent().unwrap_or_else(|| Path::new(".")))
            .stdin(Stdio::from_raw_fd(child_stdin.into_raw_fd()))
            .stdout(Stdio::from_raw_fd(child_stdout.into_raw_fd()))
            .stderr(Stdio::from_raw_fd(child_stderr.into_raw_fd()))
            .envs(envs)
            .spawn()
    };

    let child = match child {
        Ok(c) => c,
        Err(_) => return Ok(Some(cgi_failure(s_cfg, "failed to spawn interpreter"))),
    };

    let mut out_stream = mio::net::UnixStream::from_std(server_stdout);
    let mut in_stream = mio::net::UnixStream::from_std(server_stdin);
    let mut err_stream = mio::net::UnixStream::from_std(server_stderr);

    let out_token = Token(*next_token);
    *next_token += 1;
    let in_token = Token(*next_token);
    *next_token += 1;
    let err_token = Token(*next_token);
    *next_token += 1;

    poll.registry()
        .register(&mut out_stream, out_token, Interest::READABLE)
        .map_err(|_| ParseError::Error(HTTP_INTERNAL_SERVER_ERROR))?;
    poll.registry()
        .register(&mut in_stream, in_token, Interest::WRITABLE)
        .map_err(|_| ParseError::Error(HTTP_INTERNAL_SERVER_ERROR))?;
    poll.registry()
        .register(&mut err_stream, err_token, Interest::READABLE)
        .map_err(|_| ParseError::Error(HTTP_INTERNAL_SERVER_ERROR))?;

    cgi_to_client.insert(out_token, client_token);
    cgi_to_client.insert(in_token, client_token);
    cgi_to_client.insert(err_token, client_token);
    conn.cgi_out_token = Some(out_token);
    conn.cgi_in_token = Some(in_token);
    conn.cgi_err_token = Some(err_token);

    conn.action = ActiveAction::Cgi {
        out_stream,
        in_stream: Some(in_stream),
        err_stream,
        child,
        parse_state: CgiParsingState::ReadHeaders,
        header_buf: Vec::new(),
        stderr_buf: Vec::new(),
        start_time: Instant::now(),
    };

    pick_body_state(conn, content_length)
}

fn cgi_failure(s_cfg: &Arc<ServerConfig>, reason: &str) -> HttpResponse {
    let err = LitefsError::CgiFailure(reason.to_string());
    let mut res = HttpResponse::new(err.status_code(), status_text_for(err.status_code()));
    handle_error(&mut res, err.status_code(), Some(s_cfg));
    res
}

/// Builds the 500 a failed CGI invocation returns: stderr as the body when
/// debug logging is on, the generic error page otherwise (spec §4.10/§7).
fn cgi_failure_response(s_cfg: &Arc<ServerConfig>, stderr: &[u8]) -> HttpResponse {
    let err = LitefsError::CgiFailure("script exited non-zero or wrote to stderr".to_string());
    let status = err.status_code();
    let mut res = HttpResponse::new(status, status_text_for(status));

    if proxy_log::enabled(proxy_log::LEVEL_TRACE) && !stderr.is_empty() {
        res.set_status_code(status);
        res.set_body(stderr.to_vec(), "text/plain");
    } else {
        handle_error(&mut res, status, Some(s_cfg));
    }
    res
}

pub fn handle_cgi_event(
    poll: &Poll,
    event: &Event,
    cgi_token: Token,
    client_token: Token,
    conn: &mut HttpConnection,
    cgi_to_client: &mut HashMap<Token, Token>,
) -> Result<()> {
    if let ActiveAction::Cgi {
        out_stream,
        in_stream,
        err_stream,
        child,
        parse_state,
        header_buf,
        stderr_buf,
        ..
    } = &mut conn.action
    {
        // SCRIPT -> SERVER (stdout)
        if event.is_readable() && Some(cgi_token) == conn.cgi_out_token {
            let mut buf = [0u8; 4096];
            match out_stream.read(&mut buf) {
                Ok(0) => {
                    conn.cgi_out_token = None;
                    conn.cgi_in_token = None;
                    conn.closed = true;
                }
                Ok(n) => {
                    process_cgi_stdout(parse_state, header_buf, &mut conn.write_buffer, &buf[..n])?;
                    poll.registry().reregister(
                        &mut conn.stream,
                        client_token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => conn.closed = true,
            }
        }

        // SCRIPT -> SERVER (stderr)
        if event.is_readable() && Some(cgi_token) == conn.cgi_err_token {
            let mut buf = [0u8; 4096];
            match err_stream.read(&mut buf) {
                Ok(0) => conn.cgi_err_token = None,
                Ok(n) => stderr_buf.extend_from_slice(&buf[..n]),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(_) => conn.cgi_err_token = None,
            }
        }

        // SERVER -> SCRIPT (stdin)
        if event.is_writable() && Some(cgi_token) == conn.cgi_in_token && !conn.cgi_buffer.is_empty() {
            if let Some(pipe) = in_stream {
                match pipe.write(&conn.cgi_buffer) {
                    Ok(n) => {
                        conn.cgi_buffer.drain(..n);
                        if conn.body_remaining == 0 && conn.cgi_buffer.is_empty() {
                            conn.cgi_in_token = None;
                            trace!("CGI stdin pipe closed (EOF sent)");
                        }
                    }
                    Err(e) if e.kind() != ErrorKind::WouldBlock => conn.closed = true,
                    Err(_) => {}
                }
            }
        } else if event.is_writable()
            && Some(cgi_token) == conn.cgi_in_token
            && conn.body_remaining == 0
        {
            if let Some(pipe) = in_stream.take() {
                drop(pipe);
                conn.cgi_in_token = None;
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                // Nothing of the response has been flushed to the client yet
                // iff the stdout parser is still mid-header; only then can
                // a late stderr/exit-status failure still become a 500.
                let still_in_headers = *parse_state == CgiParsingState::ReadHeaders;
                let failed = !status.success() || !stderr_buf.is_empty();

                if failed && still_in_headers {
                    if !status.success() {
                        warn!("CGI script exited with {status}");
                    }
                    if !stderr_buf.is_empty() {
                        warn!("CGI script wrote {} bytes to stderr", stderr_buf.len());
                    }
                    let res = cgi_failure_response(conn.s_cfg.as_ref().expect("s_cfg set before dispatch"), stderr_buf);
                    conn.write_buffer.extend_from_slice(&res.to_bytes());
                } else if failed {
                    warn!("CGI script failed after streaming a response; response already sent");
                }

                cleanup_cgi(cgi_to_client, conn);
                conn.action = ActiveAction::None;
            }
            Ok(None) => {}
            Err(_) => conn.closed = true,
        }
    }
    Ok(())
}

pub fn build_cgi_env(conn: &mut HttpConnection, r_cfg: &RouteConfig) -> HashMap<String, String> {
    let req = &conn.request;
    let mut envs = HashMap::new();

    envs.insert("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string());
    envs.insert("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string());
    envs.insert("REQUEST_METHOD".to_string(), req.method.to_string());
    envs.insert("QUERY_STRING".to_string(), req.query.clone());
    envs.insert("PATH_INFO".to_string(), req.path.clone());
    envs.insert(
        "SCRIPT_NAME".to_string(),
        req.path.strip_prefix(&r_cfg.path).unwrap_or(&req.path).to_string(),
    );
    envs.insert("SERVER_NAME".to_string(), "litefs".to_string());

    if let Ok(addr) = conn.stream.peer_addr() {
        envs.insert("REMOTE_ADDR".to_string(), addr.ip().to_string());
        envs.insert("REMOTE_PORT".to_string(), addr.port().to_string());
    }

    if let Some(ct) = req.headers.get("content-type") {
        envs.insert("CONTENT_TYPE".to_string(), ct.clone());
    }
    if let Some(cl) = req.headers.get("content-length") {
        envs.insert("CONTENT_LENGTH".to_string(), cl.clone());
    }

    for (k, v) in req.headers.iter() {
        let env_key = format!("HTTP_{}", k.to_uppercase().replace('-', "_"));
        envs.insert(env_key, v.clone());
    }

    envs
}

/// CGI output is framed by connection close rather than chunked
/// transfer-encoding, since every response here already closes the
/// connection once fully written.
pub fn process_cgi_stdout(
    parse_state: &mut CgiParsingState,
    header_buf: &mut Vec<u8>,
    write_buffer: &mut Vec<u8>,
    new_data: &[u8],
) -> Result<()> {
    match parse_state {
        CgiParsingState::ReadHeaders => {
            header_buf.extend_from_slice(new_data);

            if let Some(pos) = find_subsequence(header_buf, b"\r\n\r\n", 0)
                .or_else(|| find_subsequence(header_buf, b"\n\n", 0))
            {
                let is_crlf = header_buf.contains(&b'\r');
                let delimiter_len = if is_crlf { 4 } else { 2 };

                let header_bytes = header_buf[..pos].to_vec();
                let body_start = header_buf[pos + delimiter_len..].to_vec();

                let (status, cgi_headers) = parse_cgi_headers(&header_bytes);
                let mut res = HttpResponse::new(status, status_text_for(status));
                res.headers.remove("content-length");

                for (k, v) in cgi_headers {
                    res.set_header(&k, &v);
                }

                *parse_state = CgiParsingState::StreamBody;
                write_buffer.extend_from_slice(&res.to_bytes_headers_only());
                write_buffer.extend_from_slice(&body_start);
            }
        }
        CgiParsingState::StreamBody => {
            write_buffer.extend_from_slice(new_data);
        }
    }
    Ok(())
}

pub fn cleanup_cgi(cgi_to_client: &mut HashMap<Token, Token>, conn: &mut HttpConnection) {
    if let Some(t) = conn.cgi_out_token.take() {
        cgi_to_client.remove(&t);
    }
    if let Some(t) = conn.cgi_in_token.take() {
        cgi_to_client.remove(&t);
    }
    if let Some(t) = conn.cgi_err_token.take() {
        cgi_to_client.remove(&t);
    }
}

pub fn check_time_out_cgi(
    connections: &mut HashMap<Token, HttpConnection>,
    poll: &Poll,
    cgi_to_client: &mut HashMap<Token, Token>,
) {
    for (token, conn) in connections.iter_mut() {
        let timed_out = matches!(
            &conn.action,
            ActiveAction::Cgi { start_time, .. } if start_time.elapsed().as_secs() > TIMEOUT_CGI
        );
        if timed_out {
            warn!("CGI process timed out, killing child");
            force_cgi_timeout(conn, cgi_to_client);
            let _ = poll
                .registry()
                .reregister(&mut conn.stream, *token, Interest::WRITABLE);
        }
    }
}

pub fn force_cgi_timeout(conn: &mut HttpConnection, cgi_to_client: &mut HashMap<Token, Token>) {
    if let ActiveAction::Cgi {
        ref mut child,
        ref parse_state,
        ..
    } = conn.action
    {
        let _ = child.kill();
        let _ = child.wait();

        if *parse_state == CgiParsingState::ReadHeaders {
            let error_res = "HTTP/1.1 504 Gateway Timeout\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
            conn.write_buffer.extend_from_slice(error_res.as_bytes());
        }

        conn.cgi_in_token = None;
        conn.cgi_out_token = None;
        conn.cgi_err_token = None;
        conn.cgi_buffer.clear();
        conn.closed = true;

        cleanup_cgi(cgi_to_client, conn);
        conn.action = ActiveAction::None;
    }
}
