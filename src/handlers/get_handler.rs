pub use crate::prelude::*;
use crate::cache::TreeCache;
use crate::config::types::SCRIPT_RESERVED_EXTENSIONS;
use crate::handler::HandlerModule;
use crate::litefile::{ContentEncoding, LiteFile, format_http_date, parse_http_date};

/// Serves a GET request against a resolved route: handler-cache hit, then
/// static-cache hit, then directory redirect, then `.mako` template load,
/// then static-file load, then not-found. Mirrors the dispatcher's
/// cache-then-loader ordering so a hit never touches the filesystem twice.
pub fn handle_get(
    request: &HttpRequest,
    response: &mut HttpResponse,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
    tree_cache: &mut TreeCache<LiteFile>,
    handler_cache: &mut TreeCache<HandlerModule>,
) -> ActiveAction {
    let root = PathBuf::from(&r_cfg.root);
    let Ok(canonical_root) = root.canonicalize() else {
        handle_error(response, HTTP_NOT_FOUND, Some(s_cfg));
        return ActiveAction::None;
    };

    let relative_path = request
        .path
        .strip_prefix(&r_cfg.path)
        .unwrap_or(&request.path)
        .trim_start_matches('/');
    let ends_in_slash = request.path.ends_with('/') || relative_path.is_empty();

    let (dir_part, mut name) = match relative_path.rfind('/') {
        Some(i) => (&relative_path[..i], relative_path[i + 1..].to_string()),
        None => ("", relative_path.to_string()),
    };
    if name.is_empty() {
        name = r_cfg.default_file.clone();
    }

    let dir_path = root.join(dir_part);
    let mut candidate = dir_path.clone();
    candidate.push(&name);

    let handler_key = PathBuf::from(&request.path);

    if let Some(module) = handler_cache.get(&handler_key) {
        return serve_handler_module(module, &candidate, response);
    }

    // A path that canonicalizes (i.e. exists) but escapes the route's
    // canonical root is rejected outright, before any cache lookup or read.
    let canonical_candidate = match candidate.canonicalize() {
        Ok(canon) if !canon.starts_with(&canonical_root) => {
            handle_error(response, HTTP_NOT_FOUND, Some(s_cfg));
            return ActiveAction::None;
        }
        Ok(canon) => Some(canon),
        Err(_) => None,
    };

    if let Some(ref canon) = canonical_candidate {
        if let Some(file) = tree_cache.get(canon) {
            serve_litefile(file, request, &candidate, response);
            return ActiveAction::None;
        }
    }

    // Directory redirect: the unsplit request path names a directory.
    let unsplit = root.join(relative_path);
    if !ends_in_slash && unsplit.is_dir() {
        *response = HttpResponse::redirect(HTTP_FOUND, &format!("{}/", request.path));
        return ActiveAction::None;
    }

    let mako_sibling = PathBuf::from(format!("{}.mako", candidate.display()));
    let canonical_mako = mako_sibling.canonicalize().ok().filter(|c| c.starts_with(&canonical_root));
    if let Some(canon) = canonical_mako {
        return match fs::read(&canon) {
            Ok(bytes) => {
                let module = HandlerModule::Template(bytes);
                handler_cache.insert(handler_key, module.clone());
                serve_handler_module(&module, &candidate, response)
            }
            Err(_) => {
                handle_error(response, HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg));
                ActiveAction::None
            }
        };
    }

    let reserved = candidate
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| SCRIPT_RESERVED_EXTENSIONS.contains(&format!(".{e}").as_str()))
        .unwrap_or(false);

    let Some(canon) = canonical_candidate else {
        handle_error(response, HTTP_NOT_FOUND, Some(s_cfg));
        return ActiveAction::None;
    };

    if reserved || !canon.is_file() {
        handle_error(response, HTTP_NOT_FOUND, Some(s_cfg));
        return ActiveAction::None;
    }

    match load_litefile(&canon) {
        Ok(file) => {
            tree_cache.insert(canon.clone(), file);
            let file = tree_cache.get(&canon).expect("just inserted");
            serve_litefile(file, request, &candidate, response);
            ActiveAction::None
        }
        Err(code) => {
            handle_error(response, code, Some(s_cfg));
            ActiveAction::None
        }
    }
}

fn serve_handler_module(module: &HandlerModule, source: &Path, response: &mut HttpResponse) -> ActiveAction {
    match module {
        HandlerModule::Template(bytes) => {
            let mime_type = get_mime_type(source.extension().and_then(|s| s.to_str()));
            response.set_status_code(HTTP_OK);
            response.set_body(bytes.clone(), mime_type);
        }
    }
    ActiveAction::None
}

/// Conditional-GET ordering per the response builder spec: last-modified
/// equality, then encoding negotiation, then the negotiated variant's ETag.
fn serve_litefile(file: &LiteFile, request: &HttpRequest, source: &Path, response: &mut HttpResponse) {
    let if_modified_since = request
        .headers
        .get("if-modified-since")
        .and_then(|v| parse_http_date(v));

    if file.matches_last_modified(if_modified_since) {
        response.set_status_code(304);
        return;
    }

    let accept_encoding = request.headers.get("accept-encoding").map(String::as_str).unwrap_or("");
    let (body, encoding) = file.negotiate(accept_encoding);

    let if_none_match = request.headers.get("if-none-match").map(String::as_str);
    if file.matches_etag(if_none_match, encoding) {
        response.set_status_code(304);
        response.set_header("ETag", file.etag_for(encoding));
        return;
    }

    let mime_type = get_mime_type(source.extension().and_then(|s| s.to_str()));

    response.set_status_code(HTTP_OK);
    response.set_body(body.to_vec(), mime_type);
    response.set_header("ETag", file.etag_for(encoding));
    response.set_header("Last-Modified", &format_http_date(file.last_modified));
    if encoding != ContentEncoding::Identity {
        if let Some(enc) = encoding.as_header_value() {
            response.set_header("Content-Encoding", enc);
        }
    }
}

fn load_litefile(path: &Path) -> core::result::Result<LiteFile, u16> {
    let metadata = fs::metadata(path).map_err(|_| HTTP_NOT_FOUND)?;
    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let raw = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => HTTP_FORBIDDEN,
        std::io::ErrorKind::NotFound => HTTP_NOT_FOUND,
        _ => HTTP_INTERNAL_SERVER_ERROR,
    })?;

    Ok(LiteFile::new(raw, last_modified))
}
