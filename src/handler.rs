/// A cached, non-static handler. CGI scripts are deliberately excluded: the
/// loader re-runs them on every request, so they are never published here
/// (see `cgi.rs`).
///
/// No templating engine exists anywhere in this codebase's dependency
/// stack, so `Template` is a pragmatic raw-bytes passthrough of the sibling
/// `.mako` file rather than real variable interpolation.
#[derive(Debug, Clone)]
pub enum HandlerModule {
    Template(Vec<u8>),
}

impl HandlerModule {
    pub fn size(&self) -> usize {
        match self {
            HandlerModule::Template(bytes) => bytes.len(),
        }
    }
}
