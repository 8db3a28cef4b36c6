//! Request handler module
//!
//! A [`Handler`] takes a request and writes its response into a
//! [`ResponseSink`]. Handlers nest: the interceptors in [`redirect`] and
//! [`compress`] wrap an inner handler and decorate the sink it writes to,
//! and [`static_files`] is the innermost file server.

pub mod compress;
pub mod redirect;
pub mod router;
pub mod sink;
pub mod static_files;

use hyper::Request;
use std::borrow::Cow;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

pub use compress::Compress;
pub use redirect::{NotFoundRedirect, ProtectedPaths, RedirectTarget};
pub use router::handle_request;
pub use sink::{BufferedResponse, ResponseSink};
pub use static_files::FileServer;

/// Future returned by [`Handler::serve`]
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = io::Result<()>> + Send + 'a>>;

/// A unit that accepts a request and writes a response
pub trait Handler: Send + Sync {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a>;
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        (**self).serve(req, sink)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        (**self).serve(req, sink)
    }
}

/// Handler backed by a synchronous closure, see [`handler_fn`]
pub struct HandlerFn<F> {
    f: F,
}

/// Build a handler from a closure that writes straight into the sink
pub const fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Request<()>, &mut dyn ResponseSink) -> io::Result<()> + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Request<()>, &mut dyn ResponseSink) -> io::Result<()> + Send + Sync,
{
    fn serve<'a>(
        &'a self,
        req: &'a Request<()>,
        sink: &'a mut dyn ResponseSink,
    ) -> HandlerFuture<'a> {
        let result = (self.f)(req, sink);
        Box::pin(std::future::ready(result))
    }
}

/// Percent-decoded request path, the form used for matching and file lookup.
///
/// Kept as raw bytes: a decoded path need not be UTF-8, and file names on
/// disk need not be either.
pub fn request_path(req: &Request<()>) -> Cow<'_, [u8]> {
    percent_encoding::percent_decode_str(req.uri().path()).into()
}
