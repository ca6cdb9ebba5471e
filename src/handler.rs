#![allow(non_snake_case)]

//! Request handler traits and type erasure.
//!
//! A handler is an async function selected by the router for a matched
//! route. Handlers declare their inputs as extractor arguments (path
//! params, JSON bodies, the application context, ...) and return any
//! [`Responder`]. Registration takes the function together with its typed
//! argument descriptor, so argument binding is resolved at compile time
//! instead of by runtime signature inspection.
//!
//! Binding runs in a single pass: every declared extractor is driven
//! against the request in order, the results are gathered into one
//! `Result` tuple, and the first rejection short-circuits into its error
//! response without invoking the function.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{
    extractors::FromRequest,
    responder::Responder,
    types::{Request, Response},
};

/// Trait for asynchronous HTTP request handlers.
///
/// Implemented for async functions and closures taking zero or more
/// extractor arguments, or a bare [`Request`], and returning a
/// [`Responder`]. The `Args` parameter is the argument descriptor that
/// selects the matching impl.
pub trait Handler<Args>: Clone + Send + Sync + 'static {
    /// Binds the arguments from `req` and runs the handler.
    fn invoke(self, req: Request) -> BoxFuture<'static, Response>;
}

/// Type-erased handler stored in the route trie.
#[derive(Clone)]
pub struct BoxHandler {
    f: Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>,
}

impl BoxHandler {
    /// Erases a handler behind a shared dispatch function.
    pub(crate) fn from_handler<H, Args>(handler: H) -> Self
    where
        H: Handler<Args>,
    {
        Self {
            f: Arc::new(move |req| handler.clone().invoke(req)),
        }
    }

    /// Runs the erased handler for one request.
    pub(crate) fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        (self.f)(req)
    }
}

// Zero-argument handlers: `async fn handler() -> impl Responder`.
impl<F, Fut, R> Handler<()> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder,
{
    fn invoke(self, _req: Request) -> BoxFuture<'static, Response> {
        Box::pin(async move { self().await.into_response() })
    }
}

// Whole-request handlers: `async fn handler(req: Request) -> impl Responder`.
impl<F, Fut, R> Handler<(Request,)> for F
where
    F: FnOnce(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Responder,
{
    fn invoke(self, req: Request) -> BoxFuture<'static, Response> {
        Box::pin(async move { self(req).await.into_response() })
    }
}

// Extractor-argument handlers. Each declared argument is bound through
// `FromRequest`; the bound tuple is produced once, and a failed extraction
// becomes the response without the handler running.
macro_rules! tuple_handler {
    ($($arg:ident),+ $(,)?) => {
        impl<F, Fut, R, $($arg,)+> Handler<($($arg,)+)> for F
        where
            F: FnOnce($($arg),+) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = R> + Send + 'static,
            R: Responder,
            $($arg: FromRequest + Send + 'static,)+
        {
            fn invoke(self, mut req: Request) -> BoxFuture<'static, Response> {
                Box::pin(async move {
                    let bound = async {
                        Ok::<_, Response>(($(
                            $arg::from_request(&mut req)
                                .await
                                .map_err(Responder::into_response)?,
                        )+))
                    }
                    .await;
                    match bound {
                        Ok(($($arg,)+)) => self($($arg),+).await.into_response(),
                        Err(rejection) => rejection,
                    }
                })
            }
        }
    };
}

tuple_handler!(A1);
tuple_handler!(A1, A2);
tuple_handler!(A1, A2, A3);
tuple_handler!(A1, A2, A3, A4);
tuple_handler!(A1, A2, A3, A4, A5);
tuple_handler!(A1, A2, A3, A4, A5, A6);
tuple_handler!(A1, A2, A3, A4, A5, A6, A7);
tuple_handler!(A1, A2, A3, A4, A5, A6, A7, A8);
