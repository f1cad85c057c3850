//! Connect, disconnect and reconnect notification hooks

use crate::connection::{ConsumerId, Reconnect};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub(crate) type Hook<A> = Arc<dyn Fn(A) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registered hooks. Cloned out of the hub's lock before being awaited.
pub(crate) struct Hooks<C: ConsumerId> {
    pub(crate) connect: Option<Hook<C>>,
    pub(crate) disconnect: Option<Hook<C>>,
    pub(crate) reconnect: Option<Hook<Reconnect<C>>>,
}

impl<C: ConsumerId> Default for Hooks<C> {
    fn default() -> Self {
        Self {
            connect: None,
            disconnect: None,
            reconnect: None,
        }
    }
}

impl<C: ConsumerId> Clone for Hooks<C> {
    fn clone(&self) -> Self {
        Self {
            connect: self.connect.clone(),
            disconnect: self.disconnect.clone(),
            reconnect: self.reconnect.clone(),
        }
    }
}

/// Box an async closure into a [`Hook`]
pub(crate) fn hook<A, F, Fut>(f: F) -> Hook<A>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |arg| f(arg).boxed())
}

/// Await a hook, containing any panic it raises
pub(crate) async fn run<C: ConsumerId>(name: &'static str, cid: &C, fut: BoxFuture<'static, ()>) {
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
        tracing::error!(cid = ?cid, hook = name, "Hook panicked");
    }
}
