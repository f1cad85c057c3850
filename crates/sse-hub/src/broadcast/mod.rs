//! Event broadcasting
//!
//! Fan-out of submitted events to the consumers they address.

mod dispatcher;

pub(crate) use dispatcher::{Command, Dispatcher};
