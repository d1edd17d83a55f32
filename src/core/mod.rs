mod auth;
mod command;
mod dispatcher;
mod pipeline;
mod session;
mod timer;
mod watch;
mod worker;

pub(crate) use auth::*;
pub(crate) use command::*;
pub(crate) use dispatcher::*;
pub(crate) use pipeline::*;
pub(crate) use session::*;
pub(crate) use timer::*;
pub(crate) use watch::*;
pub(crate) use worker::*;
