pub mod app_init;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod dispatcher;
pub mod domain;
pub mod event;
pub mod id;
pub mod logging;
pub mod result;
pub mod session;

pub use event::{HubbyEvent, PollResult};
pub use session::{Session, SessionBuilder};
