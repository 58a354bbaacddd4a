//! Interactive command-line shell built on [`ChatClient`](crate::ChatClient).

mod formatter;
mod session;
mod ui;

pub use session::{SessionOptions, run_session};
