//! Blocking and async clients, both driving the same [`Session`](crate::session::Session).

mod asynchronous;
mod blocking;

pub use self::{asynchronous::AsyncClient, blocking::Client};
