pub mod dispatcher;
pub mod handler;
pub mod middleware;
#[cfg(test)]
mod tests;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherRef, Outcome};
pub use handler::router;
