pub mod dto;
pub mod fusion;
pub mod handlers;
pub mod server;
pub mod session;

pub use server::{build_router, serve, Application, EntityServices, ServeOptions};
