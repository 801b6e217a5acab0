mod handler;
mod server;
mod upstream;

pub use handler::*;
pub use server::*;
pub use upstream::HttpFetcher;
