pub mod fetcher;
pub mod http;
pub mod record;
