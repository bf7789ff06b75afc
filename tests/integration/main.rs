//! Integration tests driving the library through its public API

mod http_cycle;
mod scrape_cycle;
mod storage_retention;
