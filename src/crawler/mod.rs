pub mod fetcher;
pub mod parser;
pub mod robots;
pub mod worker;

pub use fetcher::{FetchResponse, Fetcher};
pub use parser::{ParsedPage, Parser};
pub use robots::RobotsChecker;
pub use worker::CrawlWorker;
