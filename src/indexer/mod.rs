pub mod worker;

pub use worker::IndexWorker;
