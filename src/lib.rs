pub mod app;
pub mod bruteforcer;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod detector;
pub mod http;
pub mod membership;
pub mod output;
pub mod runner;
pub mod stop;
pub mod utils;

#[cfg(test)]
mod tests;
