pub mod ack;
pub mod batch;
pub mod compression_config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod manager;

#[cfg(test)]
pub mod tests;
