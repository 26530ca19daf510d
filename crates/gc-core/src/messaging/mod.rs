pub mod port;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use port::MessagingPort;
