pub mod logger;
pub mod message;
