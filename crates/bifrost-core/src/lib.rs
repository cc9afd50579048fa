pub mod config;
pub mod hashing;
pub mod preview;
pub mod text;
