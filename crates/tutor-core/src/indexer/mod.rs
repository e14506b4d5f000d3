pub mod filesystem;
pub mod imports;
pub mod metrics;
pub mod parser;
pub mod patterns;
pub mod pipeline;
pub mod symbols;
