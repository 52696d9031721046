pub mod cli;
pub mod ryanella;
