pub mod check;
pub mod dump_config;
