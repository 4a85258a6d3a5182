pub mod arg_parser;
pub mod command_runner;
pub mod controller;
pub mod errors;
pub mod logger;
pub mod privilege;
