pub mod artifacts;
pub mod command;
pub mod file;
pub mod layout;
pub mod samples;
pub mod system;
