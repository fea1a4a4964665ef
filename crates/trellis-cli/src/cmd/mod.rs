pub mod config;
pub mod init;
pub mod issue;
pub mod project;
pub mod roadmap;
pub mod template;
