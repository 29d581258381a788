pub mod app;
pub mod checkpoint;
pub mod commands;
pub mod config;
pub mod domain;
pub mod error;
pub mod exec;
pub mod export;
pub mod fs_util;
pub mod manifest;
pub mod ncbi;
pub mod output;
pub mod profile;
pub mod qiita;
pub mod resume;
pub mod runner;
pub mod stage;
pub mod topology;
pub mod workspace;
