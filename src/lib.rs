pub mod aligner;
pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fs_util;
pub mod grouping;
pub mod manifest;
pub mod merge;
pub mod output;
pub mod progress;
pub mod remote;
pub mod runner;
pub mod samples;
pub mod tpm;
pub mod workspace;
