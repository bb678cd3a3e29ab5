//! Version lifecycle, cache coherency and engagement analytics for a
//! multi-author blogging platform.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

mod util;
