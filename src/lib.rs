// src/lib.rs

pub mod config;
pub mod db;
pub mod evaluate;
pub mod frame;
pub mod model;
pub mod preprocess;
pub mod session;
pub mod train;
