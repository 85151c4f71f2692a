#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod capture;
pub mod config;
pub mod report;
pub mod sense;
