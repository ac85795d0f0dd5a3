//! FAIRWAY — Golf Prediction Market Edge Scanner
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod matching;
pub mod feeds;
pub mod strategy;
pub mod evaluator;
pub mod ledger;
pub mod engine;
pub mod alerts;
pub mod storage;
pub mod dashboard;
