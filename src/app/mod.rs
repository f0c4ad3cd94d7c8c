//! Core modules for Lambda Cloner.
//!
//! # Module Organization
//!
//! ## Lambda Integration
//! - [`credentials`] - SDK config loading (region, profile, endpoint)
//! - [`lambda_service`] - The [`lambda_service::FunctionPlatform`] seam and its AWS implementation
//! - [`waiter`] - Polling until a function settles
//! - [`sdk_errors`] - Operator hints for failed calls
//!
//! ## Clone Logic
//! - [`function_descriptor`] - Descriptor documents and settings extraction
//! - [`clone_plan`] - Overrides, create/update decision and command rendering
//! - [`cloner`] - The end-to-end flow
//!
//! ## Operator Surface
//! - [`cli`] - Command-line arguments
//! - [`config`] - Optional defaults file
//! - [`prompt`] - Overwrite confirmation
//! - [`workspace`] - Timestamped working directory

pub mod cli;
pub mod clone_plan;
pub mod cloner;
pub mod config;
pub mod credentials;
pub mod function_descriptor;
pub mod lambda_service;
pub mod prompt;
pub mod sdk_errors;
pub mod waiter;
pub mod workspace;
