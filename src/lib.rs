//! Lambda Cloner - copy an AWS Lambda function under a new name
//!
//! Lambda Cloner is a one-shot operator tool. It reads a source function's
//! descriptor, downloads its deployment package and creates (or, after
//! confirmation, updates) a target function with the same configuration,
//! optionally changing runtime, memory, timeout, environment, layers, VPC
//! placement or architecture on the way.
//!
//! # Flow
//!
//! fetch source descriptor → extract settings → download code → probe target
//! → create or update → wait until stable → fetch and print target descriptor
//!
//! The orchestration lives in [`app::cloner::FunctionCloner`]; the Lambda API
//! sits behind the [`app::lambda_service::FunctionPlatform`] trait so the flow
//! can be exercised without AWS.
//!
//! # Working directory
//!
//! Each run writes its documents (source descriptor, code archive, API
//! responses, target descriptor) to a timestamped directory, see
//! [`app::workspace`].

#![warn(clippy::all, rust_2018_idioms)]

pub mod app;
