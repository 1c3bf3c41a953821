//! accredit-core — marks workflow and attainment calculation engine.
//!
//! This crate defines the data model, repository traits, the internal-mark
//! workflow engine, and the pure calculators (final marks, SGPA/CGPA, CO and
//! PO attainment) that the rest of the accredit system builds on.

pub mod attainment;
pub mod batch;
pub mod engine;
pub mod error;
pub mod final_mark;
pub mod gpa;
pub mod grading;
pub mod model;
pub mod parser;
pub mod report;
pub mod results;
pub mod traits;
pub mod validator;
pub mod workflow;
