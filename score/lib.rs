#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod baseline;
pub mod challenge;
pub mod clonal;
pub mod config;
pub mod io;
pub mod matrix;
pub mod metrics;
pub mod normalize;
pub mod pseudo;
pub mod telemetry;
pub mod types;
pub mod validate;
pub mod vcf;
