//! Builders to construct optimizer components from configuration.

pub mod optimizer_builder;

pub use optimizer_builder::OptimizerBuilder;
