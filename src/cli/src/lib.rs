//! imgmigrate CLI - replicate multi-platform container images.

pub mod commands;
pub mod output;
