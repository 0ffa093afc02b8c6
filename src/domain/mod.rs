//! Core domain types and logic: feature pipeline, windowing, prediction and
//! capital simulation. Nothing in here touches the filesystem.

pub mod error;
pub mod price_bar;
pub mod indicator;
pub mod scaler;
pub mod features;
pub mod window;
pub mod predictor;
pub mod capital;
pub mod simulation;
pub mod metrics;
pub mod trial;
pub mod config_validation;
