#![deny(dead_code)]
#![deny(unused_imports)]

pub mod artifact;
pub mod config;
pub mod data;
pub mod describe;
pub mod estimate;
pub mod evaluate;
pub mod model;
pub mod outliers;
pub mod pipeline;
pub mod predict;
pub mod split;
pub mod standardize;
pub mod vif;
