//! # Complete Model Families

pub mod resnetv1b;
