//! Compat wrappers over ``burn::nn`` layer families.
pub mod normalization_wrapper;
