//! Integration tests combining multiple components
//!
//! These tests verify interactions between the engine, its cache tiers and
//! the scheduler with real implementations.

mod config_reload;
mod invalidation;
mod persistence;
mod scheduling;
mod suspension;
mod textures;
