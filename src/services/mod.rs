// src/services/mod.rs
pub mod directory;
pub mod formation;
pub mod notification;
pub mod roster;
