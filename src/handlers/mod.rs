pub mod access;
pub mod update;
pub mod webhook;
