pub mod command;
pub mod engine;
pub mod menus;
pub mod ports;
#[cfg(test)]
pub mod testing;
pub mod types;
