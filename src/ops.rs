pub mod controller;
pub mod directory;
pub mod store;
