pub mod db;
pub mod models;
pub mod names;
pub mod services;
