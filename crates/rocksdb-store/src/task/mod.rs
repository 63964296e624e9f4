pub mod db;
pub mod schemas;
