pub mod config;
pub mod db;
pub mod hub;
pub mod web;
