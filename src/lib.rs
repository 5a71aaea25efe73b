pub mod api;
pub mod config;
pub mod link_code;
pub mod link_repo;
pub mod link_service;
pub mod orm;
pub mod routes;
pub mod web;
