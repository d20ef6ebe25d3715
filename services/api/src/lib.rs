pub mod adapters;
pub mod config;
pub mod error;
pub mod report_html;
pub mod web;
