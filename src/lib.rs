//! Blogline - a blogging backend
//!
//! Accounts with JWT sessions, blog posts with tags, like/dislike reactions,
//! view counting, filtering, title search and AI writing suggestions.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
