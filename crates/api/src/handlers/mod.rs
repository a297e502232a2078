pub mod admin;
pub mod analytics;
pub mod assessment;
pub mod auth;
pub mod chapter_practice;
pub mod daily_quiz;
pub mod jobs;
pub mod mock_tests;
pub mod snap_practice;
pub mod subscriptions;
pub mod support;
pub mod unlock_quiz;
