pub mod auth;
pub mod certificates;
pub mod core;
pub mod exam_results;
pub mod input;
pub mod notes;
pub mod reports;
pub mod students;
