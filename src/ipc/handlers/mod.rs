pub mod analytics;
pub mod core;
pub mod feedback;
pub mod forms;
