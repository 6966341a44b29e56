pub mod jobs;
pub mod repos;
pub mod tasks;
