pub mod jobs;
pub mod run;
pub mod serve;
pub mod task;
pub mod template;
