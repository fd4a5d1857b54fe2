use cadence_core::engine::Engine;

use crate::views::table::display_jobs;

pub fn list_jobs(engine: &Engine) {
    display_jobs(&engine.job_specs());
}
