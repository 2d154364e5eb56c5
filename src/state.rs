use crate::pipeline::Pipeline;
use crate::scheduler::Scheduler;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<Scheduler>,
}
