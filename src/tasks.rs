use poise::serenity_prelude::Context;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info};

/// A periodic background job. `schedule` returning `None` ends the loop.
#[async_trait::async_trait]
pub trait Task: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    fn schedule(&self) -> Option<Duration>;
    async fn execute(
        &mut self,
        ctx: &Context,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Mutex<Vec<Box<dyn Task>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_task(&self, task: impl Task + 'static) {
        self.tasks.lock().await.push(Box::new(task));
    }

    /// Spawn every registered task on its own interval loop. Task failures
    /// are logged and the loop keeps going.
    pub async fn start_tasks(&self, ctx: Context) {
        let mut tasks = self.tasks.lock().await;

        for mut task in tasks.drain(..) {
            let ctx = ctx.clone();
            info!("Starting background task {}", task.name());

            tokio::spawn(async move {
                while let Some(interval) = task.schedule() {
                    if let Err(e) = task.execute(&ctx).await {
                        error!("Task {} failed: {}", task.name(), e);
                    }
                    tokio::time::sleep(interval).await;
                }
            });
        }
    }
}
