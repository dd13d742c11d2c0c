//! Task management commands for CLI.

use clap::Subcommand;
use std::path::PathBuf;
use taskquest_core::TaskOutcome;

use super::session;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task title
        title: String,
    },
    /// List tasks, newest first
    List,
    /// Rename a task
    Edit {
        /// Task ID
        id: String,
        /// New title
        title: String,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
    /// Complete a task, optionally uploading a proof image
    Complete {
        /// Task ID
        id: String,
        /// Image file attached as completion proof
        #[arg(long)]
        proof: Option<PathBuf>,
    },
    /// Complete an open task or reopen a completed one
    Toggle {
        /// Task ID
        id: String,
    },
}

fn describe(outcome: TaskOutcome) -> String {
    match outcome {
        TaskOutcome::Awarded { xp } => format!("completed (+{xp} XP)"),
        TaskOutcome::ProofAttached => "proof attached".to_string(),
        TaskOutcome::Unchanged => "already completed".to_string(),
        TaskOutcome::Reverted { xp } => format!("reopened (-{xp} XP)"),
    }
}

pub async fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let layer = session::open().await?;

    match action {
        TaskAction::Add { title } => {
            let task = layer.add_task(&title).await?;
            println!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List => {
            println!("{}", serde_json::to_string_pretty(&layer.tasks())?);
        }
        TaskAction::Edit { id, title } => {
            layer.edit_task(&id, &title).await?;
            println!("Task updated: {id}");
        }
        TaskAction::Delete { id } => {
            layer.delete_task(&id).await?;
            println!("Task deleted: {id}");
        }
        TaskAction::Complete { id, proof } => {
            let outcome = match proof {
                Some(path) => {
                    let (bytes, ext) = session::read_image(&path)?;
                    layer.complete_task_with_upload(&id, bytes, &ext).await?
                }
                None => layer.complete_task(&id, None).await?,
            };
            println!("Task {id}: {}", describe(outcome));
        }
        TaskAction::Toggle { id } => {
            let outcome = layer.toggle_task(&id).await?;
            println!("Task {id}: {}", describe(outcome));
        }
    }
    session::flush_notifications(&layer);
    Ok(())
}
