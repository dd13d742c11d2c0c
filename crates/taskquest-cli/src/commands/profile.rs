use clap::Subcommand;
use serde_json::json;

use super::session;

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Start a session: create or load the profile and advance the streak
    Load,
    /// Show the profile as JSON
    Show,
}

pub async fn run(action: ProfileAction) -> Result<(), Box<dyn std::error::Error>> {
    let layer = session::open().await?;
    let Some(profile) = layer.profile() else {
        return Err("profile not loaded".into());
    };

    match action {
        ProfileAction::Load => {
            println!(
                "{}: {} league, {} XP, {}-day streak",
                profile.id, profile.league, profile.xp, profile.streak
            );
            if !layer.streak_committed() {
                eprintln!("streak update not saved yet; it will be retried");
            }
        }
        ProfileAction::Show => {
            let out = json!({
                "profile": profile,
                "total_points": layer.total_points(),
                "streak_committed": layer.streak_committed(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    session::flush_notifications(&layer);
    Ok(())
}
