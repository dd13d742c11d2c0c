use clap::Subcommand;
use taskquest_core::WeeklyCheck;

use super::session;

#[derive(Subcommand)]
pub enum LeagueAction {
    /// Run this week's promotion/relegation if it has not run here yet
    Check,
    /// Show the cohort leaderboard with projected standings
    Board,
}

pub async fn run(action: LeagueAction) -> Result<(), Box<dyn std::error::Error>> {
    let layer = session::open().await?;

    match action {
        LeagueAction::Check => match layer.check_weekly_transition().await? {
            WeeklyCheck::Baseline(marker) => println!("baseline recorded for {marker}"),
            WeeklyCheck::UpToDate => println!("up to date"),
            WeeklyCheck::Transitioned(outcome) => {
                println!("{}", outcome.message());
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        },
        LeagueAction::Board => {
            let board = layer.standings().await?;
            println!("{}", serde_json::to_string_pretty(&board)?);
        }
    }
    session::flush_notifications(&layer);
    Ok(())
}
