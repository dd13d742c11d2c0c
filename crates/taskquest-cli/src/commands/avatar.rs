use clap::Subcommand;
use std::path::PathBuf;

use super::session;

#[derive(Subcommand)]
pub enum AvatarAction {
    /// Upload a new profile picture
    Set {
        /// Image file
        file: PathBuf,
    },
}

pub async fn run(action: AvatarAction) -> Result<(), Box<dyn std::error::Error>> {
    let layer = session::open().await?;
    match action {
        AvatarAction::Set { file } => {
            let (bytes, ext) = session::read_image(&file)?;
            let url = layer.set_avatar(bytes, &ext).await?;
            println!("{url}");
        }
    }
    session::flush_notifications(&layer);
    Ok(())
}
