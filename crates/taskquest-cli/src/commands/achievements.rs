use serde_json::json;

use super::session;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let layer = session::open().await?;
    let statuses: Vec<_> = layer
        .achievements()
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "title": s.id.title(),
                "description": s.id.description(),
                "unlocked": s.unlocked,
                "count": s.count,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&statuses)?);
    session::flush_notifications(&layer);
    Ok(())
}
