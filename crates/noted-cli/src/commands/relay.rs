use super::{App, CmdResult};

pub async fn categories() -> CmdResult {
    let app = App::open()?;
    let categories = app.relay.categories().await?;
    for name in &categories.categories {
        match categories.descriptions.get(name) {
            Some(description) => println!("{name:<20} {description}"),
            None => println!("{name}"),
        }
    }
    Ok(())
}

pub async fn health() -> CmdResult {
    let app = App::open()?;
    let health = app.relay.health().await?;
    println!("relay:  {}", app.relay.base_url());
    println!("status: {}", health.status);
    println!("users:  {}", health.total_users);
    Ok(())
}
