use std::sync::Arc;

use etude_core::logging::init_logging_for;
use etude_core::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    init_logging_for(&config.environment);
    // Re-run now that warnings have somewhere to go.
    config.validate()?;

    let users: Arc<dyn UserStore> = Arc::new(InMemoryUserStore::new());
    let app = if config.routes_manifest.is_some() {
        App::from_manifest(config, users, etude_scaffold::registry())?
    } else {
        App::with_users(config, users, etude_scaffold::routes())?
    };

    app.run().await?;
    Ok(())
}
