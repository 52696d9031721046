use crate::cli::actions::Action;
use crate::ryanella::{self, auth::token::TokenKeys};
use anyhow::Result;
use std::sync::Arc;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            dsn,
            token_secret,
            token_ttl_hours,
        } => {
            let keys = Arc::new(TokenKeys::new(&token_secret, token_ttl_hours));

            ryanella::new(port, dsn, keys).await?;
        }
    }

    Ok(())
}
