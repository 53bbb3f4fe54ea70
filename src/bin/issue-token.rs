use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use uuid::Uuid;

use jwt_guard::app;
use jwt_guard::config::Config;
use jwt_guard::services::auth::PersonalAccessTokenFactory;

/// Issue a personal access token from the command line.
///
/// Uses the same configuration as the server (.env / environment), so the
/// token verifies against it and, with DATABASE_URL set, is stored for
/// revocation. Handy for bootstrapping the first `tokens:write` token.
#[derive(Parser, Debug)]
#[command(name = "issue-token", version, about)]
struct Args {
    /// Subject (user id, UUID). Default: random.
    #[arg(long)]
    subject: Option<Uuid>,

    /// Label written to the issuance log.
    #[arg(long, default_value = "cli")]
    name: String,

    /// Granted scope; repeat for several. `*` grants everything.
    #[arg(long = "scope", default_value = "*")]
    scopes: Vec<String>,

    /// Print the token claims as JSON instead of the bare token.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;

    let tokens = Arc::new(app::token_manager(&config)?);
    let repository = app::token_repository(&config).await?;
    let factory = PersonalAccessTokenFactory::new(tokens, repository);

    let subject = args.subject.unwrap_or_else(Uuid::new_v4).to_string();
    let issued = factory.make(&subject, &args.name, args.scopes).await?;

    if args.json {
        let out = serde_json::json!({
            "access_token": issued.plain_text_token,
            "token_type": "Bearer",
            "sub": subject,
            "jti": issued.access_token.jti,
            "scopes": issued.access_token.scopes,
            "expires_at": issued.access_token.expires_at,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", issued.plain_text_token);
    }
    Ok(())
}
