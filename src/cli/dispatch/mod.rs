use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        base_origin: matches
            .get_one("base-origin")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --base-origin"))?,
        auth_base_path: matches
            .get_one("auth-base-path")
            .map_or_else(|| "/v1/auth".to_string(), |s: &String| s.to_string()),
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .unwrap_or(2_592_000),
        session_sliding: matches.get_flag("session-sliding"),
        min_password_length: matches
            .get_one::<usize>("min-password-length")
            .copied()
            .unwrap_or(8),
        max_password_length: matches
            .get_one::<usize>("max-password-length")
            .copied()
            .unwrap_or(128),
        email_token_ttl_seconds: matches
            .get_one::<i64>("email-token-ttl-seconds")
            .copied()
            .unwrap_or(1800),
    })
}
