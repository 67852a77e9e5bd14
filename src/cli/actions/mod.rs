pub mod server;

/// What the CLI resolved to after parsing arguments.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        base_origin: String,
        auth_base_path: String,
        session_ttl_seconds: i64,
        session_sliding: bool,
        min_password_length: usize,
        max_password_length: usize,
        email_token_ttl_seconds: i64,
    },
}
