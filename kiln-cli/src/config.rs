//! CLI configuration

/// Configuration shared by all commands
pub struct Config {
    /// Base URL of the Kiln server
    pub server_url: String,
}
