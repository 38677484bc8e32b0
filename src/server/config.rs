// Server configuration

#[derive(Clone)]
pub struct ServerConfig {
    pub version: String,
    /// Allow cross-origin requests from any origin
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: crate::constants::VERSION.to_string(),
            enable_cors: true,
        }
    }
}
