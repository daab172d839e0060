use std::time::Duration;

use env_flags::env_flags;

env_flags! {
    pub VISCHAT_DEFAULT_MODEL: &str = "gpt-4o-mini";
    pub VISCHAT_API_BASE: &str = "https://api.openai.com/v1";

    /// Name of the environment variable holding the bearer token.
    pub VISCHAT_API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub VISCHAT_REQUEST_MAX_RETRIES: u64 = 2;
    pub VISCHAT_REQUEST_TIMEOUT_MS: Duration = Duration::from_millis(120_000), |value| {
        value.parse().map(Duration::from_millis)
    };
}
