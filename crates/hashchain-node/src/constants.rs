pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_LOG_FILTER: &str = "info";
pub(crate) const INVALID_CHAIN_DETAIL: &str = "The blockchain is invalid";
pub(crate) const VALID_CHAIN_MESSAGE: &str = "The blockchain is valid.";
