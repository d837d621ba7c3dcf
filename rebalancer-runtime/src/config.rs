//! Process configuration read from the environment (and an optional
//! portfolio TOML file).
//!
//! Env vars:
//! - `PRIVATE_KEY` (required): hex signing key; the wallet address is derived from it
//! - `RISK_API_KEY` (required): shared secret for the risk service and inbound webhooks
//! - `RISK_API_URL`: risk service base URL (default: `http://localhost:3999`)
//! - `RPC_URL`: chain JSON-RPC endpoint (default: Arbitrum One public RPC)
//! - `SERVER_ORIGIN`: public origin the webhook callback URL is resolved against
//! - `PORT`: HTTP listen port (default: `3000`)
//! - `SETTLEMENT_DELAY_MS`: pause after each pool action (default: `6000`)
//! - `BOOTSTRAP_MAX_ATTEMPTS`, `BOOTSTRAP_INITIAL_DELAY_MS`, `BOOTSTRAP_BACKOFF_FACTOR`
//! - `PORTFOLIO_CONFIG`: path to a TOML file holding the portfolio spec

use std::collections::HashMap;
use std::time::Duration;

use crate::error::RebalancerError;
use crate::retry::RetryPolicy;
use crate::types::PortfolioSpec;

pub const DEFAULT_RISK_API_URL: &str = "http://localhost:3999";
pub const DEFAULT_RPC_URL: &str = "https://arb1.arbitrum.io/rpc";
pub const DEFAULT_SERVER_ORIGIN: &str = "https://risk-api-client.vercel.app";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_secs(6);
pub const WEBHOOK_PATH: &str = "/webhook-target";

#[derive(Debug, Clone)]
pub struct RebalancerConfig {
    pub private_key: String,
    pub risk_api_key: String,
    pub risk_api_url: String,
    pub rpc_url: String,
    pub server_origin: String,
    pub port: u16,
    pub settlement_delay: Duration,
    pub bootstrap_retry: RetryPolicy,
    pub portfolio: PortfolioSpec,
}

impl RebalancerConfig {
    pub fn from_env() -> Result<Self, RebalancerError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map. Required secrets are checked
    /// before anything else is parsed.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, RebalancerError> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let mut missing = Vec::new();
        for key in ["PRIVATE_KEY", "RISK_API_KEY"] {
            if get(key).is_none() {
                missing.push(key);
            }
        }
        if !missing.is_empty() {
            return Err(RebalancerError::ConfigError(format!(
                "Missing required environment variable: {}",
                missing.join(", ")
            )));
        }

        let parse_num = |key: &str, default: u64| -> Result<u64, RebalancerError> {
            match get(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map_err(|e| RebalancerError::ConfigError(format!("Invalid {key}: {e}"))),
                None => Ok(default),
            }
        };

        let port = u16::try_from(parse_num("PORT", DEFAULT_PORT as u64)?)
            .map_err(|e| RebalancerError::ConfigError(format!("Invalid PORT: {e}")))?;

        let parse_u32 = |key: &str, default: u32| -> Result<u32, RebalancerError> {
            u32::try_from(parse_num(key, default as u64)?)
                .map_err(|e| RebalancerError::ConfigError(format!("Invalid {key}: {e}")))
        };

        let bootstrap_retry = RetryPolicy::new(
            parse_u32("BOOTSTRAP_MAX_ATTEMPTS", 5)?,
            Duration::from_millis(parse_num("BOOTSTRAP_INITIAL_DELAY_MS", 1000)?),
            parse_u32("BOOTSTRAP_BACKOFF_FACTOR", 2)?,
        );

        let portfolio = match get("PORTFOLIO_CONFIG") {
            Some(path) => load_portfolio_spec(path)?,
            None => PortfolioSpec::default(),
        };

        Ok(Self {
            private_key: get("PRIVATE_KEY").unwrap_or_default().to_string(),
            risk_api_key: get("RISK_API_KEY").unwrap_or_default().to_string(),
            risk_api_url: get("RISK_API_URL")
                .unwrap_or(DEFAULT_RISK_API_URL)
                .trim_end_matches('/')
                .to_string(),
            rpc_url: get("RPC_URL").unwrap_or(DEFAULT_RPC_URL).to_string(),
            server_origin: get("SERVER_ORIGIN")
                .unwrap_or(DEFAULT_SERVER_ORIGIN)
                .to_string(),
            port,
            settlement_delay: Duration::from_millis(parse_num(
                "SETTLEMENT_DELAY_MS",
                DEFAULT_SETTLEMENT_DELAY.as_millis() as u64,
            )?),
            bootstrap_retry,
            portfolio,
        })
    }

    /// Callback URL the risk service should deliver rebalance events to.
    pub fn webhook_url(&self) -> Result<String, RebalancerError> {
        resolve_webhook_url(&self.server_origin)
    }
}

/// Resolve the webhook path against a server origin.
pub fn resolve_webhook_url(origin: &str) -> Result<String, RebalancerError> {
    let base: url::Url = origin
        .parse()
        .map_err(|e| RebalancerError::ConfigError(format!("Invalid SERVER_ORIGIN: {e}")))?;
    base.join(WEBHOOK_PATH)
        .map(|u| u.to_string())
        .map_err(|e| RebalancerError::ConfigError(format!("Invalid webhook URL: {e}")))
}

/// Load a portfolio spec from a TOML file. Any wallet address in the file is ignored.
pub fn load_portfolio_spec(path: &str) -> Result<PortfolioSpec, RebalancerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RebalancerError::ConfigError(format!("Cannot read {path}: {e}")))?;
    parse_portfolio_spec(&content)
}

pub fn parse_portfolio_spec(content: &str) -> Result<PortfolioSpec, RebalancerError> {
    let spec: PortfolioSpec = toml::from_str(content)
        .map_err(|e| RebalancerError::ConfigError(format!("Invalid portfolio config: {e}")))?;
    if spec.min_num_positions > spec.max_num_positions {
        return Err(RebalancerError::ConfigError(format!(
            "min_num_positions ({}) exceeds max_num_positions ({})",
            spec.min_num_positions, spec.max_num_positions
        )));
    }
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    const PORTFOLIO_TOML: &str = r#"
portfolio_id = "alt-portfolio"
org_id = "acme"
name = "Alt"
chain_id = 8453
max_risk_score = 2.5
rebalance_frequency_hours = 4
min_num_positions = 2
max_num_positions = 5
initial_amount_in_usd = 250
wallet_addr = "0x0000000000000000000000000000000000000bad"
main_asset_addr = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
"#;

    #[test]
    fn test_missing_secrets() {
        let err = RebalancerConfig::from_vars(vars(&[])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("PRIVATE_KEY"));
        assert!(msg.contains("RISK_API_KEY"));

        let err = RebalancerConfig::from_vars(vars(&[("PRIVATE_KEY", TEST_KEY)])).unwrap_err();
        assert!(matches!(err, RebalancerError::ConfigError(m) if m.contains("RISK_API_KEY")));
    }

    #[test]
    fn test_defaults() {
        let cfg = RebalancerConfig::from_vars(vars(&[
            ("PRIVATE_KEY", TEST_KEY),
            ("RISK_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(cfg.risk_api_url, DEFAULT_RISK_API_URL);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.settlement_delay, DEFAULT_SETTLEMENT_DELAY);
        assert_eq!(cfg.bootstrap_retry, RetryPolicy::default());
        assert_eq!(cfg.portfolio, PortfolioSpec::default());
        assert_eq!(
            cfg.webhook_url().unwrap(),
            "https://risk-api-client.vercel.app/webhook-target"
        );
    }

    #[test]
    fn test_overrides() {
        let cfg = RebalancerConfig::from_vars(vars(&[
            ("PRIVATE_KEY", TEST_KEY),
            ("RISK_API_KEY", "secret"),
            ("RISK_API_URL", "https://risk.example.com/"),
            ("PORT", "8080"),
            ("SETTLEMENT_DELAY_MS", "0"),
            ("BOOTSTRAP_MAX_ATTEMPTS", "3"),
        ]))
        .unwrap();

        assert_eq!(cfg.risk_api_url, "https://risk.example.com");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.settlement_delay, Duration::ZERO);
        assert_eq!(cfg.bootstrap_retry.max_attempts, 3);
    }

    #[test]
    fn test_invalid_port() {
        let err = RebalancerConfig::from_vars(vars(&[
            ("PRIVATE_KEY", TEST_KEY),
            ("RISK_API_KEY", "secret"),
            ("PORT", "99999"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RebalancerError::ConfigError(_)));
    }

    #[test]
    fn test_out_of_range_retry_settings_rejected() {
        for (key, value) in [
            ("BOOTSTRAP_MAX_ATTEMPTS", "4294967296"),
            ("BOOTSTRAP_BACKOFF_FACTOR", "5000000000"),
            ("BOOTSTRAP_BACKOFF_FACTOR", "1.5"),
        ] {
            let err = RebalancerConfig::from_vars(vars(&[
                ("PRIVATE_KEY", TEST_KEY),
                ("RISK_API_KEY", "secret"),
                (key, value),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, RebalancerError::ConfigError(ref m) if m.contains(key)),
                "{key}={value} gave {err}"
            );
        }
    }

    #[test]
    fn test_webhook_url_with_path_origin() {
        assert_eq!(
            resolve_webhook_url("http://localhost:3000/ignored").unwrap(),
            "http://localhost:3000/webhook-target"
        );
        assert!(resolve_webhook_url("nope").is_err());
    }

    #[test]
    fn test_parse_portfolio_spec_ignores_wallet() {
        let spec = parse_portfolio_spec(PORTFOLIO_TOML).unwrap();
        assert_eq!(spec.portfolio_id, "alt-portfolio");
        assert_eq!(spec.chain_id, 8453);
        assert_eq!(spec.max_risk_score, Decimal::new(25, 1));
        assert_eq!(spec.initial_amount_usd, Decimal::new(250, 0));
        assert!(spec.wallet_addr.is_none());
    }

    #[test]
    fn test_parse_portfolio_spec_rejects_inverted_bounds() {
        let content = PORTFOLIO_TOML.replace("min_num_positions = 2", "min_num_positions = 9");
        assert!(parse_portfolio_spec(&content).is_err());
    }

    #[test]
    fn test_portfolio_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PORTFOLIO_TOML.as_bytes()).unwrap();

        let cfg = RebalancerConfig::from_vars(vars(&[
            ("PRIVATE_KEY", TEST_KEY),
            ("RISK_API_KEY", "secret"),
            ("PORTFOLIO_CONFIG", file.path().to_str().unwrap()),
        ]))
        .unwrap();
        assert_eq!(cfg.portfolio.org_id, "acme");
    }
}
