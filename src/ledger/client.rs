use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::command::CommandRunner;
use crate::config::LedgerConfig;
use crate::error::Result;
use crate::ledger::task::{TaskDetails, TaskStatus};

/// Access to the coordinating contract.
///
/// Both operations return the raw reply text of the ledger client;
/// interpreting it is left to the caller.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Read-only view call.
    async fn query(&self, function: &str, args: &[String]) -> Result<String>;

    /// Signed state-changing transaction.
    async fn call(&self, function: &str, args: &[String]) -> Result<String>;

    async fn task_status(&self, task_id: u64) -> Result<TaskStatus> {
        let reply = self.query("getTaskStatus", &[task_id.to_string()]).await?;
        Ok(TaskStatus::from_query_reply(&reply))
    }

    async fn task_details(&self, task_id: u64) -> Result<TaskDetails> {
        let reply = self.query("getTask", &[task_id.to_string()]).await?;
        TaskDetails::from_query_reply(&reply)
    }
}

/// [`LedgerClient`] backed by the `mxpy` command line tool.
pub struct MxpyLedger {
    config: LedgerConfig,
    runner: Arc<dyn CommandRunner>,
}

impl MxpyLedger {
    pub fn new(config: LedgerConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn query_args(&self, function: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            "contract".to_string(),
            "query".to_string(),
            self.config.contract.clone(),
            format!("--function={}", function),
        ];
        if !args.is_empty() {
            argv.push("--arguments".to_string());
            argv.extend(args.iter().cloned());
        }
        argv.push(format!("--proxy={}", self.config.proxy));
        argv
    }

    pub fn call_args(&self, function: &str, args: &[String]) -> Vec<String> {
        let mut argv = vec![
            "contract".to_string(),
            "call".to_string(),
            self.config.contract.clone(),
            format!("--pem={}", self.config.wallet.display()),
            format!("--gas-limit={}", self.config.gas_limit),
            format!("--function={}", function),
        ];
        if !args.is_empty() {
            argv.push("--arguments".to_string());
            argv.extend(args.iter().cloned());
        }
        argv.push(format!("--proxy={}", self.config.proxy));
        argv.push(format!("--chain={}", self.config.chain));
        argv.push("--send".to_string());
        argv
    }
}

#[async_trait]
impl LedgerClient for MxpyLedger {
    async fn query(&self, function: &str, args: &[String]) -> Result<String> {
        let argv = self.query_args(function, args);
        let output = self.runner.run(&self.config.cli, &argv).await?;
        Ok(output.stdout)
    }

    async fn call(&self, function: &str, args: &[String]) -> Result<String> {
        tracing::debug!(function, contract = %self.config.contract, "Sending transaction");
        let argv = self.call_args(function, args);
        let output = self.runner.run(&self.config.cli, &argv).await?;
        Ok(output.stdout)
    }
}

const TX_HASH_KEYS: [&str; 3] = ["emittedTransactionHash", "txHash", "hash"];

/// Pull the transaction reference out of a `call` reply.
///
/// Accepts a JSON object (possibly preceded by log lines) carrying one of
/// the usual hash keys, or a reply consisting of a single hex token.
/// Returns `None` for anything else, including an empty reply.
pub fn extract_tx_hash(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }

    if let Some(value) = parse_json_object(reply) {
        return TX_HASH_KEYS.iter().find_map(|key| {
            value
                .get(*key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
    }

    if reply.len() >= 16 && reply.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(reply.to_string());
    }
    None
}

fn parse_json_object(reply: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(reply) {
        return Some(value);
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&reply[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ProcessRunner;

    fn ledger() -> MxpyLedger {
        MxpyLedger::new(
            LedgerConfig::new("/keys/worker.pem").with_contract("erd1contract"),
            Arc::new(ProcessRunner::new()),
        )
    }

    #[test]
    fn query_argv_is_structured() {
        let argv = ledger().query_args("getTaskStatus", &["7".to_string()]);
        assert_eq!(
            argv,
            vec![
                "contract",
                "query",
                "erd1contract",
                "--function=getTaskStatus",
                "--arguments",
                "7",
                "--proxy=https://devnet-api.multiversx.com",
            ]
        );
    }

    #[test]
    fn call_argv_signs_and_sends() {
        let argv = ledger().call_args(
            "submitResult",
            &["7".to_string(), "str:abcd".to_string()],
        );
        assert_eq!(argv[..3], ["contract", "call", "erd1contract"]);
        assert!(argv.contains(&"--pem=/keys/worker.pem".to_string()));
        assert!(argv.contains(&"--gas-limit=10000000".to_string()));
        assert!(argv.contains(&"--function=submitResult".to_string()));
        assert!(argv.contains(&"str:abcd".to_string()));
        assert_eq!(argv.last().map(String::as_str), Some("--send"));
    }

    #[test]
    fn tx_hash_from_json_reply() {
        let reply = r#"{"emittedTransactionHash": "a1b2c3", "emittedTransaction": {}}"#;
        assert_eq!(extract_tx_hash(reply).as_deref(), Some("a1b2c3"));
    }

    #[test]
    fn tx_hash_from_json_after_log_lines() {
        let reply = "INFO sending tx\n{\n  \"txHash\": \"ff00\"\n}";
        assert_eq!(extract_tx_hash(reply).as_deref(), Some("ff00"));
    }

    #[test]
    fn tx_hash_from_bare_hex_token() {
        let hash = "5b2c1f9e0a7d3c4b5b2c1f9e0a7d3c4b5b2c1f9e0a7d3c4b5b2c1f9e0a7d3c4b";
        assert_eq!(extract_tx_hash(&format!("{hash}\n")).as_deref(), Some(hash));
    }

    #[test]
    fn unparseable_replies_have_no_tx_hash() {
        assert_eq!(extract_tx_hash(""), None);
        assert_eq!(extract_tx_hash("   \n"), None);
        assert_eq!(extract_tx_hash("transaction sent"), None);
        assert_eq!(extract_tx_hash(r#"{"emittedTransactionHash": ""}"#), None);
        assert_eq!(extract_tx_hash(r#"{"status": "ok"}"#), None);
        assert_eq!(extract_tx_hash("abc"), None);
    }
}
