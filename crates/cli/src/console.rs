//! Terminal stand-ins for the interactive pieces: the payment gateway UI and
//! confirmation prompts.

use std::io::BufRead;

use async_trait::async_trait;
use bazaar_storefront::addresses::Confirmation;
use bazaar_storefront::checkout::{
    GatewayCallback, GatewayError, GatewayFailure, GatewayOptions, PaymentGateway,
};
use bazaar_storefront::remote::SignatureFields;
use tracing::{info, warn};

/// Payment "UI" on the terminal.
///
/// Logs the gateway options as JSON and reads the gateway's completion JSON
/// (`{"paymentId", "orderId", "signature"}`, or `{"reason"}` for a failure)
/// from one line of stdin. End of input means the customer closed the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleGateway;

#[async_trait]
impl PaymentGateway for ConsoleGateway {
    async fn load(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn open(&self, options: GatewayOptions, callback: GatewayCallback) -> Result<(), GatewayError> {
        let rendered =
            serde_json::to_string_pretty(&options).map_err(|e| GatewayError::Open(e.to_string()))?;
        info!("Complete the payment, then paste the gateway response:\n{rendered}");

        tokio::task::spawn_blocking(move || match read_line() {
            Some(line) => respond(&line, callback),
            None => info!("Payment window closed"),
        });
        Ok(())
    }
}

fn respond(line: &str, callback: GatewayCallback) {
    if let Ok(fields) = serde_json::from_str::<SignatureFields>(line) {
        callback.complete(fields);
    } else if let Ok(failure) = serde_json::from_str::<GatewayFailure>(line) {
        callback.fail(failure);
    } else {
        warn!("Unreadable gateway response");
        callback.fail(GatewayFailure::new("unreadable gateway response"));
    }
}

/// Asks on the terminal; anything but `y`/`yes` declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirmation;

#[async_trait]
impl Confirmation for StdinConfirmation {
    async fn confirm(&self, prompt: &str) -> bool {
        info!("{prompt} [y/N]");
        tokio::task::spawn_blocking(read_line)
            .await
            .ok()
            .flatten()
            .is_some_and(|answer| is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// One trimmed, non-empty line from stdin; `None` at end of input.
fn read_line() -> Option<String> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => return Some(line.trim().to_string()),
            Err(e) => {
                warn!(error = %e, "Could not read stdin");
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }
}
