//! Adapters for the two external collaborators of the trade lifecycle.
//!
//! * [`LedgerOracle`] answers "has this transfer into escrow been confirmed?"
//! * [`ReleaseEndpoint`] accepts an opaque settlement artifact and releases the escrowed funds to the seller.
//!
//! Both are traits so that tests can script their behaviour. The HTTP adapters are what the server uses in production.
mod oracle;
mod release;

pub use oracle::{HttpLedgerOracle, LedgerOracle, OracleError, TransferQuery, TransferVerdict};
pub use release::{HttpReleaseEndpoint, ReleaseEndpoint, ReleaseError, ReleaseReceipt, ReleaseRequest};

/// Joins a base URL and a path without doubling the separator.
fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod test {
    #[test]
    fn joins_urls() {
        assert_eq!(super::endpoint_url("http://oracle:8080/", "/verify-transfer"), "http://oracle:8080/verify-transfer");
        assert_eq!(super::endpoint_url("http://x/api", "release"), "http://x/api/release");
    }
}
