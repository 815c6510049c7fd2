// ai
//! 🔒 Transport — turning a pile of TLS knobs into one ready-to-go `reqwest::Client`.
//!
//! The core never looks inside; it just gets a client with TLS, proxy and timeouts applied.
//! Legacy `ssl_*` keys fill in for unset `tls_*` keys, like an understudy who knows all the lines.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::tls;

use super::elasticsearch::ElasticsearchConfig;

/// 🔒 The accepted spellings of a minimum TLS version.
pub(crate) fn parse_tls_version(version: &str) -> Result<tls::Version> {
    match version.trim().to_ascii_uppercase().replace(['.', '_', ' '], "").as_str() {
        "TLS10" | "10" => Ok(tls::Version::TLS_1_0),
        "TLS11" | "11" => Ok(tls::Version::TLS_1_1),
        "TLS12" | "12" => Ok(tls::Version::TLS_1_2),
        "TLS13" | "13" => Ok(tls::Version::TLS_1_3),
        _ => bail!(
            "💀 unsupported TLS version '{}' (available: TLS10,TLS11,TLS12,TLS13)",
            version
        ),
    }
}

fn read_pem(path: &str, what: &str) -> Result<Vec<u8>> {
    std::fs::read(Path::new(path)).with_context(|| {
        format!(
            "💀 could not read {} '{}'. It's either missing, unreadable, or in witness protection.",
            what, path
        )
    })
}

/// 🏗️ Build the HTTP client for one connection.
pub(crate) fn build_http_client(config: &ElasticsearchConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(config.timeout_secs.max(1)))
        // -- 🔒 TLS 1.2 unless told otherwise; the floor is explicit, not inherited
        .min_tls_version(tls::Version::TLS_1_2);

    if let Some(version) = config.tls_min_version.as_deref() {
        let version = parse_tls_version(version)
            .with_context(|| format!("💀 could not parse tls min version '{}'", version))?;
        builder = builder.min_tls_version(version);
    }

    if let Some(ca) = config.ca_path() {
        let pem = read_pem(ca, "CA certificate")?;
        let certificate = reqwest::Certificate::from_pem(&pem)
            .with_context(|| format!("💀 could not parse any PEM certificates in '{}'", ca))?;
        builder = builder.add_root_certificate(certificate);
    }

    match (config.cert_path(), config.key_path()) {
        (Some(cert), Some(key)) => {
            let mut pem = read_pem(cert, "client certificate")?;
            pem.push(b'\n');
            pem.extend(read_pem(key, "client key")?);
            let identity = reqwest::Identity::from_pem(&pem)
                .with_context(|| format!("💀 could not load keypair {}:{}", cert, key))?;
            builder = builder.identity(identity);
        }
        (Some(_), None) | (None, Some(_)) => {
            bail!("💀 tls_cert and tls_key come as a pair. One without the other is just a sad half of a keypair.")
        }
        (None, None) => {}
    }

    if config.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if let Some(proxy) = config.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(proxy)
            .with_context(|| format!("💀 proxy URL '{}' did not parse", proxy))?;
        builder = builder.proxy(proxy);
    }

    builder.build().context(
        "💀 The HTTP client refused to be born. The TLS stack wept. Probably a cursed certificate or a config typo.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_tls_versions_have_many_spellings() {
        assert_eq!(parse_tls_version("TLS12").unwrap(), tls::Version::TLS_1_2);
        assert_eq!(parse_tls_version("tls1.3").unwrap(), tls::Version::TLS_1_3);
        assert_eq!(parse_tls_version("1.1").unwrap(), tls::Version::TLS_1_1);
        assert!(parse_tls_version("SSL3").is_err());
    }

    #[test]
    fn the_one_where_a_lonely_cert_without_a_key_is_rejected() {
        let the_config = ElasticsearchConfig {
            tls_cert: Some("/nope/cert.pem".to_string()),
            ..ElasticsearchConfig::for_url("http://localhost:9200")
        };
        let the_error = build_http_client(&the_config).unwrap_err();
        assert!(format!("{:#}", the_error).contains("pair"));
    }

    #[test]
    fn the_one_where_missing_ca_files_fail_at_setup() {
        let the_config = ElasticsearchConfig {
            tls_ca: Some("/definitely/not/here.pem".to_string()),
            ..ElasticsearchConfig::for_url("http://localhost:9200")
        };
        let the_error = build_http_client(&the_config).unwrap_err();
        assert!(format!("{:#}", the_error).contains("/definitely/not/here.pem"));
    }

    #[test]
    fn the_one_where_plain_http_just_works() {
        let the_config = ElasticsearchConfig::for_url("http://localhost:9200");
        assert!(build_http_client(&the_config).is_ok());
    }
}
