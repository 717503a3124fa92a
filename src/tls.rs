use std::io::{self, ErrorKind};

use axum_server::tls_rustls::RustlsConfig;

/// Load the server certificate and key, if configured. One without the other
/// is a configuration error.
pub async fn load_rustls_config(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<RustlsConfig>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(c), Some(k)) => (c, k),
        _ => {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "both CLINICD_TLS_CERT and CLINICD_TLS_KEY must be set, or neither",
            ));
        }
    };

    // Advertises h2 and http/1.1 over ALPN.
    let config = RustlsConfig::from_pem_file(cert_path, key_path).await?;
    Ok(Some(config))
}
