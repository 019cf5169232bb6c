//! ICY handshake: the response header block and client request sniffing.
//!
//! Wire format of the response sent before any audio:
//! ```text
//! ICY 200 OK\r\n
//! icy-notice1: <text>\r\n
//! icy-notice2: <text>\r\n
//! icy-name: <stream name>\r\n
//! icy-genre: <genre>\r\n
//! icy-url: http://<host>:<port>\r\n
//! content-type: audio/mpeg\r\n
//! icy-pub: 1\r\n
//! icy-metaint: <interval>\r\n
//! icy-br: <bitrate>\r\n
//! \r\n
//! ```

use std::fmt;

use crate::domain::config::StreamConfig;

/// Request header a client sends to ask for in-band metadata.
pub const METADATA_REQUEST_HEADER: &str = "Icy-MetaData";

/// The fixed ICY response for one server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcyResponse {
    notice1: String,
    notice2: String,
    name: String,
    genre: String,
    url: String,
    metaint: usize,
    bitrate_kbps: u32,
}

impl IcyResponse {
    /// Captures the advertised values from `config`.
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            notice1: config.notice1.clone(),
            notice2: config.notice2.clone(),
            name: config.name.clone(),
            genre: config.genre.clone(),
            url: format!("http://{}:{}", config.public_host, config.public_port),
            metaint: config.metaint,
            bitrate_kbps: config.bitrate_kbps,
        }
    }

    /// Renders the header block as bytes ready for the socket.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for IcyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ICY 200 OK\r\n")?;
        write!(f, "icy-notice1: {}\r\n", self.notice1)?;
        write!(f, "icy-notice2: {}\r\n", self.notice2)?;
        write!(f, "icy-name: {}\r\n", self.name)?;
        write!(f, "icy-genre: {}\r\n", self.genre)?;
        write!(f, "icy-url: {}\r\n", self.url)?;
        write!(f, "content-type: audio/mpeg\r\n")?;
        write!(f, "icy-pub: 1\r\n")?;
        write!(f, "icy-metaint: {}\r\n", self.metaint)?;
        write!(f, "icy-br: {}\r\n", self.bitrate_kbps)?;
        write!(f, "\r\n")
    }
}

/// Returns `true` when the raw client request carries an `Icy-MetaData`
/// header line (name compared case-insensitively, value ignored).
///
/// The request line itself and malformed lines are skipped; invalid UTF-8 is
/// tolerated.
pub fn requests_metadata(request: &[u8]) -> bool {
    String::from_utf8_lossy(request)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .any(|(name, _)| name.trim().eq_ignore_ascii_case(METADATA_REQUEST_HEADER))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_matches_wire_layout() {
        // Arrange
        let cfg = StreamConfig {
            public_host: "localhost".to_string(),
            public_port: 8888,
            name: "Late night mix".to_string(),
            genre: "Jazz Classical Rock".to_string(),
            notice1: "<BR>This stream requires".to_string(),
            notice2: "Winamp, or another streaming media player<BR>".to_string(),
            metaint: 32768,
            ..StreamConfig::default()
        };

        // Act
        let text = IcyResponse::from_config(&cfg).to_string();

        // Assert
        let expected = "ICY 200 OK\r\n\
                        icy-notice1: <BR>This stream requires\r\n\
                        icy-notice2: Winamp, or another streaming media player<BR>\r\n\
                        icy-name: Late night mix\r\n\
                        icy-genre: Jazz Classical Rock\r\n\
                        icy-url: http://localhost:8888\r\n\
                        content-type: audio/mpeg\r\n\
                        icy-pub: 1\r\n\
                        icy-metaint: 32768\r\n\
                        icy-br: 128\r\n\
                        \r\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_response_advertises_configured_metaint() {
        let cfg = StreamConfig {
            metaint: 4,
            ..StreamConfig::default()
        };
        let text = IcyResponse::from_config(&cfg).to_string();
        assert!(text.contains("icy-metaint: 4\r\n"));
    }

    #[test]
    fn test_to_bytes_ends_with_blank_line() {
        let bytes = IcyResponse::from_config(&StreamConfig::default()).to_bytes();
        assert!(bytes.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_requests_metadata_detects_header() {
        let req = b"GET / HTTP/1.0\r\nIcy-MetaData: 1\r\n\r\n";
        assert!(requests_metadata(req));
    }

    #[test]
    fn test_requests_metadata_is_case_insensitive() {
        let req = b"GET / HTTP/1.1\r\nicy-metadata:1\r\nUser-Agent: x\r\n\r\n";
        assert!(requests_metadata(req));
    }

    #[test]
    fn test_requests_metadata_false_without_header() {
        let req = b"GET / HTTP/1.1\r\nUser-Agent: WinampMPEG/5.0\r\n\r\n";
        assert!(!requests_metadata(req));
    }

    #[test]
    fn test_requests_metadata_ignores_header_name_in_values() {
        let req = b"GET / HTTP/1.1\r\nX-Note: Icy-MetaData\r\n\r\n";
        assert!(!requests_metadata(req));
    }

    #[test]
    fn test_requests_metadata_tolerates_binary_garbage() {
        let req = [0xFF, 0xFE, b'\r', b'\n', 0x00];
        assert!(!requests_metadata(&req));
    }
}
