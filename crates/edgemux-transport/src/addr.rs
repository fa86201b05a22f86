//! Router address parsing.
//!
//! Router addresses arrive as strings such as `tls:router.example.com:3022`.
//! Parsers are kept in one process-wide registry and tried in registration
//! order; the first one that recognizes the string wins.

use std::fmt;
use std::sync::{Arc, Once, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Result, TransportError};

/// A parsed router address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.host, self.port)
    }
}

/// Turns an address string into an [`Address`].
pub trait AddressParser: Send + Sync {
    /// Returns `None` when the string is not meant for this parser.
    fn parse(&self, address: &str) -> Option<Result<Address>>;
}

/// Parses `tls:<host>:<port>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TlsAddressParser;

impl AddressParser for TlsAddressParser {
    fn parse(&self, address: &str) -> Option<Result<Address>> {
        let rest = address.strip_prefix("tls:")?;
        let invalid = |reason: &str| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let Some((host, port)) = rest.rsplit_once(':') else {
            return Some(Err(invalid("expected tls:<host>:<port>")));
        };
        if host.is_empty() {
            return Some(Err(invalid("empty host")));
        }
        let port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => return Some(Err(invalid("port is not a number in 0-65535"))),
        };

        Some(Ok(Address {
            protocol: "tls".to_string(),
            host: host.to_string(),
            port,
        }))
    }
}

/// Accepts router addresses written URL-style (`tls://host:port`) by
/// stripping every `/` before handing the string to the TLS parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct EdgeAddressParser {
    inner: TlsAddressParser,
}

impl AddressParser for EdgeAddressParser {
    fn parse(&self, address: &str) -> Option<Result<Address>> {
        self.inner.parse(&address.replace('/', ""))
    }
}

fn registry() -> &'static RwLock<Vec<Arc<dyn AddressParser>>> {
    static PARSERS: OnceLock<RwLock<Vec<Arc<dyn AddressParser>>>> = OnceLock::new();
    PARSERS.get_or_init(|| RwLock::new(vec![Arc::new(TlsAddressParser)]))
}

/// Add a parser to the process-wide registry.
pub fn register_address_parser(parser: Arc<dyn AddressParser>) {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(parser);
}

/// Register [`EdgeAddressParser`]. Only the first call has an effect.
pub fn install_edge_address_parser() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Ahead of the plain TLS parser so URL-style addresses are normalized first.
        registry()
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(0, Arc::new(EdgeAddressParser::default()));
        debug!("edge address parser installed");
    });
}

/// Parse with the first registered parser that recognizes `address`.
pub fn parse_address(address: &str) -> Result<Address> {
    let parsers = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    parsers
        .iter()
        .find_map(|parser| parser.parse(address))
        .unwrap_or_else(|| {
            Err(TransportError::InvalidAddress {
                address: address.to_string(),
                reason: "no parser recognizes this address".to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_parser_reads_host_and_port() {
        let addr = TlsAddressParser
            .parse("tls:router.example.com:3022")
            .unwrap()
            .unwrap();
        assert_eq!(addr.host, "router.example.com");
        assert_eq!(addr.port, 3022);
        assert_eq!(addr.to_string(), "tls:router.example.com:3022");
    }

    #[test]
    fn tls_parser_ignores_other_protocols() {
        assert!(TlsAddressParser.parse("tcp:localhost:80").is_none());
    }

    #[test]
    fn tls_parser_rejects_bad_port() {
        let err = TlsAddressParser.parse("tls:host:99999").unwrap().unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }

    #[test]
    fn edge_parser_strips_slashes() {
        let addr = EdgeAddressParser::default()
            .parse("tls://edge.example.com:443")
            .unwrap()
            .unwrap();
        assert_eq!(addr.host, "edge.example.com");
        assert_eq!(addr.port, 443);
    }

    #[test]
    fn registry_uses_installed_edge_parser() {
        install_edge_address_parser();
        install_edge_address_parser();

        let addr = parse_address("tls://10.0.0.7:6262").unwrap();
        assert_eq!(addr.host, "10.0.0.7");
        assert_eq!(addr.port, 6262);

        let err = parse_address("udp:10.0.0.7:6262").unwrap_err();
        assert!(matches!(err, TransportError::InvalidAddress { .. }));
    }

    #[test]
    fn custom_parser_is_consulted() {
        struct Loopback;
        impl AddressParser for Loopback {
            fn parse(&self, address: &str) -> Option<Result<Address>> {
                (address == "loopback").then(|| {
                    Ok(Address {
                        protocol: "tls".to_string(),
                        host: "127.0.0.1".to_string(),
                        port: 3022,
                    })
                })
            }
        }

        register_address_parser(Arc::new(Loopback));
        assert_eq!(parse_address("loopback").unwrap().host, "127.0.0.1");
    }
}
