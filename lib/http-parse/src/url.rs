//! URL/query splitter: `UrlParser` from the original.

use byte_buffer::ByteBuffer;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlParseError {
    #[error("missing `://` scheme separator")]
    MissingScheme,

    #[error("empty host")]
    EmptyHost,

    #[error("query segment without `=`")]
    MalformedQuery,
}

/// `<proto>://<host>[:port][/path[?k=v&...]]`, decomposed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedUrl {
    protocol: ByteBuffer,
    host: ByteBuffer,
    port: u16,
    path: ByteBuffer,
    query: BTreeMap<ByteBuffer, ByteBuffer>,
}

const DEFAULT_PORT: u16 = 80;

impl ParsedUrl {
    pub fn parse(url: &ByteBuffer) -> Result<ParsedUrl, UrlParseError> {
        let text = url.as_str_lossy();

        let (protocol, rest) = text.split_once("://").ok_or(UrlParseError::MissingScheme)?;

        let (authority, path_and_query) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        let (host, port) = match authority.split_once(':') {
            Some((h, p)) => (h, p.parse::<u16>().unwrap_or(DEFAULT_PORT)),
            None => (authority, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(UrlParseError::EmptyHost);
        }

        let (path, query_str) = match path_and_query.find('?') {
            Some(idx) => (&path_and_query[..idx], &path_and_query[idx + 1..]),
            None => (path_and_query, ""),
        };
        let path = if path.is_empty() { "/" } else { path };

        let mut query = BTreeMap::new();
        if !query_str.is_empty() {
            for pair in query_str.split('&') {
                let (k, v) = pair.split_once('=').ok_or(UrlParseError::MalformedQuery)?;
                query.insert(ByteBuffer::from(k), ByteBuffer::from(v));
            }
        }

        Ok(ParsedUrl {
            protocol: ByteBuffer::from(protocol),
            host: ByteBuffer::from(host),
            port,
            path: ByteBuffer::from(path),
            query,
        })
    }

    pub fn protocol(&self) -> &ByteBuffer {
        &self.protocol
    }

    pub fn host(&self) -> &ByteBuffer {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &ByteBuffer {
        &self.path
    }

    /// `None` on an absent key, replacing the original's "empty buffer
    /// means absent" convention with an explicit `Option`.
    pub fn query(&self, name: &str) -> Option<&ByteBuffer> {
        self.query.get(&ByteBuffer::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_protocol_host_port_path_and_query() {
        let url = ByteBuffer::from("http://example.com:8080/p?a=1&b=two");
        let parsed = ParsedUrl::parse(&url).unwrap();
        assert_eq!(parsed.protocol().as_slice(), b"http");
        assert_eq!(parsed.host().as_slice(), b"example.com");
        assert_eq!(parsed.port(), 8080);
        assert_eq!(parsed.path().as_slice(), b"/p");
        assert_eq!(parsed.query("a").unwrap().as_slice(), b"1");
        assert_eq!(parsed.query("b").unwrap().as_slice(), b"two");
    }

    #[test]
    fn port_defaults_to_80() {
        let url = ByteBuffer::from("http://example.com/p");
        let parsed = ParsedUrl::parse(&url).unwrap();
        assert_eq!(parsed.port(), 80);
    }

    #[test]
    fn missing_scheme_is_rejected() {
        let url = ByteBuffer::from("example.com/p");
        assert_eq!(ParsedUrl::parse(&url), Err(UrlParseError::MissingScheme));
    }

    #[test]
    fn empty_host_is_rejected() {
        let url = ByteBuffer::from("http:///p");
        assert_eq!(ParsedUrl::parse(&url), Err(UrlParseError::EmptyHost));
    }

    #[test]
    fn query_segment_without_equals_is_malformed() {
        let url = ByteBuffer::from("http://h/p?novalue");
        assert_eq!(ParsedUrl::parse(&url), Err(UrlParseError::MalformedQuery));
    }

    #[test]
    fn absent_query_key_is_none() {
        let url = ByteBuffer::from("http://h/p?a=1");
        let parsed = ParsedUrl::parse(&url).unwrap();
        assert!(parsed.query("missing").is_none());
    }
}
