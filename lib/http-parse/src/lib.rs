mod request;
mod url;

pub use request::{Headers, HttpRequest, ParseError};
pub use url::{ParsedUrl, UrlParseError};
