//! XML request/response protocol for searching and downloading songs

pub mod messages;
pub mod xml;

pub use messages::{DownloadRequest, Request, Response, SearchRequest, Status, Table};
pub use xml::{escape_xml, parse_document, unescape_xml, XmlElement, XmlWriter};
