//! Search/download requests and responses
//!
//! Every field is a child element named after the field. A response can
//! carry a result table and a performance as base64 Standard MIDI File text.

use serde::{Deserialize, Serialize};

use crate::config::StudioConfig;
use crate::error::{Result, StudioError};
use crate::midi::Midi;

use super::xml::{parse_document, XmlElement, XmlWriter};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Only songs uploaded after this date (`YYYY-MM-DD`)
    pub after_date: Option<String>,
}

impl SearchRequest {
    pub const TAG: &'static str = "search_request";

    pub fn to_xml(&self) -> String {
        let mut writer = XmlWriter::new();
        writer
            .open(Self::TAG)
            .leaf_opt("title", self.title.as_deref())
            .leaf_opt("artist", self.artist.as_deref())
            .leaf_opt("after_date", self.after_date.as_deref());
        writer.finish()
    }

    pub fn from_element(element: &XmlElement) -> Result<Self> {
        element.expect_name(Self::TAG)?;
        Ok(Self {
            title: element.child_text("title").map(str::to_string),
            artist: element.child_text("artist").map(str::to_string),
            after_date: element.child_text("after_date").map(str::to_string),
        })
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Self::from_element(&parse_document(xml)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub song_id: u64,
}

impl DownloadRequest {
    pub const TAG: &'static str = "download_request";

    pub fn to_xml(&self) -> String {
        let mut writer = XmlWriter::new();
        writer.open(Self::TAG).leaf("song_id", self.song_id);
        writer.finish()
    }

    pub fn from_element(element: &XmlElement) -> Result<Self> {
        element.expect_name(Self::TAG)?;
        Ok(Self {
            song_id: parse_number(element, "song_id")?,
        })
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        Self::from_element(&parse_document(xml)?)
    }
}

/// Any request a server may receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Search(SearchRequest),
    Download(DownloadRequest),
}

impl Request {
    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = parse_document(xml)?;
        match root.name.as_str() {
            SearchRequest::TAG => Ok(Request::Search(SearchRequest::from_element(&root)?)),
            DownloadRequest::TAG => Ok(Request::Download(DownloadRequest::from_element(&root)?)),
            other => Err(StudioError::Xml(format!("unknown request <{}>", other))),
        }
    }

    pub fn to_xml(&self) -> String {
        match self {
            Request::Search(request) => request.to_xml(),
            Request::Download(request) => request.to_xml(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Error => "error",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "ok" => Some(Status::Ok),
            "error" => Some(Status::Error),
            _ => None,
        }
    }
}

/// Rows of string cells under named columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub const TAG: &'static str = "table";

    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row; `false` if its width does not match the columns
    pub fn push_row(&mut self, row: Vec<String>) -> bool {
        if row.len() != self.columns.len() {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(index)).map(String::as_str)
    }

    fn write(&self, writer: &mut XmlWriter) {
        writer
            .open(Self::TAG)
            .leaf("row_count", self.rows.len())
            .leaf("column_count", self.columns.len());
        for column in &self.columns {
            writer.leaf("column", column);
        }
        for row in &self.rows {
            writer.open("row");
            for cell in row {
                writer.leaf("cell", cell);
            }
            writer.close();
        }
        writer.close();
    }

    fn from_element(element: &XmlElement) -> Result<Self> {
        element.expect_name(Self::TAG)?;
        let row_count: usize = parse_number(element, "row_count")?;
        let column_count: usize = parse_number(element, "column_count")?;

        let columns: Vec<String> = element.children_named("column").map(|c| c.text.clone()).collect();
        if columns.len() != column_count {
            return Err(StudioError::Xml(format!(
                "table declares {} columns but has {}",
                column_count,
                columns.len()
            )));
        }

        let mut table = Table::new(columns);
        for row in element.children_named("row") {
            let cells = row.children_named("cell").map(|c| c.text.clone()).collect();
            if !table.push_row(cells) {
                return Err(StudioError::Xml(format!(
                    "row {} does not have {} cells",
                    table.rows.len(),
                    column_count
                )));
            }
        }
        if table.rows.len() != row_count {
            return Err(StudioError::Xml(format!(
                "table declares {} rows but has {}",
                row_count,
                table.rows.len()
            )));
        }
        Ok(table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
    pub table: Option<Table>,
    /// Base64 Standard MIDI File
    pub midi: Option<String>,
}

impl Response {
    pub const TAG: &'static str = "response";

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            message: message.into(),
            table: None,
            midi: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            ..Self::ok(message)
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    /// Attach `midi` as base64 text
    pub fn with_midi(mut self, midi: &Midi, config: &StudioConfig) -> Result<Self> {
        self.midi = Some(midi.to_base64(config)?);
        Ok(self)
    }

    /// Decode the attached performance, if any
    pub fn decode_midi(&self, config: &StudioConfig) -> Result<Option<Midi>> {
        self.midi
            .as_deref()
            .map(|text| Midi::from_base64(text, config))
            .transpose()
    }

    pub fn to_xml(&self) -> String {
        let mut writer = XmlWriter::new();
        writer
            .open(Self::TAG)
            .leaf("status", self.status.as_str())
            .leaf("message", &self.message);
        if let Some(table) = &self.table {
            table.write(&mut writer);
        }
        writer.leaf_opt("midi", self.midi.as_deref());
        writer.finish()
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let root = parse_document(xml)?;
        root.expect_name(Self::TAG)?;

        let status_text = root.required_text("status")?;
        let status = Status::parse(status_text)
            .ok_or_else(|| StudioError::Xml(format!("unknown status {:?}", status_text)))?;
        let table = root.child(Table::TAG).map(Table::from_element).transpose()?;

        Ok(Self {
            status,
            message: root.child_text("message").unwrap_or_default().to_string(),
            table,
            midi: root.child_text("midi").map(str::to_string),
        })
    }
}

fn parse_number<T>(element: &XmlElement, name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let text = element.required_text(name)?;
    text.trim()
        .parse()
        .map_err(|e| StudioError::Xml(format!("<{}> {:?}: {}", name, text, e)))
}
